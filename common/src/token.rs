use crate::{address::Address, hash::Hash};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Fungible,
    NonFungible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmissionPolicy {
    Fixed,
    Mintable,
    Burnable,
}

/// Tagged token-mutation carried by a transaction (spec.md §3 "token
/// sub-record (tagged variant)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TokenOperation {
    Create {
        symbol: String,
        name: String,
        token_type: TokenType,
        decimals: u8,
        emission: EmissionPolicy,
        value: u64,
        /// Initial distribution to addresses other than the creator; the
        /// remainder of `value` goes to the creator (spec.md §4.5, §8 S6).
        begin_distribution: Vec<(Address, u64)>,
    },
    ChangeOwner {
        new_owner: Address,
    },
    ChangeEmission {
        emission: EmissionPolicy,
    },
    AddTokens {
        target: Address,
        amount: u64,
    },
    MoveTokens {
        amount: u64,
    },
    BurnTokens {
        amount: u64,
    },
}

/// Token registry record (spec.md §3 "Token").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub name: String,
    pub token_type: TokenType,
    pub decimals: u8,
    pub emission: EmissionPolicy,
    pub owner: Address,
    pub creation_tx: Hash,
    /// Immutable: the supply value recorded at creation.
    pub begin_value: u64,
    /// Mutates via AddTokens/BurnTokens.
    pub all_value: u64,
}

impl Token {
    pub fn apply_add(&mut self, amount: u64) {
        self.all_value = self.all_value.saturating_add(amount);
    }

    pub fn apply_burn(&mut self, amount: u64) {
        self.all_value = self.all_value.saturating_sub(amount);
    }
}

/// Per-token sub-balance map kept inside `BalanceInfo`.
pub type TokenBalances = HashMap<Address, u64>;
