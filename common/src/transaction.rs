use crate::{address::Address, hash::Hash, token::TokenOperation};
use serde::{Deserialize, Serialize};

/// Closed set of transaction intent outcomes (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentStatus {
    Success,
    NotSuccess,
    NodeTest,
    ForgingF1,
    ForgingF2,
    ForgingF3,
    ForgingF4,
}

impl IntentStatus {
    pub fn is_forging(&self) -> bool {
        matches!(
            self,
            IntentStatus::ForgingF1
                | IntentStatus::ForgingF2
                | IntentStatus::ForgingF3
                | IntentStatus::ForgingF4
        )
    }
}

/// Delegate sub-record attached to a transaction: `isDelegate=true` pushes,
/// `isDelegate=false` pops (spec.md §3 "Delegate state").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateRecord {
    pub is_delegate: bool,
    pub value: u64,
}

/// Tagged status recorded against a transaction once it is applied by the
/// main indexer (design note: "variant transaction status" — modeled as a
/// real sum type rather than a stringly-tagged struct).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransactionStatus {
    Delegate,
    UnDelegate { value: u64, hash: Hash },
}

/// One transaction inside a block body (spec.md §3 "Block body").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub hash: Hash,
    pub from: Address,
    pub to: Address,
    pub value: u64,
    pub nonce: u64,
    pub data: Vec<u8>,
    pub file_offset: u64,
    pub block_height: u64,
    pub status: IntentStatus,
    pub delegate: Option<DelegateRecord>,
    pub token: Option<TokenOperation>,
}

impl TransactionInfo {
    pub fn is_delegate_tx(&self) -> bool {
        self.delegate.is_some()
    }

    pub fn is_token_tx(&self) -> bool {
        self.token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forging_status_classification() {
        assert!(IntentStatus::ForgingF1.is_forging());
        assert!(!IntentStatus::Success.is_forging());
        assert!(!IntentStatus::NodeTest.is_forging());
    }
}
