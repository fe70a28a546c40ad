use crate::crypto::derive_address_bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical 25-byte address: a 21-byte version+pubkey-hash body followed by
/// a 4-byte integrity suffix (spec.md §3 "Address").
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; 25]);

/// The genesis-minting sentinel address: seeded with the full initial
/// supply before any block is ingested. Flagged rather than special-cased
/// by value so callers can still print/compare it normally.
pub const INITIAL_WALLET: Address = Address([0xffu8; 25]);

impl Address {
    pub const ZERO: Address = Address([0u8; 25]);

    pub fn from_bytes(bytes: [u8; 25]) -> Self {
        Self(bytes)
    }

    pub fn from_pubkey(pubkey: &[u8]) -> Self {
        Self(derive_address_bytes(pubkey))
    }

    pub fn as_bytes(&self) -> &[u8; 25] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut out = [0u8; 25];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }

    pub fn is_initial_wallet(&self) -> bool {
        *self == INITIAL_WALLET
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 25]
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
