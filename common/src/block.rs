use crate::{address::Address, hash::Hash, transaction::TransactionInfo};
use serde::{Deserialize, Serialize};

/// Closed set of block kinds a dump can decode to (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Simple,
    Forging,
    State,
    Sign,
    RejectedTxs,
}

/// Header-only metadata for a block: everything needed to place it in the
/// chain and locate its body on disk without decoding the body itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: Hash,
    pub parent_hash: Hash,
    /// Assigned by us on acceptance, not carried on the wire.
    pub height: u64,
    pub size: u64,
    pub file_path: String,
    pub file_offset: u64,
    pub kind: BlockKind,
    pub producer_signature: Option<Vec<u8>>,
    pub producer_pubkey: Option<Vec<u8>>,
    pub producer_address: Option<Address>,
    pub tx_count: u32,
    pub signing_tx_count: u32,
}

impl BlockHeader {
    pub fn is_forging(&self) -> bool {
        matches!(self.kind, BlockKind::Forging)
    }

    pub fn is_state(&self) -> bool {
        matches!(self.kind, BlockKind::State)
    }
}

/// A fully decoded block: header plus its ordered transactions (spec.md §3
/// "Block body"). Transient — only lives for the duration of one pull
/// cycle, never stored as a whole struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockInfo {
    pub header: BlockHeader,
    pub transactions: Vec<TransactionInfo>,
}

impl BlockInfo {
    pub fn hash(&self) -> &Hash {
        &self.header.hash
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }
}

/// Ordered sequence of accepted headers, 1-indexed by height, with a
/// hash→height index for O(1) ancestry lookups (spec.md §3 "Blockchain").
#[derive(Debug, Default)]
pub struct BlockChain {
    // index 0 is height 1
    headers: Vec<BlockHeader>,
    by_hash: std::collections::HashMap<Hash, u64>,
}

impl BlockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> u64 {
        self.headers.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn tip_height(&self) -> u64 {
        self.len()
    }

    pub fn header_at(&self, height: u64) -> Option<&BlockHeader> {
        if height == 0 {
            return None;
        }
        self.headers.get((height - 1) as usize)
    }

    pub fn height_of(&self, hash: &Hash) -> Option<u64> {
        self.by_hash.get(hash).copied()
    }

    /// Appends one header. The caller must have already validated that
    /// `header.parent_hash` matches the current tip's hash (spec.md
    /// property 4, "hash linkage"); this only assigns storage bookkeeping.
    pub fn push(&mut self, mut header: BlockHeader) -> u64 {
        let height = self.len() + 1;
        header.height = height;
        self.by_hash.insert(header.hash, height);
        self.headers.push(header);
        height
    }

    pub fn tip_hash(&self) -> Option<Hash> {
        self.headers.last().map(|h| h.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(hash: u8, parent: u8) -> BlockHeader {
        BlockHeader {
            hash: Hash::new([hash; 32]),
            parent_hash: Hash::new([parent; 32]),
            height: 0,
            size: 100,
            file_path: "blocks_0".into(),
            file_offset: 0,
            kind: BlockKind::Simple,
            producer_signature: None,
            producer_pubkey: None,
            producer_address: None,
            tx_count: 0,
            signing_tx_count: 0,
        }
    }

    #[test]
    fn push_assigns_sequential_heights() {
        let mut chain = BlockChain::new();
        assert_eq!(chain.push(header(1, 0)), 1);
        assert_eq!(chain.push(header(2, 1)), 2);
        assert_eq!(chain.tip_height(), 2);
        assert_eq!(chain.height_of(&Hash::new([2; 32])), Some(2));
    }
}
