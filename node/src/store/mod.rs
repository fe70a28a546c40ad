//! Index store (C6, spec.md §6 "Key-value store keyspaces"). The trait
//! here is the thin seam the rest of the pipeline programs against; the
//! concrete backend (`rocks`) is the only module that knows it's RocksDB.
//! Per spec.md §1 the backend itself ("provided ordered key-value store
//! with atomic multi-key write batches, iterator scans with key prefixes,
//! and snapshot reads") is an external collaborator — we specify the
//! keyspace/batch contract, not a bespoke storage engine.

pub mod rocks;

use chain_common::{Address, Hash, Modules};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use rocks::RocksStorage;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("modules mismatch: store was created with {frozen:?}, configured with {configured:?}")]
    ModulesMismatch { frozen: Modules, configured: Modules },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Logical keyspaces, one per spec.md §6 bullet. Backed by one RocksDB
/// column family each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyspace {
    Block,
    MainMeta,
    BlockMeta,
    File,
    AddrTxs,
    AddrTokenTxs,
    AddrStatus,
    Tx,
    TxStatus,
    Balance,
    Token,
    Delegate,
    ForgeAll,
    CommonBal,
    Modules,
    Version,
    WorkerWatermark,
    NodeStatBlock,
    NodeStatDay,
    NodeTrust,
    NodeRegistry,
}

impl Keyspace {
    pub const ALL: [Keyspace; 21] = [
        Keyspace::Block,
        Keyspace::MainMeta,
        Keyspace::BlockMeta,
        Keyspace::File,
        Keyspace::AddrTxs,
        Keyspace::AddrTokenTxs,
        Keyspace::AddrStatus,
        Keyspace::Tx,
        Keyspace::TxStatus,
        Keyspace::Balance,
        Keyspace::Token,
        Keyspace::Delegate,
        Keyspace::ForgeAll,
        Keyspace::CommonBal,
        Keyspace::Modules,
        Keyspace::Version,
        Keyspace::WorkerWatermark,
        Keyspace::NodeStatBlock,
        Keyspace::NodeStatDay,
        Keyspace::NodeTrust,
        Keyspace::NodeRegistry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Keyspace::Block => "block",
            Keyspace::MainMeta => "main_meta",
            Keyspace::BlockMeta => "block_meta",
            Keyspace::File => "file",
            Keyspace::AddrTxs => "addr",
            Keyspace::AddrTokenTxs => "addr_tok",
            Keyspace::AddrStatus => "addr_status",
            Keyspace::Tx => "tx",
            Keyspace::TxStatus => "tx_status",
            Keyspace::Balance => "bal",
            Keyspace::Token => "tok",
            Keyspace::Delegate => "deleg",
            Keyspace::ForgeAll => "forge_all",
            Keyspace::CommonBal => "common_bal",
            Keyspace::Modules => "modules",
            Keyspace::Version => "version",
            Keyspace::WorkerWatermark => "worker_watermark",
            Keyspace::NodeStatBlock => "node_stat_block",
            Keyspace::NodeStatDay => "node_stat_day",
            Keyspace::NodeTrust => "node_trust",
            Keyspace::NodeRegistry => "node_registry",
        }
    }
}

/// A batch of puts, atomically committed by `Storage::commit`
/// (spec.md §5 "Write batches are atomic (all-or-nothing)").
#[derive(Default)]
pub struct WriteBatch {
    pub(crate) puts: Vec<(Keyspace, Vec<u8>, Vec<u8>)>,
    pub(crate) deletes: Vec<(Keyspace, Vec<u8>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_json<T: Serialize>(&mut self, ks: Keyspace, key: Vec<u8>, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.puts.push((ks, key, bytes));
        Ok(())
    }

    pub fn put_raw(&mut self, ks: Keyspace, key: Vec<u8>, value: Vec<u8>) {
        self.puts.push((ks, key, value));
    }

    pub fn delete(&mut self, ks: Keyspace, key: Vec<u8>) {
        self.deletes.push((ks, key));
    }
}

/// The storage seam (C6). Not `async` — every caller (the blocking
/// per-worker threads of §5, and the RPC read path) talks to it
/// synchronously; the backend owns whatever internal thread pool it needs.
///
/// Kept free of generic methods so `dyn Storage` stays object-safe — the
/// driver and all three workers hold it behind an `Arc<dyn Storage>`. JSON
/// convenience reads live on `StorageJsonExt` below instead.
pub trait Storage: Send + Sync {
    fn get_raw(&self, ks: Keyspace, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Ordered scan of every key under `prefix` in `ks` (spec.md §6,
    /// "ordered scan by address prefix").
    fn scan_prefix(&self, ks: Keyspace, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Atomically applies `batch`. All-or-nothing (spec.md §5).
    fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}

/// Blanket JSON-decoding helper over any `Storage`, including `dyn Storage`.
pub trait StorageJsonExt: Storage {
    fn get_json<T: for<'de> Deserialize<'de>>(&self, ks: Keyspace, key: &[u8]) -> StoreResult<Option<T>> {
        match self.get_raw(ks, key)? {
            None => Ok(None),
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        }
    }
}

impl<S: Storage + ?Sized> StorageJsonExt for S {}

// --- key-encoding helpers shared by every keyspace user -------------------

pub fn key_hash(hash: &Hash) -> Vec<u8> {
    hash.as_bytes().to_vec()
}

pub fn key_address(addr: &Address) -> Vec<u8> {
    addr.as_bytes().to_vec()
}

pub fn key_address_seq(addr: &Address, seq: u64) -> Vec<u8> {
    let mut key = key_address(addr);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

pub fn key_address_hash(addr: &Address, hash: &Hash) -> Vec<u8> {
    let mut key = key_address(addr);
    key.extend_from_slice(hash.as_bytes());
    key
}

pub fn key_address_pair(from: &Address, to: &Address) -> Vec<u8> {
    let mut key = key_address(from);
    key.extend_from_slice(to.as_bytes());
    key
}

pub fn key_delegate(from: &Address, to: &Address, seq: u64) -> Vec<u8> {
    let mut key = key_address_pair(from, to);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

pub fn key_worker(worker_name: &str) -> Vec<u8> {
    worker_name.as_bytes().to_vec()
}

/// `(preferred-tip-hash, preferred-parent-hash)` used for tip selection on
/// restart (spec.md §3 `BlockMetadata`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub preferred_tip_hash: Hash,
    pub preferred_parent_hash: Hash,
}

/// `MainBlock` — main indexer watermark (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainBlockInfo {
    pub height: u64,
    pub hash: Hash,
    pub counter: u64,
}

/// File-append bookkeeping (`file:{relPath}` → last used offset, §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileInfo {
    pub last_offset: u64,
}

/// Convenience bundle of record types this module persists, re-exported so
/// callers don't need to import `chain_common` separately just to read a
/// balance/token/tx back out of the store.
pub mod records {
    pub use chain_common::{
        Address, BalanceInfo, BlockHeader, CommonBalance, DelegateFrame, ForgingSums, Hash, Token,
        TransactionInfo, TransactionStatus,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_seq_keys_preserve_seq_order() {
        let addr = Address::ZERO;
        let k1 = key_address_seq(&addr, 1);
        let k2 = key_address_seq(&addr, 2);
        assert!(k1 < k2);
    }
}
