//! Cache worker (C8, spec.md §4.5 "Cache worker"). Keeps bounded, windowed
//! LRU views of recent block dumps and transactions so RPC reads of "recent"
//! data never touch the store. Watermark-gated and resumable like the other
//! two workers, but its "store write" is just advancing the watermark —
//! the caches themselves are process-local and rebuilt from nothing on
//! restart (spec.md §4.5: "a cache miss on restart is not an error").

use crate::store::{Keyspace, StorageJsonExt};
use crate::workers::{WorkItem, WorkerMessage};
use chain_common::{Hash, IntentStatus, TransactionInfo};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

const WATERMARK_KEY: &[u8] = b"cache";

/// Read-side handle shared with the RPC layer: bounded LRUs behind a mutex,
/// exactly as spec.md §4.5 describes ("a most-recently-used eviction policy
/// bounded by the configured element counts").
pub struct CacheHandle {
    blocks: Mutex<LruCache<Hash, Arc<Vec<u8>>>>,
    txs: Mutex<LruCache<Hash, TransactionInfo>>,
}

impl CacheHandle {
    pub fn new(max_blocks: usize, max_txs: usize) -> Arc<Self> {
        Arc::new(Self {
            blocks: Mutex::new(LruCache::new(non_zero(max_blocks))),
            txs: Mutex::new(LruCache::new(non_zero(max_txs))),
        })
    }

    pub fn get_block(&self, hash: &Hash) -> Option<Arc<Vec<u8>>> {
        self.blocks.lock().expect("mutex poisoned").get(hash).cloned()
    }

    pub fn get_tx(&self, hash: &Hash) -> Option<TransactionInfo> {
        self.txs.lock().expect("mutex poisoned").get(hash).cloned()
    }

    fn put_block(&self, hash: Hash, dump: Arc<Vec<u8>>) {
        self.blocks.lock().expect("mutex poisoned").put(hash, dump);
    }

    fn put_tx(&self, tx: &TransactionInfo) {
        self.txs.lock().expect("mutex poisoned").put(tx.hash, tx.clone());
    }
}

fn non_zero(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::new(1).unwrap())
}

pub struct CacheWorker;

impl CacheWorker {
    pub fn initial_watermark(store: &dyn crate::store::Storage) -> crate::store::StoreResult<u64> {
        match store.get_json::<u64>(Keyspace::WorkerWatermark, WATERMARK_KEY)? {
            Some(h) => Ok(h),
            None => Ok(0),
        }
    }

    /// Runs to completion, populating `handle` with every block/tx it sees
    /// and persisting only its watermark (spec.md §4.5 "the cache worker's
    /// own durable progress marker, distinct from the main indexer's").
    pub fn run(
        store: Arc<dyn crate::store::Storage>,
        handle: Arc<CacheHandle>,
        receiver: Receiver<WorkerMessage>,
    ) -> anyhow::Result<()> {
        let mut watermark = Self::initial_watermark(&*store)?;

        for message in receiver {
            match message {
                WorkerMessage::Shutdown => break,
                WorkerMessage::Apply(item) => {
                    let height = item.block.height();
                    if height <= watermark {
                        continue;
                    }
                    Self::apply(&item, &handle);

                    let mut batch = crate::store::WriteBatch::new();
                    batch.put_json(Keyspace::WorkerWatermark, WATERMARK_KEY.to_vec(), &height)?;
                    store.commit(batch)?;
                    watermark = height;
                }
            }
        }
        Ok(())
    }

    fn apply(item: &WorkItem, handle: &CacheHandle) {
        handle.put_block(*item.block.hash(), item.raw_dump.clone());
        for tx in &item.block.transactions {
            // node-test reports are synthetic bookkeeping transactions, not
            // user-facing activity — spec.md §4.5 excludes them explicitly.
            if tx.status == IntentStatus::NodeTest {
                continue;
            }
            handle.put_tx(tx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RocksStorage;
    use chain_common::{Address, BlockHeader, BlockInfo, BlockKind};

    fn block(height: u64, transactions: Vec<TransactionInfo>) -> WorkItem {
        let header = BlockHeader {
            hash: Hash::new([height as u8; 32]),
            parent_hash: Hash::new([(height.saturating_sub(1)) as u8; 32]),
            height,
            size: 0,
            file_path: "blocks_0".into(),
            file_offset: 0,
            kind: BlockKind::Simple,
            producer_signature: None,
            producer_pubkey: None,
            producer_address: None,
            tx_count: transactions.len() as u32,
            signing_tx_count: 0,
        };
        WorkItem {
            block: Arc::new(BlockInfo { header, transactions }),
            raw_dump: Arc::new(vec![0xAB; 4]),
        }
    }

    fn tx(hash: u8, status: IntentStatus) -> TransactionInfo {
        TransactionInfo {
            hash: Hash::new([hash; 32]),
            from: Address::ZERO,
            to: Address::ZERO,
            value: 0,
            nonce: 0,
            data: Vec::new(),
            file_offset: 0,
            block_height: 0,
            status,
            delegate: None,
            token: None,
        }
    }

    #[test]
    fn caches_block_and_tx_on_apply() {
        let handle = CacheHandle::new(10, 10);
        let item = block(1, vec![tx(1, IntentStatus::Success)]);
        CacheWorker::apply(&item, &handle);

        assert!(handle.get_block(&Hash::new([1; 32])).is_some());
        assert!(handle.get_tx(&Hash::new([1; 32])).is_some());
    }

    #[test]
    fn node_test_transactions_are_not_cached() {
        let handle = CacheHandle::new(10, 10);
        let item = block(1, vec![tx(7, IntentStatus::NodeTest)]);
        CacheWorker::apply(&item, &handle);

        assert!(handle.get_tx(&Hash::new([7; 32])).is_none());
    }

    #[test]
    fn eviction_respects_capacity() {
        let handle = CacheHandle::new(1, 10);
        CacheWorker::apply(&block(1, vec![]), &handle);
        CacheWorker::apply(&block(2, vec![]), &handle);

        assert!(handle.get_block(&Hash::new([1; 32])).is_none());
        assert!(handle.get_block(&Hash::new([2; 32])).is_some());
    }

    #[test]
    fn watermark_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStorage::open(dir.path()).unwrap();
        assert_eq!(CacheWorker::initial_watermark(&store).unwrap(), 0);
    }
}
