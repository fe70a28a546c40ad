//! Driver: wires the peer pool, fetcher, block source, parser and the
//! three index workers together (spec.md §5 "Concurrency & resource
//! model"). One tokio task runs the async pull loop; each worker owns a
//! dedicated OS thread blocking on its own `mpsc::Receiver`
//! (spec.md §4.5 "one dedicated thread per worker").

use crate::config::NodeConfig;
use crate::error::NodeResult;
use crate::fetcher::BlockFetcher;
use crate::p2p::{pool::PeerPool, transport::PeerTransport};
use crate::source::{BlockSource, EmittedBlock, IDLE_FLOOR};
use crate::store::{BlockMetadata, Keyspace, RocksStorage, Storage, StorageJsonExt, WriteBatch};
use crate::workers::cache::CacheHandle;
use crate::workers::{cache, indexer, node_test, new_queue, WorkItem, WorkerMessage};
use chain_common::BlockInfo;
use log::{info, warn};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

const BLOCK_FILE_META_KEY: &[u8] = b"blocks_0";

/// Append-only raw block dump file (spec.md §6 "`file:{relPath}` → last
/// used offset"). One file for the whole run; rotation is a Non-goal.
struct BlockFileWriter {
    file: Mutex<File>,
    path: String,
    offset: AtomicU64,
}

impl BlockFileWriter {
    fn open(folder: &Path, store: &dyn Storage) -> std::io::Result<Self> {
        std::fs::create_dir_all(folder)?;
        let path = folder.join("blocks_0");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let offset = store
            .get_json::<crate::store::FileInfo>(Keyspace::File, BLOCK_FILE_META_KEY)
            .ok()
            .flatten()
            .map(|info| info.last_offset)
            .unwrap_or(0);
        Ok(Self {
            file: Mutex::new(file),
            path: "blocks_0".to_string(),
            offset: AtomicU64::new(offset),
        })
    }

    /// Appends `bytes`, returning the offset it was written at. Matches
    /// spec.md §6 "file offsets are assigned by the driver, never by the
    /// fetcher or the wire".
    fn append(&self, bytes: &[u8]) -> std::io::Result<u64> {
        let mut file = self.file.lock().expect("mutex poisoned");
        let offset = self.offset.fetch_add(bytes.len() as u64, Ordering::SeqCst);
        file.write_all(bytes)?;
        file.flush()?;
        Ok(offset)
    }
}

pub struct WorkerHandles {
    pub indexer: JoinHandle<anyhow::Result<()>>,
    pub cache: JoinHandle<anyhow::Result<()>>,
    pub node_test: JoinHandle<anyhow::Result<()>>,
}

pub struct Pipeline {
    store: Arc<dyn Storage>,
    pool: PeerPool,
    fetcher: BlockFetcher,
    source: BlockSource,
    file_writer: BlockFileWriter,
    queues: [crate::workers::WorkerQueue; 3],
}

impl Pipeline {
    /// Opens storage, builds the peer pool from `config`, and spawns the
    /// three index workers on their own threads. Returns the pipeline plus
    /// handles the caller should join on shutdown, and the shared cache
    /// handle / last-100 ring the RPC layer reads from.
    pub fn start(
        config: &NodeConfig,
        db_path: &Path,
    ) -> anyhow::Result<(Self, WorkerHandles, Arc<CacheHandle>, Arc<Mutex<std::collections::VecDeque<chain_common::Hash>>>)> {
        let store: Arc<dyn Storage> = Arc::new(RocksStorage::open(db_path)?);

        let peers: Vec<Arc<PeerTransport>> = config
            .resolve_peers()?
            .into_iter()
            .map(|p| Arc::new(PeerTransport::new(p.name, p.endpoint, config.count_connections)))
            .collect();
        let pool = PeerPool::new(peers, config.peer_broadcast_width);

        let frontier = indexer::IndexerWorker::initial_watermark(&*store)?;
        // Signature verification is always on; preload compression is a
        // bandwidth optimization this node always asks for.
        let source = BlockSource::new(frontier + 1, true, true);

        let file_writer = BlockFileWriter::open(&config.path_to_folder, &*store)?;

        let (indexer_tx, indexer_rx) = new_queue();
        let (cache_tx, cache_rx) = new_queue();
        let (node_test_tx, node_test_rx) = new_queue();

        let cache_handle = CacheHandle::new(config.max_count_elements_block_cache, config.max_count_elements_txs_cache);
        let last_100 = indexer::IndexerWorker::new_last_100_handle();

        let indexer_store = store.clone();
        let indexer_last_100 = last_100.clone();
        let indexer_join = std::thread::spawn(move || indexer::IndexerWorker::run(indexer_store, indexer_rx, indexer_last_100));

        let cache_store = store.clone();
        let cache_handle_for_worker = cache_handle.clone();
        let cache_join = std::thread::spawn(move || cache::CacheWorker::run(cache_store, cache_handle_for_worker, cache_rx));

        let node_test_store = store.clone();
        let node_test_join = std::thread::spawn(move || node_test::NodeTestWorker::run(node_test_store, node_test_rx));

        let handles = WorkerHandles { indexer: indexer_join, cache: cache_join, node_test: node_test_join };

        let pipeline = Pipeline {
            store,
            pool,
            fetcher: BlockFetcher::new(),
            source,
            file_writer,
            queues: [indexer_tx, cache_tx, node_test_tx],
        };

        Ok((pipeline, handles, cache_handle, last_100))
    }

    pub fn stop_flag(&self) -> Arc<std::sync::atomic::AtomicBool> {
        self.pool.stop_flag()
    }

    /// Shares the underlying store with the RPC layer, so reads never go
    /// through a worker queue.
    pub fn store_handle(&self) -> Arc<dyn Storage> {
        self.store.clone()
    }

    /// Runs the pull loop until `stop` is set. Errors from a single round
    /// are logged and the loop retries after the idle floor, per spec.md
    /// §4.4 "Failure policy — transport failure restarts the round after a
    /// bounded pause".
    pub async fn run(&mut self, stop: Arc<std::sync::atomic::AtomicBool>) -> NodeResult<()> {
        while !stop.load(Ordering::SeqCst) {
            match self.source.pull_round(&self.pool, &mut self.fetcher).await {
                Ok(blocks) if blocks.is_empty() => {
                    tokio::time::sleep(IDLE_FLOOR).await;
                }
                Ok(blocks) => {
                    for emitted in blocks {
                        self.handle_emitted(emitted)?;
                    }
                }
                Err(e) => {
                    warn!("pull round failed: {e}");
                    tokio::time::sleep(IDLE_FLOOR).await;
                }
            }
        }
        self.shutdown_workers();
        Ok(())
    }

    fn handle_emitted(&mut self, mut emitted: EmittedBlock) -> NodeResult<()> {
        let offset = self
            .file_writer
            .append(&emitted.raw_dump)
            .map_err(|e| crate::error::NodeError::Protocol(format!("block file write failed: {e}")))?;
        emitted.block.header.file_offset = offset;
        emitted.block.header.file_path = self.file_writer.path.clone();
        for tx in &mut emitted.block.transactions {
            tx.file_offset = offset;
        }

        let block = Arc::new(emitted.block);
        let item = WorkItem { block: block.clone(), raw_dump: Arc::new(emitted.raw_dump) };

        for queue in &self.queues {
            if queue.send(WorkerMessage::Apply(item.clone())).is_err() {
                warn!("a worker queue has hung up; it likely panicked");
            }
        }

        self.persist_tip(&block)?;
        info!("applied block {} at height {}", block.hash(), block.height());
        Ok(())
    }

    /// Persists `BlockMetadata` only after every worker queue accepted the
    /// block (spec.md §5 "chain-head metadata is only advanced once every
    /// worker is known to have the block in its queue"). Also persists the
    /// block file's write offset in the same batch, so a restart resumes
    /// appending past every byte already committed rather than re-using an
    /// offset (spec.md §3/§6, §8.3 idempotent restart).
    fn persist_tip(&self, block: &BlockInfo) -> NodeResult<()> {
        let mut batch = WriteBatch::new();
        batch.put_json(
            Keyspace::BlockMeta,
            b"BlockMetadata".to_vec(),
            &BlockMetadata {
                preferred_tip_hash: *block.hash(),
                preferred_parent_hash: block.header.parent_hash,
            },
        )?;
        batch.put_json(
            Keyspace::File,
            BLOCK_FILE_META_KEY.to_vec(),
            &crate::store::FileInfo { last_offset: self.file_writer.offset.load(Ordering::SeqCst) },
        )?;
        self.store.commit(batch)?;
        Ok(())
    }

    fn shutdown_workers(&self) {
        for queue in &self.queues {
            let _ = queue.send(WorkerMessage::Shutdown);
        }
    }
}
