//! Worker pipeline (C7/C8/C9, spec.md §4.5): three independently-threaded
//! consumers of the same block stream, each with its own durable
//! resume watermark. All three share this module's queue/shutdown shape;
//! only the per-block application logic differs.

pub mod cache;
pub mod indexer;

use chain_common::BlockInfo;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

/// One unit of work handed from the driver to every worker queue
/// (spec.md §4.5 "An unbounded FIFO queue of `(blockInfo, rawDump)` work
/// items"). `Arc`-shared because all three workers receive the same
/// block.
#[derive(Clone)]
pub struct WorkItem {
    pub block: Arc<BlockInfo>,
    pub raw_dump: Arc<Vec<u8>>,
}

pub enum WorkerMessage {
    Apply(WorkItem),
    Shutdown,
}

/// A worker's input handle: send blocks, then `Shutdown` to unblock its
/// dedicated thread (spec.md §4.5 "On dequeue of a shutdown sentinel the
/// worker exits").
pub type WorkerQueue = Sender<WorkerMessage>;

pub fn new_queue() -> (WorkerQueue, Receiver<WorkerMessage>) {
    std::sync::mpsc::channel()
}
