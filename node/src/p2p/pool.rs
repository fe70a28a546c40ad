//! Peer pool (C2, spec.md §4.2): broadcast, segmented fetch, and the
//! `requests(n)` primitive, all fanning out over a peer set with a fixed
//! concurrency width and a caller-visible stop flag.

use crate::error::{NodeError, NodeResult};
use crate::p2p::transport::PeerTransport;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const DEFAULT_FANOUT_WIDTH: usize = 8;

/// One peer's outcome for a broadcast call.
pub enum PeerOutcome {
    Success(Vec<u8>),
    Error(NodeError),
}

pub struct PeerPool {
    peers: Vec<Arc<PeerTransport>>,
    fanout_width: usize,
    stop: Arc<AtomicBool>,
}

impl PeerPool {
    pub fn new(peers: Vec<Arc<PeerTransport>>, fanout_width: usize) -> Self {
        Self {
            peers,
            fanout_width: fanout_width.max(1),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Builds a sub-pool restricted to the named peers, sharing this pool's
    /// stop flag and fanout width (spec.md §8 S2: once tip discovery picks
    /// out the peers reporting the max height, subsequent fetches in that
    /// round use that same server list rather than the whole pool). Falls
    /// back to the full pool if none of `names` match — an empty pool would
    /// make every subsequent fetch fail for no protocol reason.
    pub fn restrict_to(&self, names: &[String]) -> PeerPool {
        let restricted: Vec<Arc<PeerTransport>> =
            self.peers.iter().filter(|p| names.iter().any(|n| n == &p.name)).cloned().collect();
        let peers = if restricted.is_empty() { self.peers.clone() } else { restricted };
        PeerPool { peers, fanout_width: self.fanout_width, stop: self.stop.clone() }
    }

    /// A caller-visible stop flag: outstanding waiters notice it at the
    /// next check point; in-flight HTTP calls finish or error but their
    /// results are discarded (spec.md §4.2 "Cancellation").
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Fires the same (query, body) at every peer in parallel, up to
    /// `fanout_width` at a time. Every peer's outcome is delivered to
    /// `sink`. Returns once all peers have answered or errored, or early
    /// if the stop flag is set.
    pub async fn broadcast<F>(&self, query: &str, body: Option<Vec<u8>>, sink: Arc<Mutex<F>>)
    where
        F: FnMut(&str, PeerOutcome) + Send,
    {
        let width = self.fanout_width;
        stream::iter(self.peers.iter().cloned())
            .map(|peer| {
                let query = query.to_string();
                let body = body.clone();
                let sink = sink.clone();
                let stopped = self.is_stopped();
                async move {
                    if stopped {
                        return;
                    }
                    let outcome = match peer.call(&query, body).await {
                        Ok(bytes) => PeerOutcome::Success(bytes),
                        Err(e) => PeerOutcome::Error(e),
                    };
                    let mut sink = sink.lock().expect("sink mutex poisoned");
                    sink(&peer.name, outcome);
                }
            })
            .buffer_unordered(width)
            .for_each(|_| async {})
            .await;
    }

    /// Runs exactly `n` independent requests in parallel, one per peer
    /// assigned round-robin, each built by `build(index)`.
    pub async fn requests<B>(&self, n: usize, build: B) -> NodeResult<Vec<Vec<u8>>>
    where
        B: Fn(usize) -> (String, Option<Vec<u8>>) + Send + Sync,
    {
        if self.peers.is_empty() {
            return Err(NodeError::Protocol("no peers available".into()));
        }
        let width = self.fanout_width;
        let results: Vec<NodeResult<Vec<u8>>> = stream::iter(0..n)
            .map(|i| {
                let peer = self.peers[i % self.peers.len()].clone();
                let (query, body) = build(i);
                async move { peer.call(&query, body).await }
            })
            .buffer_unordered(width)
            .collect::<Vec<_>>()
            .await;

        results.into_iter().collect()
    }

    /// Segmented fetch (spec.md §4.2 "Segmented fetch"): splits a response
    /// of total size `total_size` into `ceil(total_size / min_segment)`
    /// segments (bounded by `peer_count * connections_per_peer`),
    /// distributes them round-robin, reassigns on per-segment failure, and
    /// assembles results in index order. Fails the whole call if a
    /// segment exhausts every eligible peer, or if any parser rejects its
    /// segment.
    pub async fn segmented_fetch<B, P, T>(
        &self,
        total_size: u64,
        min_segment: u64,
        connections_per_peer: usize,
        build_segment: B,
        parse_segment: P,
    ) -> NodeResult<Vec<T>>
    where
        B: Fn(usize) -> (String, Option<Vec<u8>>) + Send + Sync,
        P: Fn(usize, Vec<u8>) -> NodeResult<T> + Send + Sync,
    {
        if self.peers.is_empty() {
            return Err(NodeError::Protocol("no peers available".into()));
        }

        let raw_count = total_size.div_ceil(min_segment.max(1)).max(1) as usize;
        let bound = self.peers.len() * connections_per_peer.max(1);
        let segment_count = raw_count.min(bound.max(1));

        let mut results: Vec<Option<T>> = (0..segment_count).map(|_| None).collect();

        for index in 0..segment_count {
            if self.is_stopped() {
                return Err(NodeError::Protocol("stopped during segmented fetch".into()));
            }
            let (query, body) = build_segment(index);
            let mut last_error = None;
            let mut assigned = false;
            for attempt in 0..self.peers.len() {
                let peer = &self.peers[(index + attempt) % self.peers.len()];
                match peer.call(&query, body.clone()).await {
                    Ok(bytes) => match parse_segment(index, bytes) {
                        Ok(parsed) => {
                            results[index] = Some(parsed);
                            assigned = true;
                            break;
                        }
                        Err(e) => return Err(e),
                    },
                    Err(e) => last_error = Some(e),
                }
            }
            if !assigned {
                return Err(last_error.unwrap_or_else(|| {
                    NodeError::Protocol(format!("segment {index} had no eligible peer"))
                }));
            }
        }

        Ok(results.into_iter().map(|r| r.expect("every segment assigned or errored")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_reports_empty() {
        let pool = PeerPool::new(Vec::new(), DEFAULT_FANOUT_WIDTH);
        assert!(pool.is_empty());
    }

    #[test]
    fn stop_flag_round_trips() {
        let pool = PeerPool::new(Vec::new(), DEFAULT_FANOUT_WIDTH);
        assert!(!pool.stop_flag().load(Ordering::SeqCst));
        pool.request_stop();
        assert!(pool.stop_flag().load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn requests_against_empty_pool_errors() {
        let pool = PeerPool::new(Vec::new(), DEFAULT_FANOUT_WIDTH);
        let result = pool.requests(3, |_| ("".to_string(), None)).await;
        assert!(result.is_err());
    }
}
