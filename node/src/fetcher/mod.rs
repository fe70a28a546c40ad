//! Block fetcher (C3, spec.md §4.3): a look-ahead header/body cache plus
//! the batched RPCs that fill it. Owned exclusively by the driver thread
//! (design note "Shared mutable caches inside the fetcher") — every method
//! here takes `&mut self`, no interior mutability, no mutex.

use crate::error::{NodeError, NodeResult};
use crate::p2p::{
    pool::PeerPool,
    protocol::{methods, CountBlocksResponse, HeaderWire, PreloadEnvelope},
};
use chain_common::Hash;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Matches the original's `COUNT_ADVANCED_BLOCKS` (NetworkBlockSource.cpp).
pub const MAX_ADVANCED_LOAD_BLOCKS: u64 = 8;
/// Matches the original's header/body batch RPC width.
pub const BATCH_SIZE: u64 = 8;
/// `ESTIMATE_SIZE_SIGNATURE` from GetNewBlocksFromServers.cpp.
pub const ESTIMATE_SIZE_SIGNATURE: u64 = 250;
/// `MAX_BLOCK_SIZE_WITHOUT_ADVANCE` from GetNewBlocksFromServers.cpp.
pub const MAX_BLOCK_SIZE_WITHOUT_ADVANCE: u64 = 100_000;
/// Minimum per-segment size for a single-block ranged download (spec.md
/// §4.3, "`S_min` = 10 KB").
pub const RANGED_SEGMENT_MIN: u64 = 10_000;

/// Lightweight header as returned by the wire (spec.md §6 `HeaderWire`),
/// before C5 decodes the full block kind/producer metadata from the body.
#[derive(Debug, Clone)]
pub struct RawHeader {
    pub height: u64,
    pub hash: Hash,
    pub parent_hash: Hash,
    pub size: u64,
    pub file_name: String,
}

impl TryFrom<HeaderWire> for RawHeader {
    type Error = NodeError;

    fn try_from(wire: HeaderWire) -> Result<Self, Self::Error> {
        Ok(Self {
            height: wire.number,
            hash: Hash::from_hex(&wire.hash)
                .map_err(|e| NodeError::Protocol(format!("bad header hash: {e}")))?,
            parent_hash: Hash::from_hex(&wire.prev_hash)
                .map_err(|e| NodeError::Protocol(format!("bad parent hash: {e}")))?,
            size: wire.size,
            file_name: wire.file_name,
        })
    }
}

/// Tip discovery result (spec.md §4.3 "Tip discovery").
#[derive(Debug, Clone)]
pub struct TipInfo {
    pub height: u64,
    pub peers: Vec<String>,
    pub extra_blocks: HashSet<Hash>,
}

pub struct BlockFetcher {
    advanced_headers: BTreeMap<u64, RawHeader>,
    advanced_dumps: HashMap<Hash, Vec<u8>>,
}

impl Default for BlockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockFetcher {
    pub fn new() -> Self {
        Self {
            advanced_headers: BTreeMap::new(),
            advanced_dumps: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.advanced_headers.clear();
        self.advanced_dumps.clear();
    }

    /// Broadcasts `get-count-blocks` and aggregates by taking the maximum
    /// reported tip height, recording the peers that reported it and
    /// their union of extra-block hashes (spec.md §4.3, §8 S2).
    pub async fn discover_tip(&self, pool: &PeerPool) -> NodeResult<TipInfo> {
        if pool.is_empty() {
            return Err(NodeError::Transport {
                peer: "*".into(),
                message: "no peers configured".into(),
            });
        }

        #[derive(Default)]
        struct Agg {
            best_height: Option<u64>,
            peers: Vec<String>,
            extra_blocks: HashSet<Hash>,
            last_error: Option<String>,
        }

        let agg = Arc::new(Mutex::new(Agg::default()));
        let sink_agg = agg.clone();
        let sink = Arc::new(Mutex::new(move |peer: &str, outcome: crate::p2p::pool::PeerOutcome| {
            use crate::p2p::pool::PeerOutcome::*;
            let mut state = sink_agg.lock().expect("mutex poisoned");
            match outcome {
                Error(e) => state.last_error = Some(e.to_string()),
                Success(bytes) => {
                    let parsed: Result<CountBlocksResponse, _> = serde_json::from_slice(&bytes);
                    match parsed {
                        Err(e) => state.last_error = Some(format!("bad count-blocks reply: {e}")),
                        Ok(resp) => {
                            let extra: HashSet<Hash> = resp
                                .extra_blocks
                                .iter()
                                .filter_map(|h| Hash::from_hex(h).ok())
                                .collect();
                            match state.best_height {
                                None => {
                                    state.best_height = Some(resp.count_blocks);
                                    state.peers = vec![peer.to_string()];
                                    state.extra_blocks = extra;
                                }
                                Some(best) if resp.count_blocks > best => {
                                    state.best_height = Some(resp.count_blocks);
                                    state.peers = vec![peer.to_string()];
                                    state.extra_blocks = extra;
                                }
                                Some(best) if resp.count_blocks == best => {
                                    state.peers.push(peer.to_string());
                                    state.extra_blocks.extend(extra);
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
        }));

        pool.broadcast(methods::GET_COUNT_BLOCKS, None, sink).await;

        let state = agg.lock().expect("mutex poisoned");
        match state.best_height {
            Some(height) => Ok(TipInfo {
                height,
                peers: state.peers.clone(),
                extra_blocks: state.extra_blocks.clone(),
            }),
            None => Err(NodeError::Transport {
                peer: "*".into(),
                message: state
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "no peer answered get-count-blocks".into()),
            }),
        }
    }

    /// Optional look-ahead preload (spec.md §4.3 "Look-ahead preload").
    /// Merges decoded headers/dumps into the caches; a malformed envelope
    /// (declared count disagreeing with the decoded header section, §8 S5)
    /// is rejected and simply leaves the caches untouched so the driver
    /// falls back to the non-preload path.
    pub async fn preload(
        &mut self,
        pool: &PeerPool,
        current_height: u64,
        compress: bool,
        signing: bool,
        window: u64,
    ) -> NodeResult<()> {
        let window = window.min(10);
        let params = json!({
            "height": current_height,
            "compress": compress,
            "signing": signing,
            "window": window,
        });
        let raw = pool
            .requests(1, move |_| {
                (
                    format!("?method={}", methods::PRE_LOAD),
                    Some(serde_json::to_vec(&params).unwrap()),
                )
            })
            .await?
            .into_iter()
            .next()
            .expect("requests(1) yields exactly one element");

        let envelope = PreloadEnvelope::decode(&raw)
            .map_err(|e| NodeError::Protocol(format!("bad pre-load envelope: {e}")))?;

        let headers: Vec<HeaderWire> = serde_json::from_slice(&envelope.headers_bytes)
            .map_err(|e| NodeError::Protocol(format!("bad pre-load headers: {e}")))?;

        if headers.len() as u64 != envelope.declared_count {
            return Err(NodeError::Protocol(format!(
                "pre-load declared {} blocks but decoded {}",
                envelope.declared_count,
                headers.len()
            )));
        }

        let bodies = crate::p2p::protocol::decode_length_prefixed(&envelope.bodies_bytes)
            .map_err(|e| NodeError::Protocol(format!("bad pre-load bodies: {e}")))?;

        for (wire, body) in headers.into_iter().zip(bodies.into_iter()) {
            let raw_header: RawHeader = wire.try_into()?;
            let hash = raw_header.hash;
            self.advanced_headers.insert(raw_header.height, raw_header);
            self.advanced_dumps.insert(hash, body);
        }

        Ok(())
    }

    /// `getBlockHeader(h, maxH, peers)` (spec.md §4.3).
    pub async fn get_block_header(
        &mut self,
        height: u64,
        max_height: u64,
        pool: &PeerPool,
    ) -> NodeResult<RawHeader> {
        if let Some(cached) = self.advanced_headers.get(&height) {
            return Ok(cached.clone());
        }

        self.advanced_headers.clear();

        let count = (max_height - height + 1).min(MAX_ADVANCED_LOAD_BLOCKS);
        let parts = count.div_ceil(BATCH_SIZE).max(1);

        let results = pool
            .requests(parts as usize, move |part| {
                let part_start = height + part as u64 * BATCH_SIZE;
                let part_count = BATCH_SIZE.min(height + count - part_start);
                if part_count <= 1 {
                    (
                        format!("?method={}&number={}", methods::GET_BLOCK_BY_NUMBER, part_start),
                        None,
                    )
                } else {
                    (
                        format!(
                            "?method={}&from={}&count={}",
                            methods::GET_BLOCKS,
                            part_start,
                            part_count
                        ),
                        None,
                    )
                }
            })
            .await?;

        let mut expected_height = height;
        for raw in results {
            let wires: Vec<HeaderWire> = serde_json::from_slice(&raw)
                .or_else(|_| serde_json::from_slice::<HeaderWire>(&raw).map(|h| vec![h]))
                .map_err(|e| NodeError::Protocol(format!("bad header response: {e}")))?;

            for wire in wires {
                if wire.number != expected_height {
                    return Err(NodeError::Protocol(format!(
                        "expected header height {expected_height}, peer returned {}",
                        wire.number
                    )));
                }
                let raw_header: RawHeader = wire.try_into()?;
                self.advanced_headers.insert(raw_header.height, raw_header);
                expected_height += 1;
            }
        }

        self.advanced_headers
            .get(&height)
            .cloned()
            .ok_or_else(|| NodeError::Protocol(format!("header {height} missing from batch response")))
    }

    /// `getBlockDump(hash, size, hints, sign)` (spec.md §4.3).
    pub async fn get_block_dump(
        &mut self,
        hash: &Hash,
        size: u64,
        sign: bool,
        pool: &PeerPool,
    ) -> NodeResult<Vec<u8>> {
        if let Some(cached) = self.advanced_dumps.get(hash) {
            return Ok(cached.clone());
        }

        let overhead = if sign { ESTIMATE_SIZE_SIGNATURE } else { 0 };
        if size + overhead > MAX_BLOCK_SIZE_WITHOUT_ADVANCE {
            return self.fetch_single_ranged(hash, size + overhead, sign, pool).await;
        }

        self.fetch_batch_and_return(hash, pool).await
    }

    async fn fetch_single_ranged(
        &mut self,
        hash: &Hash,
        total_size: u64,
        sign: bool,
        pool: &PeerPool,
    ) -> NodeResult<Vec<u8>> {
        let hash_hex = hash.to_hex();
        let results = pool
            .segmented_fetch(
                total_size,
                RANGED_SEGMENT_MIN,
                4,
                move |index| {
                    let from = index as u64 * RANGED_SEGMENT_MIN;
                    let to = (from + RANGED_SEGMENT_MIN).min(total_size);
                    (
                        format!(
                            "?method={}&hash={}&fromByte={}&toByte={}&isSign={}",
                            methods::GET_DUMP_BLOCK_BY_HASH,
                            hash_hex,
                            from,
                            to,
                            sign
                        ),
                        None,
                    )
                },
                |_index, bytes| Ok(bytes),
            )
            .await?;

        let mut assembled = Vec::with_capacity(total_size as usize);
        for chunk in results {
            assembled.extend_from_slice(&chunk);
        }
        self.advanced_dumps.insert(*hash, assembled.clone());
        Ok(assembled)
    }

    async fn fetch_batch_and_return(&mut self, hash: &Hash, pool: &PeerPool) -> NodeResult<Vec<u8>> {
        let prefix: Vec<Hash> = self
            .advanced_headers
            .values()
            .filter(|h| h.size <= MAX_BLOCK_SIZE_WITHOUT_ADVANCE)
            .map(|h| h.hash)
            .collect();

        let hashes = if prefix.contains(hash) {
            prefix
        } else {
            vec![*hash]
        };

        let hash_list: Vec<String> = hashes.iter().map(|h| h.to_hex()).collect();
        let raw = pool
            .requests(1, move |_| {
                (
                    format!(
                        "?method={}&hashes={}",
                        methods::GET_DUMPS_BLOCKS_BY_HASH,
                        hash_list.join(",")
                    ),
                    None,
                )
            })
            .await?
            .into_iter()
            .next()
            .expect("requests(1) yields exactly one element");

        let chunks = crate::p2p::protocol::decode_length_prefixed(&raw)
            .map_err(|e| NodeError::Protocol(format!("bad dumps-by-hash response: {e}")))?;

        if chunks.len() != hashes.len() {
            return Err(NodeError::Protocol(format!(
                "requested {} dumps, got {}",
                hashes.len(),
                chunks.len()
            )));
        }

        for (h, chunk) in hashes.iter().zip(chunks.into_iter()) {
            self.advanced_dumps.insert(*h, chunk);
        }

        self.advanced_dumps
            .get(hash)
            .cloned()
            .ok_or_else(|| NodeError::Protocol(format!("dump for {hash} missing from batch response")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_header_parses_from_wire() {
        let wire = HeaderWire {
            number: 5,
            hash: Hash::new([1; 32]).to_hex(),
            prev_hash: Hash::new([0; 32]).to_hex(),
            size: 1000,
            file_name: "blocks_0".into(),
        };
        let header: RawHeader = wire.try_into().unwrap();
        assert_eq!(header.height, 5);
    }

    #[tokio::test]
    async fn empty_pool_tip_discovery_errors() {
        let pool = PeerPool::new(Vec::new(), 8);
        let fetcher = BlockFetcher::new();
        assert!(fetcher.discover_tip(&pool).await.is_err());
    }

    #[test]
    fn cached_dump_short_circuits() {
        let mut fetcher = BlockFetcher::new();
        let hash = Hash::new([9; 32]);
        fetcher.advanced_dumps.insert(hash, vec![1, 2, 3]);
        assert_eq!(fetcher.advanced_dumps.get(&hash).unwrap(), &vec![1, 2, 3]);
    }
}
