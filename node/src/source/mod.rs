//! Block source (C4, spec.md §4.4): the state machine that turns the raw
//! fetcher/pool primitives into an ordered stream of blocks (plus their
//! "side blocks" — extra tip candidates peers disagree on) ready for the
//! parser and the worker pipeline.
//!
//! States: `Discover` (who's ahead, by how much) → `Preload` (optional
//! look-ahead window fetch) → `Drain` (fetch+parse the window in order) →
//! `TailAdditions` (process any side blocks the tip discovery turned up but
//! the main window didn't cover) → `Idle` (nothing new; sleep the floor).

use crate::error::{NodeError, NodeResult};
use crate::fetcher::BlockFetcher;
use crate::p2p::pool::PeerPool;
use chain_common::{BlockInfo, Hash};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::time::Duration;

/// Per spec.md §4.4 "the driver never polls more than once per floor
/// interval even when it has nothing new to report".
pub const IDLE_FLOOR: Duration = Duration::from_millis(500);

/// Maximum blocks fetched and parsed in one round (spec.md §4.4 "window
/// size is `min(8, tip - frontier + 1)`" — mirrors the fetcher's own
/// `MAX_ADVANCED_LOAD_BLOCKS`).
pub const MAX_WINDOW: u64 = 8;

/// Bounded parse/verify parallelism (spec.md §4.4 "up to 8 blocks are
/// parsed and signature-verified concurrently").
const PARSE_CONCURRENCY: usize = 8;

/// Where an emitted block sits relative to the main chain's linear
/// progression (spec.md §4.4 "side blocks surface before or after the
/// frontier block they're adjacent to, never interleaved with it").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Slot {
    BeforeBlock = 0,
    Block = 1,
    AfterBlock = 2,
}

#[derive(Debug, Clone)]
pub struct EmittedBlock {
    pub slot: Slot,
    pub block: BlockInfo,
    pub raw_dump: Vec<u8>,
}

/// Drives one pull round. Holds no network state of its own beyond the
/// frontier height — the fetcher/pool are passed in by the caller (the
/// pipeline owns their lifetime, per the driver-owns-everything design
/// note).
pub struct BlockSource {
    frontier: u64,
    sign_blocks: bool,
    compress_preload: bool,
}

impl BlockSource {
    pub fn new(frontier: u64, sign_blocks: bool, compress_preload: bool) -> Self {
        Self { frontier, sign_blocks, compress_preload }
    }

    pub fn frontier(&self) -> u64 {
        self.frontier
    }

    /// Runs exactly one Discover→Preload→Drain→TailAdditions cycle.
    /// Returns an empty vec (caller should sleep `IDLE_FLOOR`) when the
    /// frontier has already caught up to every peer's reported tip.
    ///
    /// Transport failures abort the round and clear the fetcher's caches
    /// so the next call resamples from scratch (spec.md §4.4 "Failure
    /// policy"); a parse/verify failure is propagated to the caller
    /// immediately since it can indicate a tampered or forked upstream.
    pub async fn pull_round(
        &mut self,
        pool: &PeerPool,
        fetcher: &mut BlockFetcher,
    ) -> NodeResult<Vec<EmittedBlock>> {
        let tip = match fetcher.discover_tip(pool).await {
            Ok(tip) => tip,
            Err(e) => {
                fetcher.clear();
                return Err(e);
            }
        };

        if tip.height < self.frontier {
            // Every peer is behind us; nothing to do this round.
            return Ok(Vec::new());
        }
        if tip.height == self.frontier && tip.extra_blocks.is_empty() {
            return Ok(Vec::new());
        }

        let window = (tip.height - self.frontier + 1).min(MAX_WINDOW);

        // Once tip discovery has picked out the peers reporting the max
        // height, the rest of the round fetches against that same server
        // list (spec.md §8 S2), not the whole pool.
        let round_pool = pool.restrict_to(&tip.peers);
        let pool = &round_pool;

        if window > 1 {
            // Best-effort: a preload failure just means we fall back to
            // the per-height path below, not a round failure.
            let _ = fetcher.preload(pool, self.frontier, self.compress_preload, self.sign_blocks, window).await;
        }

        let drained = match self.drain(pool, fetcher, window).await {
            Ok(blocks) => blocks,
            Err(e) => {
                fetcher.clear();
                return Err(e);
            }
        };

        let mut emitted = drained;
        emitted.extend(self.tail_additions(pool, fetcher, &tip.extra_blocks).await?);
        Ok(emitted)
    }

    async fn drain(
        &mut self,
        pool: &PeerPool,
        fetcher: &mut BlockFetcher,
        window: u64,
    ) -> NodeResult<Vec<EmittedBlock>> {
        let max_height = self.frontier + window - 1;
        let mut fetched = Vec::with_capacity(window as usize);

        for height in self.frontier..=max_height {
            let header = fetcher.get_block_header(height, max_height, pool).await?;
            let dump = fetcher.get_block_dump(&header.hash, header.size, self.sign_blocks, pool).await?;
            fetched.push((header.hash, header.file_name.clone(), header.height, dump));
        }

        let sign = self.sign_blocks;
        let parsed: Vec<NodeResult<(u64, BlockInfo, Vec<u8>)>> = stream::iter(fetched.into_iter())
            .map(|(hash, file_name, height, dump)| {
                async move {
                    let mut parsed = crate::parser::parse_block(&dump, &hash, &file_name, 0, sign).map_err(|e| {
                        use crate::parser::ParseError::*;
                        match e {
                            VerificationFailed(_) => NodeError::Signature { hash: hash.to_hex() },
                            other => NodeError::Protocol(format!("block {}: {other}", hash.to_hex())),
                        }
                    })?;
                    stamp_height(&mut parsed, height);
                    Ok((height, parsed, dump))
                }
            })
            .buffer_unordered(PARSE_CONCURRENCY)
            .collect()
            .await;

        let mut by_height: Vec<(u64, BlockInfo, Vec<u8>)> =
            parsed.into_iter().collect::<NodeResult<Vec<_>>>()?;
        by_height.sort_by_key(|(h, _, _)| *h);

        let emitted: Vec<EmittedBlock> = by_height
            .into_iter()
            .map(|(_, block, raw_dump)| EmittedBlock { slot: Slot::Block, block, raw_dump })
            .collect();

        // Advance the frontier only on successful `Block`-slot emission
        // (spec.md §4.4 "N only moves forward once its block has been
        // fully parsed and handed to the caller").
        self.frontier = max_height + 1;
        Ok(emitted)
    }

    /// Fetches and parses any tip-discovery side blocks not already
    /// covered by the main drain window (spec.md §4.4 "TailAdditions").
    /// These are emitted as `AfterBlock` slots relative to the frontier
    /// block they trail.
    async fn tail_additions(
        &self,
        pool: &PeerPool,
        fetcher: &mut BlockFetcher,
        extra: &HashSet<Hash>,
    ) -> NodeResult<Vec<EmittedBlock>> {
        // Side blocks attach to the last accepted height, not a height of
        // their own (spec.md GLOSSARY "does not advance height") — the
        // frontier was already bumped past it by `drain`.
        let host_height = self.frontier.saturating_sub(1);
        let mut emitted = Vec::new();
        for hash in extra {
            let dump = match fetcher.get_block_dump(hash, 0, self.sign_blocks, pool).await {
                Ok(dump) => dump,
                Err(_) => continue, // side blocks are best-effort, never fatal
            };
            if let Ok(mut block) = crate::parser::parse_block(&dump, hash, "", 0, self.sign_blocks) {
                stamp_height(&mut block, host_height);
                emitted.push(EmittedBlock { slot: Slot::AfterBlock, block, raw_dump: dump });
            }
        }
        Ok(emitted)
    }
}

/// Stamps the height the driver assigned on acceptance onto a freshly
/// parsed block and its transactions (spec.md §3: height is "assigned by
/// us on acceptance", never carried on the wire, so `parser::parse_block`
/// always returns `header.height == 0` and callers must fill it in here).
fn stamp_height(block: &mut BlockInfo, height: u64) {
    block.header.height = height;
    for tx in &mut block.transactions {
        tx.block_height = height;
    }
}
