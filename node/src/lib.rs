//! Read-only P2P block replication node: pulls blocks from upstream chain
//! daemons over HTTP, verifies and decodes them, and indexes balances,
//! transactions, delegation state, tokens and node-test telemetry into a
//! local RocksDB store. See `rpc` for the read-only JSON query surface.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod p2p;
pub mod parser;
pub mod pipeline;
pub mod rpc;
pub mod source;
pub mod store;
pub mod workers;
