//! Black-box test for the pull pipeline (spec.md §4.4): stands up a fake
//! peer over HTTP with `mockito`, answering the handful of query-string
//! methods a two-block round touches, and drives `BlockSource::pull_round`
//! against it end to end — tip discovery, header+dump fetch, parse, and
//! the frontier advance.

use chain_common::{crypto::sha256, Address, BlockHeader, BlockInfo, BlockKind, Hash, IntentStatus, TransactionInfo};
use chain_node::fetcher::BlockFetcher;
use chain_node::p2p::{pool::PeerPool, protocol::methods, transport::PeerTransport};
use chain_node::parser::encode_block_body;
use chain_node::source::{BlockSource, Slot};
use mockito::Matcher;
use std::sync::Arc;

fn sample_tx(from: Address, to: Address, value: u64, seed: u8) -> TransactionInfo {
    TransactionInfo {
        hash: Hash::ZERO,
        from,
        to,
        value,
        nonce: seed as u64,
        data: Vec::new(),
        file_offset: 0,
        block_height: 0,
        status: IntentStatus::Success,
        delegate: None,
        token: None,
    }
}

/// Builds an unsigned block dump plus its hash, mirroring how the parser's
/// own fixtures are constructed (`parser::tests::sample_block`).
fn build_dump(parent_hash: Hash, seed: u8) -> (Hash, Vec<u8>) {
    let alice = Address::from_bytes([seed; 25]);
    let bob = Address::from_bytes([seed.wrapping_add(1); 25]);
    let block = BlockInfo {
        header: BlockHeader {
            hash: Hash::ZERO,
            parent_hash,
            height: 0,
            size: 0,
            file_path: String::new(),
            file_offset: 0,
            kind: BlockKind::Simple,
            producer_signature: None,
            producer_pubkey: None,
            producer_address: None,
            tx_count: 1,
            signing_tx_count: 0,
        },
        transactions: vec![sample_tx(alice, bob, 10, seed)],
    };
    let body = encode_block_body(&block);
    let hash = Hash::new(sha256(&body));
    (hash, body)
}

fn length_prefixed(chunks: &[Vec<u8>]) -> Vec<u8> {
    use byteorder::{BigEndian, WriteBytesExt};
    let mut out = Vec::new();
    for chunk in chunks {
        out.write_u32::<BigEndian>(chunk.len() as u32).unwrap();
        out.extend_from_slice(chunk);
    }
    out
}

#[tokio::test]
async fn pull_round_drains_a_two_block_window() {
    let mut server = mockito::Server::new_async().await;

    let (hash1, dump1) = build_dump(Hash::ZERO, 1);
    let (hash2, dump2) = build_dump(hash1, 3);

    let _count_blocks = server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("method".into(), methods::GET_COUNT_BLOCKS.into()))
        .with_status(200)
        .with_body(r#"{"count_blocks":2,"extra_blocks":[]}"#)
        .create_async()
        .await;

    let headers_json = format!(
        r#"[{{"number":1,"hash":"{}","prev_hash":"{}","size":{},"fileName":"blocks_0"}},
            {{"number":2,"hash":"{}","prev_hash":"{}","size":{},"fileName":"blocks_0"}}]"#,
        hash1.to_hex(),
        Hash::ZERO.to_hex(),
        dump1.len(),
        hash2.to_hex(),
        hash1.to_hex(),
        dump2.len(),
    );
    let _get_blocks = server
        .mock("GET", "/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("method".into(), methods::GET_BLOCKS.into()),
            Matcher::UrlEncoded("from".into(), "1".into()),
            Matcher::UrlEncoded("count".into(), "2".into()),
        ]))
        .with_status(200)
        .with_body(headers_json)
        .create_async()
        .await;

    // The header fetch for height 1 primes `advanced_headers` with both
    // heights at once (the batch response covers the whole window), so the
    // dump fetch for hash1 sees hash2 in its "small enough" prefix too and
    // asks for both dumps in a single `get-dumps-blocks-by-hash` call; the
    // second `get_block_dump` call is then served entirely from cache.
    let hashes_param = format!("{},{}", hash1.to_hex(), hash2.to_hex());
    let _dumps_mock = server
        .mock("GET", "/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("method".into(), methods::GET_DUMPS_BLOCKS_BY_HASH.into()),
            Matcher::UrlEncoded("hashes".into(), hashes_param),
        ]))
        .with_status(200)
        .with_body(length_prefixed(&[dump1.clone(), dump2.clone()]))
        .create_async()
        .await;

    let transport = Arc::new(PeerTransport::new("fake-peer".into(), server.url(), 4));
    let pool = PeerPool::new(vec![transport], 8);
    let mut fetcher = BlockFetcher::new();
    let mut source = BlockSource::new(1, false, false);

    let emitted = source.pull_round(&pool, &mut fetcher).await.expect("pull round should succeed");

    assert_eq!(emitted.len(), 2);
    assert!(emitted.iter().all(|e| e.slot == Slot::Block));
    assert_eq!(emitted[0].block.height(), 1);
    assert_eq!(emitted[1].block.height(), 2);
    assert_eq!(emitted[1].block.header.parent_hash, hash1);
    assert_eq!(source.frontier(), 3);
}

#[tokio::test]
async fn pull_round_with_no_peers_errors_without_advancing() {
    let pool = PeerPool::new(Vec::new(), 8);
    let mut fetcher = BlockFetcher::new();
    let mut source = BlockSource::new(1, false, false);

    assert!(source.pull_round(&pool, &mut fetcher).await.is_err());
    assert_eq!(source.frontier(), 1);
}
