//! Cross-crate scenario tests (§8): the full client stack wired together
//! the way `patrold`/`patrol-ctl` actually assemble it, plus a couple of
//! invariants that only show up once multiple crates are in play.

use std::sync::Arc;

use patrol_client::{CannedTransport, Client, UpdateOutcome};
use patrol_core::{wire, PatrolConfig};
use patrol_store::{AddChunk, ChunkStore, FileScratchStore, MemoryChunkStore, SubChunk};

fn test_config() -> Arc<PatrolConfig> {
    Arc::new(PatrolConfig {
        server: "https://example.com".to_string(),
        key: "testkey".to_string(),
        ..PatrolConfig::default()
    })
}

/// S6 — a `pleasereset` directive, driven through the full `Client`, wipes
/// every record for that list and a subsequent lookup finds nothing.
#[tokio::test]
async fn s6_please_reset_through_full_client_clears_matches() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryChunkStore::new());
    let transport = Arc::new(CannedTransport::new());
    let scratch = Arc::new(FileScratchStore::new(dir.path().join("scratch.json")).unwrap());
    let client = Client::new(store, transport.clone(), scratch.clone(), test_config());

    let url = "http://a.b.c/x";
    let variants = patrol_core::canonicalize(url).unwrap();
    let sample = variants.iter().next().unwrap().clone();
    let full_hash = patrol_core::hash::hash(&sample);
    let prefix = patrol_core::hash::prefix(&full_hash);

    transport.push_downloads(200, "i:goog-malware-shavar\nu:cache.example/chunks\n");
    let chunk = wire::ChunkData {
        chunk_number: 1,
        chunk_type: wire::ChunkType::Add,
        prefix_type: wire::PrefixType::Prefix4B,
        hashes: prefix.to_vec(),
        add_numbers: Vec::new(),
    };
    transport.push_redirect("cache.example/chunks", wire::encode_chunk_stream(&[chunk]));
    let results = client.update(&["goog-malware-shavar".to_string()], true).await;
    assert!(matches!(results[0].1, UpdateOutcome::Updated { .. }));

    let mut gethash_body = b"3600\n".to_vec();
    gethash_body.extend_from_slice(b"goog-malware-shavar:32:1\n");
    gethash_body.extend_from_slice(&full_hash);
    transport.push_gethash(200, gethash_body);
    let matches = client.lookup(url, &["goog-malware-shavar".to_string()]).await.unwrap();
    assert_eq!(matches, vec!["goog-malware-shavar".to_string()]);

    transport.push_downloads(200, "i:goog-malware-shavar\nr:pleasereset\n");
    let results = client.update(&["goog-malware-shavar".to_string()], true).await;
    assert_eq!(results[0].1, UpdateOutcome::Reset);

    let matches = client.lookup(url, &["goog-malware-shavar".to_string()]).await.unwrap();
    assert!(matches.is_empty(), "a reset list should never match again without a fresh update");

    let state = patrol_store::scratch::get_list_retry(scratch.as_ref(), "goog-malware-shavar")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.wait, 10);
}

/// The scratch store is the only state that actually crosses a process
/// boundary (§4.8) — a `patrold` write must be visible to a later
/// `patrol-ctl status` reading the same file.
#[tokio::test]
async fn scratch_state_survives_across_separate_store_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scratch.json");

    {
        let writer = FileScratchStore::new(path.clone()).unwrap();
        let state = patrol_store::ListRetryState { time: 1_000, wait: 1_200, errors: 0 };
        patrol_store::scratch::set_list_retry(&writer, "goog-malware-shavar", state).await.unwrap();
    }

    let reader = FileScratchStore::new(path).unwrap();
    let state = patrol_store::scratch::get_list_retry(&reader, "goog-malware-shavar").await.unwrap().unwrap();
    assert_eq!(state.time, 1_000);
    assert_eq!(state.wait, 1_200);
    assert_eq!(state.errors, 0);
}

/// Property 2 — applying the same delete-ranges and sub-chunks in different
/// orders against independent stores yields the same set of active
/// (list, prefix) pairs.
#[tokio::test]
async fn subtraction_order_is_commutative() {
    let adds = vec![
        AddChunk { list: "l".to_string(), chunk_number: 1, prefix: "aaaaaaaa".to_string() },
        AddChunk { list: "l".to_string(), chunk_number: 2, prefix: "bbbbbbbb".to_string() },
        AddChunk { list: "l".to_string(), chunk_number: 3, prefix: "cccccccc".to_string() },
    ];
    let subs = vec![
        SubChunk { list: "l".to_string(), chunk_number: 10, add_number: 1, prefix: "aaaaaaaa".to_string() },
        SubChunk { list: "l".to_string(), chunk_number: 11, add_number: 3, prefix: "cccccccc".to_string() },
    ];

    let forward = MemoryChunkStore::new();
    forward.add_bulk_add(adds.clone()).await.unwrap();
    forward.delete_add("l", &[2]).await.unwrap(); // no-op: removes nothing matching
    forward.add_bulk_sub(subs.clone()).await.unwrap();

    let reversed = MemoryChunkStore::new();
    let mut reversed_subs = subs.clone();
    reversed_subs.reverse();
    reversed.add_bulk_sub(reversed_subs).await.unwrap();
    let mut reversed_adds = adds.clone();
    reversed_adds.reverse();
    reversed.add_bulk_add(reversed_adds).await.unwrap();
    reversed.delete_add("l", &[2]).await.unwrap();

    for prefix in ["aaaaaaaa", "bbbbbbbb", "cccccccc"] {
        let active_forward = active_prefix(&forward, prefix).await;
        let active_reversed = active_prefix(&reversed, prefix).await;
        assert_eq!(active_forward, active_reversed, "order of application changed the result for {prefix}");
    }
    // only "bbbbbbbb" (chunk 2) was never subtracted and never deleted.
    assert!(active_prefix(&forward, "bbbbbbbb").await);
    assert!(!active_prefix(&forward, "aaaaaaaa").await);
    assert!(!active_prefix(&forward, "cccccccc").await);
}

async fn active_prefix(store: &MemoryChunkStore, prefix_hex: &str) -> bool {
    let lists = vec!["l".to_string()];
    let adds = store.get_add(prefix_hex, &lists).await.unwrap();
    let subs = store.get_sub(prefix_hex, &lists).await.unwrap();
    adds.iter().any(|a| !subs.iter().any(|s| s.add_number == a.chunk_number && s.prefix == a.prefix))
}

/// Property 6 — an expired full-hash cache entry is never returned by the
/// resolver, which must fall back to a fresh remote fetch instead.
#[tokio::test]
async fn resolver_refetches_past_an_expired_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryChunkStore::new());
    let transport = Arc::new(CannedTransport::new());
    let scratch = Arc::new(FileScratchStore::new(dir.path().join("scratch.json")).unwrap());

    let prefix: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];
    let full_hash = [9u8; 32];
    store
        .add_full_hashes(vec![patrol_store::FullHashRecord {
            list: "goog-malware-shavar".to_string(),
            prefix: hex::encode(prefix),
            hash: full_hash,
            valid_until_unix: 1, // already expired by any real wall clock
        }])
        .await
        .unwrap();

    let mut body = b"3600\n".to_vec();
    body.extend_from_slice(b"goog-malware-shavar:32:1\n");
    body.extend_from_slice(&full_hash);
    transport.push_gethash(200, body);

    let resolver = patrol_client::Resolver::new(store, transport, scratch, test_config());
    let resolved = resolver.resolve("goog-malware-shavar", &[prefix]).await.unwrap();
    assert_eq!(resolved, vec![full_hash], "an expired cache entry must trigger a fresh remote fetch");
}
