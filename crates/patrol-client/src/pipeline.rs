//! The URL lookup pipeline (C7, §4.7): canonicalize, hash, find local
//! add/sub candidates, resolve the survivors against the full-hash cache,
//! and report which lists actually matched.

use std::sync::Arc;

use patrol_core::{canonicalize, hash, PatrolConfig};
use patrol_store::ChunkStore;

use crate::error::EngineError;
use crate::resolver::Resolver;
use crate::transport::Transport;

/// Drives a single lookup end to end over a fixed `(store, resolver)` pair.
pub struct Pipeline<S: ChunkStore, T: Transport, Sc: patrol_store::ScratchStore> {
    store: Arc<S>,
    resolver: Resolver<S, T, Sc>,
}

impl<S: ChunkStore, T: Transport, Sc: patrol_store::ScratchStore> Clone for Pipeline<S, T, Sc> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<S, T, Sc> Pipeline<S, T, Sc>
where
    S: ChunkStore,
    T: Transport,
    Sc: patrol_store::ScratchStore,
{
    pub fn new(store: Arc<S>, transport: Arc<T>, scratch: Arc<Sc>, config: Arc<PatrolConfig>) -> Self {
        let resolver = Resolver::new(store.clone(), transport, scratch, config);
        Self { store, resolver }
    }

    /// Look up `url` against `lists`, returning the lists it matched
    /// (§4.7's ordered-by-input-order output).
    pub async fn lookup(&self, url: &str, lists: &[String]) -> Result<Vec<String>, EngineError> {
        let variants = canonicalize(url).map_err(|e| {
            EngineError::Wire(patrol_core::WireError::MalformedHeaderLine(format!("bad url {url:?}: {e}")))
        })?;

        let mut matched = Vec::new();

        for variant in &variants {
            let full_hash = hash::hash(variant);
            let prefix = hash::prefix(&full_hash);
            let prefix_hex = hex::encode(prefix);

            let adds = self.store.get_add(&prefix_hex, lists).await?;
            if adds.is_empty() {
                continue;
            }
            let subs = self.store.get_sub(&prefix_hex, lists).await?;

            // An add is cancelled only by a sub naming the same addNumber
            // and prefix, never merely the same chunk number (§4.5).
            let active_lists: Vec<String> = adds
                .iter()
                .filter(|a| !subs.iter().any(|s| s.add_number == a.chunk_number && s.prefix == a.prefix))
                .map(|a| a.list.clone())
                .collect();
            if active_lists.is_empty() {
                continue;
            }

            for list in lists {
                if matched.contains(list) || !active_lists.contains(list) {
                    continue;
                }
                let confirmed = self.resolver.resolve(list, &[prefix]).await?;
                if confirmed.iter().any(|h| *h == full_hash) {
                    matched.push(list.clone());
                }
            }
        }

        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patrol_core::PatrolConfig;
    use patrol_store::{AddChunk, FileScratchStore, FullHashRecord, MemoryChunkStore};

    use crate::transport::CannedTransport;

    fn test_config() -> Arc<PatrolConfig> {
        Arc::new(PatrolConfig {
            server: "https://example.com".to_string(),
            key: "testkey".to_string(),
            ..PatrolConfig::default()
        })
    }

    #[tokio::test]
    async fn s6_candidate_confirmed_by_cached_full_hash_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryChunkStore::new());
        let transport = Arc::new(CannedTransport::new());
        let scratch = Arc::new(FileScratchStore::new(dir.path().join("scratch.json")).unwrap());

        let url = "http://a.b.c/1/2/";
        let variants = canonicalize(url).unwrap();
        let sample = variants.iter().next().unwrap().clone();
        let full_hash = hash::hash(&sample);
        let prefix = hash::prefix(&full_hash);
        let prefix_hex = hex::encode(prefix);

        store
            .add_bulk_add(vec![AddChunk {
                list: "goog-malware-shavar".to_string(),
                chunk_number: 1,
                prefix: prefix_hex.clone(),
            }])
            .await
            .unwrap();
        store
            .add_full_hashes(vec![FullHashRecord {
                list: "goog-malware-shavar".to_string(),
                prefix: prefix_hex,
                hash: full_hash,
                valid_until_unix: u64::MAX,
            }])
            .await
            .unwrap();

        let pipeline = Pipeline::new(store, transport, scratch, test_config());
        let matches = pipeline.lookup(url, &["goog-malware-shavar".to_string()]).await.unwrap();
        assert_eq!(matches, vec!["goog-malware-shavar".to_string()]);
    }

    #[tokio::test]
    async fn clean_url_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryChunkStore::new());
        let transport = Arc::new(CannedTransport::new());
        let scratch = Arc::new(FileScratchStore::new(dir.path().join("scratch.json")).unwrap());
        let pipeline = Pipeline::new(store, transport, scratch, test_config());

        let matches = pipeline.lookup("http://totally-clean.example/", &["goog-malware-shavar".to_string()]).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn sub_cancels_add_before_resolver_is_ever_consulted() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryChunkStore::new());
        let transport = Arc::new(CannedTransport::new());
        let scratch = Arc::new(FileScratchStore::new(dir.path().join("scratch.json")).unwrap());

        let url = "http://a.b.c/1/2/";
        let variants = canonicalize(url).unwrap();
        let sample = variants.iter().next().unwrap().clone();
        let full_hash = hash::hash(&sample);
        let prefix = hash::prefix(&full_hash);
        let prefix_hex = hex::encode(prefix);

        store
            .add_bulk_add(vec![AddChunk {
                list: "goog-malware-shavar".to_string(),
                chunk_number: 1,
                prefix: prefix_hex.clone(),
            }])
            .await
            .unwrap();
        store
            .add_bulk_sub(vec![patrol_store::SubChunk {
                list: "goog-malware-shavar".to_string(),
                chunk_number: 9,
                add_number: 1,
                prefix: prefix_hex,
            }])
            .await
            .unwrap();

        // No full-hash cache entry and no canned gethash response: if the
        // resolver were consulted here it would fail on an empty queue.
        let pipeline = Pipeline::new(store, transport, scratch, test_config());
        let matches = pipeline.lookup(url, &["goog-malware-shavar".to_string()]).await.unwrap();
        assert!(matches.is_empty());
    }
}
