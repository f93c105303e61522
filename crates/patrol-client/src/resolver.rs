//! Full-hash cache and resolver (C6, §4.6): local cache lookup first, then a
//! batched `gethash` round-trip for prefixes that missed, honoring the
//! per-prefix suppression windows so a chronically-failing prefix doesn't
//! get retried every single lookup.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use patrol_core::wire;
use patrol_core::PatrolConfig;
use patrol_store::{ChunkStore, FullHashRecord, PrefixErrorState, ScratchStore};
use tracing::warn;

use crate::error::EngineError;
use crate::transport::Transport;

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Resolves prefix candidates to confirmed full hashes, consulting the
/// local cache before the network.
pub struct Resolver<S: ChunkStore, T: Transport, Sc: ScratchStore> {
    store: Arc<S>,
    transport: Arc<T>,
    scratch: Arc<Sc>,
    config: Arc<PatrolConfig>,
}

impl<S: ChunkStore, T: Transport, Sc: ScratchStore> Clone for Resolver<S, T, Sc> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            transport: self.transport.clone(),
            scratch: self.scratch.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, T, Sc> Resolver<S, T, Sc>
where
    S: ChunkStore,
    T: Transport,
    Sc: ScratchStore,
{
    pub fn new(store: Arc<S>, transport: Arc<T>, scratch: Arc<Sc>, config: Arc<PatrolConfig>) -> Self {
        Self { store, transport, scratch, config }
    }

    /// Resolve `prefixes` (raw 4-byte values) against `list`, returning the
    /// confirmed full hashes. Prefixes currently suppressed by per-prefix
    /// backoff are silently skipped rather than retried (§4.6).
    pub async fn resolve(&self, list: &str, prefixes: &[[u8; 4]]) -> Result<Vec<[u8; 32]>, EngineError> {
        let now = now_unix();
        let mut confirmed = Vec::new();
        let mut misses = Vec::new();

        for prefix in prefixes {
            let prefix_hex = hex::encode(prefix);
            let cached = self.store.get_full_hashes(&prefix_hex, list, now).await?;
            if !cached.is_empty() {
                confirmed.extend(cached.iter().map(|r| r.hash));
                continue;
            }

            let error_state = patrol_store::scratch::get_prefix_error(self.scratch.as_ref(), &prefix_hex).await?;
            let suppressed = error_state.map(|s| patrol_store::is_prefix_suppressed(&s, now)).unwrap_or(false);
            if suppressed {
                continue;
            }

            misses.push(*prefix);
        }

        if misses.is_empty() {
            return Ok(confirmed);
        }

        match self.fetch_remote(list, &misses, now).await {
            Ok(entries) => {
                for prefix in &misses {
                    let prefix_hex = hex::encode(prefix);
                    self.clear_prefix_error(&prefix_hex).await;
                }
                confirmed.extend(entries.into_iter().filter(|(l, _)| l == list).map(|(_, hash)| hash));
            }
            Err(e) => {
                warn!(list, error = %e, "gethash round-trip failed, recording per-prefix errors");
                for prefix in &misses {
                    let prefix_hex = hex::encode(prefix);
                    self.record_prefix_error(&prefix_hex, now).await;
                }
            }
        }

        Ok(confirmed)
    }

    async fn fetch_remote(&self, list: &str, misses: &[[u8; 4]], now: u64) -> Result<Vec<(String, [u8; 32])>, EngineError> {
        let mut concatenated = Vec::with_capacity(misses.len() * 4);
        for prefix in misses {
            concatenated.extend_from_slice(prefix);
        }
        let body = wire::encode_gethash_request(4, &concatenated);

        let response = self.transport.post_gethash(body).await?;
        if !response.is_success() {
            return Err(EngineError::Transport(crate::error::TransportError::Status(response.status)));
        }

        let parsed = wire::parse_full_hash_response(&response.body)?;
        let ttl_secs = self.config.cache_time_secs.unwrap_or(parsed.cache_lifetime_secs).max(parsed.cache_lifetime_secs);
        let valid_until = now + ttl_secs;

        let mut records = Vec::with_capacity(parsed.entries.len());
        let mut out = Vec::with_capacity(parsed.entries.len());
        for entry in &parsed.entries {
            let prefix_hex = hex::encode(&entry.hash[..4]);
            records.push(FullHashRecord {
                list: entry.list.clone(),
                prefix: prefix_hex,
                hash: entry.hash,
                valid_until_unix: valid_until,
            });
            out.push((entry.list.clone(), entry.hash));
        }
        if !records.is_empty() {
            self.store.add_full_hashes(records).await?;
        }
        let _ = list;
        Ok(out)
    }

    async fn record_prefix_error(&self, prefix_hex: &str, now: u64) {
        let prior_errors = patrol_store::scratch::get_prefix_error(self.scratch.as_ref(), prefix_hex)
            .await
            .ok()
            .flatten()
            .map(|s| s.errors)
            .unwrap_or(0);
        let state = PrefixErrorState {
            timestamp: now,
            errors: prior_errors + 1,
        };
        if let Err(e) = patrol_store::scratch::set_prefix_error(self.scratch.as_ref(), prefix_hex, state).await {
            warn!(prefix_hex, error = %e, "failed to persist per-prefix error state");
        }
    }

    async fn clear_prefix_error(&self, prefix_hex: &str) {
        let existing = patrol_store::scratch::get_prefix_error(self.scratch.as_ref(), prefix_hex).await.ok().flatten();
        if existing.is_some() {
            let state = PrefixErrorState { timestamp: now_unix(), errors: 0 };
            let _ = patrol_store::scratch::set_prefix_error(self.scratch.as_ref(), prefix_hex, state).await;
        }
    }
}
