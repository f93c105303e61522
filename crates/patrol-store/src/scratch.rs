//! The scratch state store (C8): a small async key-value contract used to
//! persist per-list and per-prefix retry timers across restarts.
//!
//! The reference implementation mirrors the whole map in memory, and
//! serializes it to a single JSON file on every mutation (mutations are
//! infrequent — at most once per list-poll or per-prefix-error). Writes go
//! through a temp-file-then-rename so a crash mid-write never corrupts
//! previously-committed state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::StoreError;

const LIST_RETRY_PREFIX: &str = "updated/";
const PREFIX_ERROR_PREFIX: &str = "full_hash_errors/";

pub fn list_retry_key(list: &str) -> String {
    format!("{LIST_RETRY_PREFIX}{list}")
}

pub fn prefix_error_key(hex_prefix: &str) -> String {
    format!("{PREFIX_ERROR_PREFIX}{hex_prefix}")
}

/// Per-list retry state: `{ time, wait, errors }` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRetryState {
    /// Last successful-poll wall time, Unix seconds.
    pub time: u64,
    /// Server-recommended (or default) wait, in seconds.
    pub wait: u64,
    /// Consecutive failure count.
    pub errors: u32,
}

/// Per-prefix full-hash retry state: `{ timestamp, errors }` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixErrorState {
    pub timestamp: u64,
    pub errors: u32,
}

/// Async key-value contract for retry-timer persistence.
pub trait ScratchStore: Send + Sync {
    fn get(&self, key: &str) -> impl std::future::Future<Output = Result<Option<Value>, StoreError>> + Send;
    fn set(&self, key: &str, value: Value) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// JSON-file-backed reference implementation.
pub struct FileScratchStore {
    path: PathBuf,
    data: DashMap<String, Value>,
}

impl FileScratchStore {
    /// Load `path` if it exists (an empty or absent file is a fresh store).
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = DashMap::new();
        if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            if !text.trim().is_empty() {
                let loaded: BTreeMap<String, Value> = serde_json::from_str(&text)?;
                for (k, v) in loaded {
                    data.insert(k, v);
                }
            }
        }
        Ok(Self { path, data })
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let snapshot: BTreeMap<String, Value> = self.data.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        let json = serde_json::to_string_pretty(&snapshot)?;

        let tmp_path = tmp_path_for(&self.path);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", std::process::id()));
    PathBuf::from(tmp)
}

impl ScratchStore for FileScratchStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.data.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.data.insert(key.to_string(), value);
        self.persist()
    }
}

/// Typed convenience wrapper: read the list retry record, if any.
pub async fn get_list_retry<S: ScratchStore>(store: &S, list: &str) -> Result<Option<ListRetryState>, StoreError> {
    let Some(value) = store.get(&list_retry_key(list)).await? else {
        return Ok(None);
    };
    Ok(serde_json::from_value(value).ok())
}

/// Typed convenience wrapper: commit the list retry record.
pub async fn set_list_retry<S: ScratchStore>(store: &S, list: &str, state: ListRetryState) -> Result<(), StoreError> {
    store.set(&list_retry_key(list), serde_json::to_value(state)?).await
}

/// Typed convenience wrapper: read the per-prefix error record, if any.
pub async fn get_prefix_error<S: ScratchStore>(store: &S, hex_prefix: &str) -> Result<Option<PrefixErrorState>, StoreError> {
    let Some(value) = store.get(&prefix_error_key(hex_prefix)).await? else {
        return Ok(None);
    };
    Ok(serde_json::from_value(value).ok())
}

/// Typed convenience wrapper: commit the per-prefix error record.
pub async fn set_prefix_error<S: ScratchStore>(store: &S, hex_prefix: &str, state: PrefixErrorState) -> Result<(), StoreError> {
    store.set(&prefix_error_key(hex_prefix), serde_json::to_value(state)?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_list_retry_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch.json");

        let store = FileScratchStore::new(&path).unwrap();
        set_list_retry(
            &store,
            "goog-malware-shavar",
            ListRetryState {
                time: 1000,
                wait: 1200,
                errors: 0,
            },
        )
        .await
        .unwrap();

        assert!(path.exists());

        let reloaded = FileScratchStore::new(&path).unwrap();
        let state = get_list_retry(&reloaded, "goog-malware-shavar").await.unwrap().unwrap();
        assert_eq!(state.wait, 1200);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileScratchStore::new(dir.path().join("scratch.json")).unwrap();
        assert!(get_list_retry(&store, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prefix_error_state_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileScratchStore::new(dir.path().join("scratch.json")).unwrap();
        set_prefix_error(&store, "deadbeef", PrefixErrorState { timestamp: 5, errors: 2 })
            .await
            .unwrap();
        let state = get_prefix_error(&store, "deadbeef").await.unwrap().unwrap();
        assert_eq!(state.errors, 2);
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileScratchStore::new(dir.path().join("does-not-exist.json")).unwrap();
        assert!(store.get("anything").await.unwrap().is_none());
    }
}
