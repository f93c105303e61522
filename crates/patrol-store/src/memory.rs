//! In-memory reference implementation of [`ChunkStore`] (§4.5 "Reference
//! implementation"). Keyed by list so lookups from the lookup pipeline
//! never block an in-flight update's inserts — each list's records live
//! behind their own `DashMap` entry.

use dashmap::DashMap;

use crate::model::{AddChunk, FullHashRecord, SubChunk};
use crate::store::{compact_ranges, ChunkStore, StoreError};

fn full_hash_key(list: &str, prefix_hex: &str) -> String {
    format!("{list}:{prefix_hex}")
}

/// Concurrent, process-local chunk database. The default store wired into
/// the CLI and daemon; `ChunkStore` is the seam a replicated store would
/// plug into instead.
#[derive(Default)]
pub struct MemoryChunkStore {
    adds: DashMap<String, Vec<AddChunk>>,
    subs: DashMap<String, Vec<SubChunk>>,
    full_hashes: DashMap<String, Vec<FullHashRecord>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkStore for MemoryChunkStore {
    async fn ranges(&self, list: &str) -> Result<(String, String), StoreError> {
        let a = self
            .adds
            .get(list)
            .map(|recs| compact_ranges(recs.iter().map(|r| r.chunk_number)))
            .unwrap_or_default();
        let s = self
            .subs
            .get(list)
            .map(|recs| compact_ranges(recs.iter().map(|r| r.chunk_number)))
            .unwrap_or_default();
        Ok((a, s))
    }

    async fn delete_add(&self, list: &str, chunk_numbers: &[i32]) -> Result<(), StoreError> {
        if let Some(mut recs) = self.adds.get_mut(list) {
            recs.retain(|r| !chunk_numbers.contains(&r.chunk_number));
        }
        Ok(())
    }

    async fn delete_sub(&self, list: &str, chunk_numbers: &[i32]) -> Result<(), StoreError> {
        if let Some(mut recs) = self.subs.get_mut(list) {
            recs.retain(|r| !chunk_numbers.contains(&r.chunk_number));
        }
        Ok(())
    }

    async fn get_add(&self, prefix_hex: &str, lists: &[String]) -> Result<Vec<AddChunk>, StoreError> {
        let mut out = Vec::new();
        for list in lists {
            if let Some(recs) = self.adds.get(list) {
                out.extend(recs.iter().filter(|r| r.prefix == prefix_hex).cloned());
            }
        }
        Ok(out)
    }

    async fn get_sub(&self, prefix_hex: &str, lists: &[String]) -> Result<Vec<SubChunk>, StoreError> {
        let mut out = Vec::new();
        for list in lists {
            if let Some(recs) = self.subs.get(list) {
                out.extend(recs.iter().filter(|r| r.prefix == prefix_hex).cloned());
            }
        }
        Ok(out)
    }

    async fn add_bulk_add(&self, records: Vec<AddChunk>) -> Result<(), StoreError> {
        for record in records {
            let mut list_recs = self.adds.entry(record.list.clone()).or_default();
            let already_present = list_recs
                .iter()
                .any(|r| r.chunk_number == record.chunk_number && r.prefix == record.prefix);
            if !already_present {
                list_recs.push(record);
            }
        }
        Ok(())
    }

    async fn add_bulk_sub(&self, records: Vec<SubChunk>) -> Result<(), StoreError> {
        for record in records {
            let mut list_recs = self.subs.entry(record.list.clone()).or_default();
            let already_present = list_recs.iter().any(|r| {
                r.chunk_number == record.chunk_number && r.add_number == record.add_number && r.prefix == record.prefix
            });
            if !already_present {
                list_recs.push(record);
            }
        }
        Ok(())
    }

    async fn get_full_hashes(&self, prefix_hex: &str, list: &str, now_unix: u64) -> Result<Vec<FullHashRecord>, StoreError> {
        let key = full_hash_key(list, prefix_hex);
        let Some(mut recs) = self.full_hashes.get_mut(&key) else {
            return Ok(Vec::new());
        };
        recs.retain(|r| r.is_valid_at(now_unix));
        Ok(recs.clone())
    }

    async fn add_full_hashes(&self, records: Vec<FullHashRecord>) -> Result<(), StoreError> {
        for record in records {
            let key = full_hash_key(&record.list, &record.prefix);
            let mut recs = self.full_hashes.entry(key).or_default();
            if !recs.iter().any(|r| r.hash == record.hash) {
                recs.push(record);
            }
        }
        Ok(())
    }

    async fn reset(&self, list: &str) -> Result<(), StoreError> {
        self.adds.remove(list);
        self.subs.remove(list);
        self.full_hashes.retain(|key, _| !key.starts_with(&format!("{list}:")));
        Ok(())
    }
}
