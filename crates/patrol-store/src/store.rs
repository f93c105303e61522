//! The chunk store contract (C5, §4.5).
//!
//! A plain trait, not a trait object: exactly one implementation is chosen
//! at construction (the in-memory reference store here, or a remote
//! replicated store in a real deployment), so the engine is generic over
//! `S: ChunkStore` rather than paying for dynamic dispatch it doesn't need.

use patrol_core::RangeSet;

use crate::model::{AddChunk, FullHashRecord, SubChunk};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("scratch store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scratch store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Async contract for the local chunk database. All operations are async so
/// a remote/replicated implementation is a drop-in alternative to the
/// in-memory reference implementation.
pub trait ChunkStore: Send + Sync {
    /// Current compact add/sub range strings held for `list`.
    fn ranges(&self, list: &str) -> impl std::future::Future<Output = Result<(String, String), StoreError>> + Send;

    /// Remove all add-records with these chunk numbers, any prefix.
    fn delete_add(&self, list: &str, chunk_numbers: &[i32]) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Remove all sub-records with these chunk numbers, any prefix.
    fn delete_sub(&self, list: &str, chunk_numbers: &[i32]) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Prefix-indexed add-record lookup across `lists`.
    fn get_add(&self, prefix_hex: &str, lists: &[String]) -> impl std::future::Future<Output = Result<Vec<AddChunk>, StoreError>> + Send;

    /// Prefix-indexed sub-record lookup across `lists`.
    fn get_sub(&self, prefix_hex: &str, lists: &[String]) -> impl std::future::Future<Output = Result<Vec<SubChunk>, StoreError>> + Send;

    /// Idempotent bulk insert of add-records.
    fn add_bulk_add(&self, records: Vec<AddChunk>) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Idempotent bulk insert of sub-records.
    fn add_bulk_sub(&self, records: Vec<SubChunk>) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Full hashes for `prefix_hex` on `list` with `valid_until > now_unix`.
    /// Expired records encountered during the read must be purged (no
    /// background sweeper is specified).
    fn get_full_hashes(
        &self,
        prefix_hex: &str,
        list: &str,
        now_unix: u64,
    ) -> impl std::future::Future<Output = Result<Vec<FullHashRecord>, StoreError>> + Send;

    /// Idempotent bulk insert of full-hash records.
    fn add_full_hashes(&self, records: Vec<FullHashRecord>) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Drop all add-, sub-, and full-hash records for `list`.
    fn reset(&self, list: &str) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Derive the compact range string for a set of chunk numbers. A small
/// shared helper so every `ChunkStore` implementation renders ranges the
/// same way.
pub fn compact_ranges<I: IntoIterator<Item = i32>>(chunk_numbers: I) -> String {
    RangeSet::from_ids(chunk_numbers.into_iter().map(|n| n as u32)).to_compact_string()
}
