//! Record types held by the chunk store (§3).

use serde::{Deserialize, Serialize};

/// `(list, chunkNumber, prefix)`. `prefix` may be empty for an empty-chunk
/// announcement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddChunk {
    pub list: String,
    pub chunk_number: i32,
    /// Lowercase hex.
    pub prefix: String,
}

/// `(list, chunkNumber, addNumber, prefix)`. Cancels the add-record
/// `(list, addNumber, prefix)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubChunk {
    pub list: String,
    pub chunk_number: i32,
    pub add_number: i32,
    /// Lowercase hex.
    pub prefix: String,
}

/// `(list, prefix, hash, validUntil)`. `validUntil` is a Unix timestamp in
/// seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullHashRecord {
    pub list: String,
    /// Lowercase hex, first 4 bytes of `hash`.
    pub prefix: String,
    pub hash: [u8; 32],
    pub valid_until_unix: u64,
}

impl FullHashRecord {
    pub fn is_valid_at(&self, now_unix: u64) -> bool {
        self.valid_until_unix > now_unix
    }
}
