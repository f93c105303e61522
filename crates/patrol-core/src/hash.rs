//! SHA-256 hashing of canonical URL forms (C2).
//!
//! Every canonical form produced by [`crate::canonical`] is hashed
//! independently; the first four bytes of each digest are the prefix used
//! for local candidate matching.

use sha2::{Digest, Sha256};

/// Number of bytes in a local-matching prefix.
pub const PREFIX_LEN: usize = 4;
/// Number of bytes in a full SHA-256 digest.
pub const FULL_HASH_LEN: usize = 32;

/// A full 32-byte SHA-256 digest of one canonical URL form.
pub type FullHash = [u8; FULL_HASH_LEN];
/// The first four bytes of a [`FullHash`], used for local candidate matching.
pub type Prefix = [u8; PREFIX_LEN];

/// Hash a single canonical form.
pub fn hash(canonical: &str) -> FullHash {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = [0u8; FULL_HASH_LEN];
    out.copy_from_slice(&digest);
    out
}

/// Hash every canonical form of `canonical_urls`, in the same order.
pub fn full_hashes<'a, I: IntoIterator<Item = &'a str>>(canonical_urls: I) -> Vec<FullHash> {
    canonical_urls.into_iter().map(hash).collect()
}

/// The first four bytes of a full hash — the local-matching prefix.
pub fn prefix(h: &FullHash) -> Prefix {
    let mut p = [0u8; PREFIX_LEN];
    p.copy_from_slice(&h[..PREFIX_LEN]);
    p
}

/// Lowercase hex encoding, used for store keys and log fields.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
