//! Error types shared across the canonicalizer, hasher, and wire codec.
//!
//! Each module that can fail gets its own `thiserror` enum so callers can
//! match on failure kind instead of string-sniffing. Nothing here is fatal
//! on its own — callers decide whether a given error is recoverable.

use thiserror::Error;

/// Errors from [`crate::canonical::canonicalize`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalizeError {
    #[error("url has no host")]
    NoHost,

    #[error("unsupported scheme {0:?}, only http and https are accepted")]
    UnsupportedScheme(String),

    #[error("url could not be parsed: {0}")]
    Malformed(String),
}

/// Errors from the wire codec (`crate::wire`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("malformed header line: {0:?}")]
    MalformedHeaderLine(String),

    #[error("invalid range syntax: {0:?}")]
    BadRange(String),

    #[error("unknown chunk type byte: {0}")]
    UnknownChunkType(i32),

    #[error("unknown prefix type byte: {0}")]
    UnknownPrefixType(i32),

    #[error("hashes length {hashes_len} is not a multiple of prefix size {prefix_size}")]
    HashesNotAligned { hashes_len: usize, prefix_size: usize },

    #[error("sub chunk has {prefixes} prefixes but {add_numbers} addNumbers")]
    AddNumberMismatch { prefixes: usize, add_numbers: usize },

    #[error("truncated record: expected {expected} more bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("malformed full-hash response: {0}")]
    MalformedFullHash(String),

    #[error("unsupported protobuf wire type: {0}")]
    BadWireType(u8),
}

/// Errors raised at configuration construction time. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required option {0:?}")]
    MissingRequired(&'static str),

    #[error("failed to read {0}: {1}")]
    ReadFailed(std::path::PathBuf, std::io::Error),

    #[error("failed to parse {0}: {1}")]
    ParseFailed(std::path::PathBuf, toml::de::Error),

    #[error("bad url scheme for `server`: {0:?}")]
    BadServerUrl(String),
}
