//! Error types for the update engine, resolver, and lookup pipeline.

use thiserror::Error;

/// Errors from the HTTP transport (C9).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("non-2xx status {0}")]
    Status(u16),
}

/// Errors from the update engine (C4) and resolver (C6).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("list {0:?} already has an update in flight")]
    InFlight(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wire(#[from] patrol_core::WireError),

    #[error(transparent)]
    Store(#[from] patrol_store::StoreError),
}
