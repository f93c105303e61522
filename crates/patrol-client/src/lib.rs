//! The update engine, full-hash resolver, lookup pipeline, and HTTP
//! transport that turn the wire-level building blocks in `patrol-core` and
//! the storage contracts in `patrol-store` into a usable client (C4, C6,
//! C7, C9).

pub mod client;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod transport;

pub use client::Client;
pub use engine::{Engine, UpdateOutcome};
pub use error::{EngineError, TransportError};
pub use pipeline::Pipeline;
pub use resolver::Resolver;
pub use transport::{CannedTransport, HttpTransport, Transport, TransportResponse};
