//! CLI command modules.

pub mod lookup;
pub mod status;
pub mod update;

use std::sync::Arc;

use anyhow::{Context, Result};
use patrol_client::{Client, HttpTransport};
use patrol_core::PatrolConfig;
use patrol_store::{FileScratchStore, MemoryChunkStore};

pub type PatrolClient = Client<MemoryChunkStore, HttpTransport, FileScratchStore>;

/// Build a fresh client from configuration. Each invocation starts from an
/// empty in-memory chunk store — there is no cross-process store, only the
/// scratch retry state persists to disk (§4.8).
pub fn build_client(config: &Arc<PatrolConfig>) -> Result<PatrolClient> {
    let store = Arc::new(MemoryChunkStore::new());
    let transport = Arc::new(HttpTransport::new(config, "patrol-ctl", env!("CARGO_PKG_VERSION")).context("failed to build HTTP transport")?);
    let scratch = Arc::new(FileScratchStore::new(config.data_file_path.clone()).context("failed to open scratch store")?);
    Ok(Client::new(store, transport, scratch, config.clone()))
}
