//! `patrol-ctl status [LIST...]` — reports the persisted retry state, the
//! one piece of state that actually survives across invocations (§4.8).

use std::sync::Arc;

use anyhow::{Context, Result};
use patrol_core::PatrolConfig;
use patrol_store::FileScratchStore;

pub async fn cmd_status(config: Arc<PatrolConfig>, lists: Vec<String>) -> Result<()> {
    let scratch = FileScratchStore::new(config.data_file_path.clone()).context("failed to open scratch store")?;

    println!("server: {}", config.server);
    println!("scratch file: {}", config.data_file_path.display());
    println!();

    for list in &lists {
        match patrol_store::scratch::get_list_retry(&scratch, list).await? {
            Some(state) => {
                println!("{list}: last poll at {}, wait {}s, {} consecutive errors", state.time, state.wait, state.errors);
            }
            None => {
                println!("{list}: never polled");
            }
        }
    }

    Ok(())
}
