//! patrold — List Service update daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use patrol_client::{Client, HttpTransport};
use patrol_core::PatrolConfig;
use patrol_store::{ChunkStore, FileScratchStore, MemoryChunkStore};

/// How often each list's update loop wakes up to ask the engine whether a
/// poll is due. The engine's own per-list backoff state is what actually
/// gates the request; this tick just needs to be shorter than the shortest
/// configured wait.
const POLL_TICK: Duration = Duration::from_secs(15);
const STATUS_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

fn lists_from_args_or_env() -> Vec<String> {
    if let Some(arg) = std::env::args().nth(1) {
        return arg.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    }
    if let Ok(env_lists) = std::env::var("PATROL_LISTS") {
        return env_lists.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    }
    vec!["goog-malware-shavar".to_string(), "goog-phish-shavar".to_string()]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Arc::new(PatrolConfig::load().context("failed to load configuration")?);
    let lists = lists_from_args_or_env();
    tracing::info!(lists = ?lists, server = %config.server, "patrold starting");

    let store = Arc::new(MemoryChunkStore::new());
    let transport = Arc::new(HttpTransport::new(&config, "patrold", env!("CARGO_PKG_VERSION")).context("failed to build HTTP transport")?);
    let scratch = Arc::new(FileScratchStore::new(config.data_file_path.clone()).context("failed to open scratch store")?);
    let client = Client::new(store.clone(), transport, scratch.clone(), config.clone());

    let mut tasks = tokio::task::JoinSet::new();
    for list in &lists {
        let client = client.clone();
        let list = list.clone();
        tasks.spawn(async move {
            let mut interval = tokio::time::interval(POLL_TICK);
            loop {
                interval.tick().await;
                let results = client.update(&[list.clone()], false).await;
                for (list, outcome) in results {
                    tracing::debug!(list, outcome = ?outcome, "update tick");
                }
            }
        });
    }

    // Print a per-list snapshot periodically, the way a long-running poller
    // proves to an operator that it's actually making progress.
    tasks.spawn(async move {
        let mut interval = tokio::time::interval(STATUS_SNAPSHOT_INTERVAL);
        loop {
            interval.tick().await;
            tracing::info!(lists = lists.len(), "status snapshot");
            for list in &lists {
                let (a_range, s_range) = store.ranges(list).await.unwrap_or_default();
                let retry = patrol_store::scratch::get_list_retry(scratch.as_ref(), list).await.ok().flatten();
                let (wait, errors) = retry.map(|r| (r.wait, r.errors)).unwrap_or((0, 0));
                tracing::info!(
                    list,
                    wait_secs = wait,
                    errors,
                    add_range = %a_range,
                    sub_range = %s_range,
                    "  list"
                );
            }
        }
    });

    if let Some(joined) = tasks.join_next().await {
        tracing::error!(result = ?joined, "a daemon task exited unexpectedly");
    }

    Ok(())
}
