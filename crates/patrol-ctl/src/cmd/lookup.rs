//! `patrol-ctl lookup URL [--lists LIST...]`

use std::sync::Arc;

use anyhow::Result;
use patrol_core::PatrolConfig;

use super::build_client;

pub async fn cmd_lookup(config: Arc<PatrolConfig>, url: &str, lists: Vec<String>) -> Result<()> {
    let client = build_client(&config)?;

    // Fetch current chunks before checking — a one-shot CLI invocation has
    // no long-lived store to consult otherwise.
    client.update(&lists, true).await;

    let matches = client.lookup(url, &lists).await?;
    println!("{}", serde_json::to_string(&matches)?);

    Ok(())
}
