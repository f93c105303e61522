//! `patrol-ctl update [LIST...]`

use std::sync::Arc;

use anyhow::Result;
use patrol_client::UpdateOutcome;
use patrol_core::PatrolConfig;

use super::build_client;

pub async fn cmd_update(config: Arc<PatrolConfig>, lists: Vec<String>) -> Result<()> {
    let client = build_client(&config)?;
    let results = client.update(&lists, true).await;

    for (list, outcome) in results {
        match outcome {
            UpdateOutcome::Updated { wait_secs, errors } => {
                println!("{list}: updated, next poll in {wait_secs}s (errors: {errors})");
            }
            UpdateOutcome::Reset => {
                println!("{list}: server requested a full reset, list wiped");
            }
            UpdateOutcome::NotDue => {
                println!("{list}: not due yet");
            }
            UpdateOutcome::Rejected { retry_after_secs } => {
                println!("{list}: an update was already in flight, retry in {retry_after_secs}s");
            }
            UpdateOutcome::Failed { wait_secs, errors, reason } => {
                println!("{list}: update failed ({reason}), backing off {wait_secs}s (errors: {errors})");
            }
        }
    }

    Ok(())
}
