//! The update engine (C4): the per-list state machine described in §4.4.
//!
//! Generic over `S: ChunkStore` and `T: Transport` rather than using trait
//! objects — there is exactly one implementation of each chosen at
//! construction, so dynamic dispatch buys nothing here (§9 "Dynamic
//! dispatch").

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use patrol_core::wire::{self, ChunkType};
use patrol_core::{PatrolConfig, RangeSet};
use patrol_store::{AddChunk, ChunkStore, ListRetryState, ScratchStore, StoreError, SubChunk};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::transport::Transport;

const MAX_BODY_BYTES: usize = 4096;
const DELETE_BATCH_SIZE: usize = 500;
const INSERT_BATCH_SIZE: usize = 1000;
const RESET_NEXT_POLL_SECS: u64 = 10;

/// Outcome of a single list's `update` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The server had nothing new, or new chunks were applied successfully.
    Updated { wait_secs: u64, errors: u32 },
    /// `poll_due` was false and `force` wasn't set.
    NotDue,
    /// An update for this list was already in flight.
    Rejected { retry_after_secs: u64 },
    /// `r:pleasereset` was received; the list was wiped.
    Reset,
    /// Transport, parse, or store failure. `wait_secs` is the computed backoff.
    Failed { wait_secs: u64, errors: u32, reason: String },
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Drives C4 for a fixed `(store, transport, scratch)` triple. Cheaply
/// `Clone` (every field is an `Arc`) so a daemon loop can hold one per list
/// without sharing mutable state unsafely.
pub struct Engine<S: ChunkStore, T: Transport, Sc: ScratchStore> {
    store: Arc<S>,
    transport: Arc<T>,
    scratch: Arc<Sc>,
    config: Arc<PatrolConfig>,
    in_flight: Arc<DashMap<String, ()>>,
}

impl<S: ChunkStore, T: Transport, Sc: ScratchStore> Clone for Engine<S, T, Sc> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            transport: self.transport.clone(),
            scratch: self.scratch.clone(),
            config: self.config.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<S, T, Sc> Engine<S, T, Sc>
where
    S: ChunkStore + 'static,
    T: Transport + 'static,
    Sc: ScratchStore + 'static,
{
    pub fn new(store: Arc<S>, transport: Arc<T>, scratch: Arc<Sc>, config: Arc<PatrolConfig>) -> Self {
        Self {
            store,
            transport,
            scratch,
            config,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Drive `update` for every list in `lists` concurrently (§5: across
    /// lists, the fan-out cap is `len(lists)`). Each list's outcome is
    /// independent; one list's failure never affects another's.
    pub async fn update(&self, lists: &[String], force: bool) -> Vec<(String, UpdateOutcome)> {
        let mut set = tokio::task::JoinSet::new();
        for list in lists {
            let engine = self.clone();
            let list = list.clone();
            set.spawn(async move {
                let outcome = engine.update_one(&list, force).await;
                (list, outcome)
            });
        }
        let mut results = Vec::with_capacity(lists.len());
        while let Some(joined) = set.join_next().await {
            if let Ok(pair) = joined {
                results.push(pair);
            }
        }
        results
    }

    async fn update_one(&self, list: &str, force: bool) -> UpdateOutcome {
        // Non-blocking in-flight guard: a concurrent update observes the
        // marker and returns immediately, it never waits on it.
        if self.in_flight.insert(list.to_string(), ()).is_some() {
            return UpdateOutcome::Rejected {
                retry_after_secs: self.config.default_retry_secs,
            };
        }

        let outcome = self.update_one_guarded(list, force).await;
        self.in_flight.remove(list);
        outcome
    }

    async fn update_one_guarded(&self, list: &str, force: bool) -> UpdateOutcome {
        let prior = match patrol_store::scratch::get_list_retry(self.scratch.as_ref(), list).await {
            Ok(state) => state,
            Err(e) => {
                warn!(list, error = %e, "failed to read retry state, proceeding as if unset");
                None
            }
        };

        let now = now_unix();
        let poll_due = force
            || match &prior {
                Some(state) => state.time + state.wait < now,
                None => true,
            };
        if !poll_due {
            return UpdateOutcome::NotDue;
        }

        match self.run_update(list).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let errors = prior.map(|s| s.errors).unwrap_or(0) + 1;
                let wait_secs = patrol_store::list_backoff_wait_secs(errors);
                warn!(list, error = %e, errors, wait_secs, "update failed, backing off");
                let state = ListRetryState { time: now, wait: wait_secs, errors };
                if let Err(persist_err) = patrol_store::scratch::set_list_retry(self.scratch.as_ref(), list, state).await {
                    warn!(list, error = %persist_err, "failed to persist backoff state");
                }
                UpdateOutcome::Failed {
                    wait_secs,
                    errors,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn run_update(&self, list: &str) -> Result<UpdateOutcome, EngineError> {
        let (a_range, s_range) = self.store.ranges(list).await?;
        let body = build_bounded_request(list, &a_range, &s_range);

        info!(list, body_len = body.len(), "posting downloads request");
        let response = self.transport.post_downloads(body.into_bytes()).await?;
        if !response.is_success() {
            return Err(EngineError::Transport(crate::error::TransportError::Status(response.status)));
        }

        let body_str = std::str::from_utf8(&response.body).map_err(|_| {
            patrol_core::WireError::MalformedHeaderLine("non-UTF-8 downloads response".to_string())
        })?;
        let header = wire::parse_update_header(body_str)?;

        let Some(list_update) = header.lists.into_iter().find(|l| l.list == list) else {
            // Nothing new for this list. Commit the server's suggested wait
            // (or the default) and reset the error count.
            let wait_secs = header.wait_secs.unwrap_or(self.config.default_retry_secs);
            self.commit_success(list, wait_secs).await?;
            return Ok(UpdateOutcome::Updated { wait_secs, errors: 0 });
        };

        if list_update.please_reset {
            self.store.reset(list).await?;
            let state = ListRetryState {
                time: now_unix(),
                wait: RESET_NEXT_POLL_SECS,
                errors: 0,
            };
            patrol_store::scratch::set_list_retry(self.scratch.as_ref(), list, state).await?;
            return Ok(UpdateOutcome::Reset);
        }

        for batch in list_update.delete_add.iter().collect::<Vec<_>>().chunks(DELETE_BATCH_SIZE) {
            self.store.delete_add(list, &batch.iter().map(|&n| n as i32).collect::<Vec<_>>()).await?;
        }
        for batch in list_update.delete_sub.iter().collect::<Vec<_>>().chunks(DELETE_BATCH_SIZE) {
            self.store.delete_sub(list, &batch.iter().map(|&n| n as i32).collect::<Vec<_>>()).await?;
        }

        let mut adds = Vec::new();
        let mut subs = Vec::new();
        for redirect in &list_update.redirects {
            let payload = self.transport.get_redirect(redirect).await?;
            let chunks = wire::decode_chunk_stream(&payload)?;
            for chunk in chunks {
                extend_records(list, &chunk, &mut adds, &mut subs);
            }
        }

        apply_batches(&self.store, adds, subs).await?;

        // Commit retry state only after every redirect has been fetched,
        // parsed, and fully applied (§4.4 "Retry-state commitment order").
        let wait_secs = header.wait_secs.unwrap_or(self.config.default_retry_secs);
        self.commit_success(list, wait_secs).await?;
        Ok(UpdateOutcome::Updated { wait_secs, errors: 0 })
    }

    async fn commit_success(&self, list: &str, wait_secs: u64) -> Result<(), StoreError> {
        let state = ListRetryState {
            time: now_unix(),
            wait: wait_secs,
            errors: 0,
        };
        patrol_store::scratch::set_list_retry(self.scratch.as_ref(), list, state).await
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn scratch(&self) -> &Arc<Sc> {
        &self.scratch
    }

    pub fn config(&self) -> &Arc<PatrolConfig> {
        &self.config
    }
}

fn extend_records(list: &str, chunk: &wire::ChunkData, adds: &mut Vec<AddChunk>, subs: &mut Vec<SubChunk>) {
    let prefix_count = chunk.prefix_count();
    match chunk.chunk_type {
        ChunkType::Add => {
            if prefix_count == 0 {
                // Empty-chunk announcement: still record the chunk number so
                // future range reports stay contiguous.
                adds.push(AddChunk {
                    list: list.to_string(),
                    chunk_number: chunk.chunk_number,
                    prefix: String::new(),
                });
            } else {
                for prefix in chunk.prefixes() {
                    adds.push(AddChunk {
                        list: list.to_string(),
                        chunk_number: chunk.chunk_number,
                        prefix: hex::encode(prefix),
                    });
                }
            }
        }
        ChunkType::Sub => {
            if prefix_count == 0 {
                subs.push(SubChunk {
                    list: list.to_string(),
                    chunk_number: chunk.chunk_number,
                    add_number: 0,
                    prefix: String::new(),
                });
            } else {
                for (prefix, &add_number) in chunk.prefixes().zip(chunk.add_numbers.iter()) {
                    subs.push(SubChunk {
                        list: list.to_string(),
                        chunk_number: chunk.chunk_number,
                        add_number,
                        prefix: hex::encode(prefix),
                    });
                }
            }
        }
    }
}

/// Fan-in batch application (§9 "Callback-chain orchestration", resolved
/// with an `mpsc` channel): each batch insert runs as its own task, and the
/// driving task waits for every batch's acknowledgement before returning,
/// so independent batches make progress concurrently instead of being
/// awaited one at a time.
async fn apply_batches<S: ChunkStore + 'static>(store: &Arc<S>, adds: Vec<AddChunk>, subs: Vec<SubChunk>) -> Result<(), StoreError> {
    let add_batches: Vec<Vec<AddChunk>> = adds.chunks(INSERT_BATCH_SIZE).map(|c| c.to_vec()).collect();
    let sub_batches: Vec<Vec<SubChunk>> = subs.chunks(INSERT_BATCH_SIZE).map(|c| c.to_vec()).collect();
    let expected = add_batches.len() + sub_batches.len();
    if expected == 0 {
        return Ok(());
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel::<Result<(), StoreError>>(expected);

    for batch in add_batches {
        let store = store.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = store.add_bulk_add(batch).await;
            let _ = tx.send(result).await;
        });
    }
    for batch in sub_batches {
        let store = store.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = store.add_bulk_sub(batch).await;
            let _ = tx.send(result).await;
        });
    }
    drop(tx);

    let mut first_error = None;
    for _ in 0..expected {
        if let Some(Err(e)) = rx.recv().await {
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Build the request line, truncating ranges as needed to respect the
/// 4096-byte cap (§4.4, S7) while preserving each range's true upper bound.
fn build_bounded_request(list: &str, a_range: &str, s_range: &str) -> String {
    let line = wire::build_update_line(list, a_range, s_range);
    if line.len() <= MAX_BODY_BYTES {
        return line;
    }

    let a_set = RangeSet::parse(a_range).unwrap_or_default();
    let s_set = RangeSet::parse(s_range).unwrap_or_default();

    let fixed_overhead = list.len() + ";a::s:".len() + 1;
    let available_for_a = MAX_BODY_BYTES.saturating_sub(fixed_overhead + s_range.len());
    let truncated_a = a_set.truncate_to_fit(available_for_a);
    let attempt = wire::build_update_line(list, &truncated_a, s_range);
    if attempt.len() <= MAX_BODY_BYTES {
        return attempt;
    }

    let available_for_s = MAX_BODY_BYTES.saturating_sub(fixed_overhead + truncated_a.len());
    let truncated_s = s_set.truncate_to_fit(available_for_s);
    wire::build_update_line(list, &truncated_a, &truncated_s)
}
