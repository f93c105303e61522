//! Top-level client: one struct wiring the chunk store, scratch store,
//! update engine, resolver, and lookup pipeline behind a single API.
//!
//! Everything is constructed once and shared via `Arc` (§9 "No globals") —
//! there is no process-wide singleton, so a daemon and a CLI invocation in
//! the same binary never fight over hidden shared state.

use std::sync::Arc;

use patrol_core::PatrolConfig;
use patrol_store::{ChunkStore, ScratchStore};

use crate::engine::{Engine, UpdateOutcome};
use crate::pipeline::Pipeline;
use crate::transport::Transport;

pub struct Client<S: ChunkStore, T: Transport, Sc: ScratchStore> {
    engine: Engine<S, T, Sc>,
    pipeline: Pipeline<S, T, Sc>,
}

impl<S: ChunkStore, T: Transport, Sc: ScratchStore> Clone for Client<S, T, Sc> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<S, T, Sc> Client<S, T, Sc>
where
    S: ChunkStore + 'static,
    T: Transport + 'static,
    Sc: ScratchStore + 'static,
{
    pub fn new(store: Arc<S>, transport: Arc<T>, scratch: Arc<Sc>, config: Arc<PatrolConfig>) -> Self {
        let engine = Engine::new(store.clone(), transport.clone(), scratch.clone(), config.clone());
        let pipeline = Pipeline::new(store, transport, scratch, config);
        Self { engine, pipeline }
    }

    /// Poll and apply updates for `lists`. `force` bypasses the per-list
    /// `poll_due` check (used by `patrol-ctl update`).
    pub async fn update(&self, lists: &[String], force: bool) -> Vec<(String, UpdateOutcome)> {
        self.engine.update(lists, force).await
    }

    /// Check `url` against `lists`, returning the lists it matched.
    pub async fn lookup(&self, url: &str, lists: &[String]) -> Result<Vec<String>, crate::error::EngineError> {
        self.pipeline.lookup(url, lists).await
    }

    pub fn engine(&self) -> &Engine<S, T, Sc> {
        &self.engine
    }
}
