//! Turns client requests into engine directives.
//!
//! An eval is staged as a file and loaded by path, so code of any size or
//! shape goes to the engine as one short line. Stop sends the interrupt
//! directive. Both are refused unless the engine is booted.

mod id;

pub use id::EvalId;

use crate::engine::directives::{interrupt_directive, load_directive};
use crate::engine::EngineHandle;
use crate::error::BridgeError;
use crate::hub::ClientId;
use crate::staging::{ReaperHandle, StagingStore};
use crate::telemetry::{content_logging_enabled, content_preview};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct EvalDispatcher {
    engine: EngineHandle,
    store: Arc<StagingStore>,
    reaper: ReaperHandle,
    artifact_ttl: Duration,
}

impl EvalDispatcher {
    pub fn new(
        engine: EngineHandle,
        store: Arc<StagingStore>,
        reaper: ReaperHandle,
        artifact_ttl: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            reaper,
            artifact_ttl,
        }
    }

    /// Stage `code` and tell the engine to load it.
    ///
    /// Exactly one artifact and one directive per accepted request. If the
    /// engine stops being booted after staging, the artifact is removed at
    /// once and the request is rejected.
    pub fn eval(&self, code: &str, source: ClientId) -> Result<EvalId, BridgeError> {
        let generation = match self.engine.booted_generation() {
            Ok(generation) => generation,
            Err(err) => {
                tracing::info!(client = source, error = %err, "eval rejected");
                return Err(err);
            }
        };

        let id = EvalId::next();
        let artifact = self.store.write(&id, code).map_err(|err| {
            tracing::error!(eval = %id, client = source, error = %err, "staging write failed");
            err
        })?;
        tracing::info!(eval = %id, client = source, bytes = code.len(), "dispatching eval");
        if content_logging_enabled() {
            tracing::debug!(eval = %id, code = %content_preview(code), "eval content");
        }

        if let Err(err) = self
            .engine
            .send_if_booted(generation, &load_directive(artifact.path()))
        {
            artifact.remove();
            tracing::warn!(eval = %id, client = source, error = %err, "eval directive not sent");
            return Err(err);
        }
        self.reaper.schedule(artifact, self.artifact_ttl);
        Ok(id)
    }

    /// Send the interrupt directive. Returns whether it was sent; a stop
    /// while the engine is not booted is silently ignored.
    pub fn stop(&self, source: ClientId) -> bool {
        let generation = match self.engine.booted_generation() {
            Ok(generation) => generation,
            Err(_) => {
                tracing::debug!(client = source, "stop ignored; engine not booted");
                return false;
            }
        };
        match self.engine.send_if_booted(generation, interrupt_directive()) {
            Ok(()) => {
                tracing::info!(client = source, "stop sent");
                true
            }
            Err(err) => {
                tracing::debug!(client = source, error = %err, "stop not sent");
                false
            }
        }
    }
}
