//! Process supervisor for the sclang engine.
//!
//! One lifecycle driver thread owns the current child process. Each spawn
//! gets a fresh generation number; output pumps and stdin writes are tagged
//! with it, so nothing from a dead generation can move the state of the
//! current one.
//!
//! Lock order: engine status, then engine input or hub.

pub mod directives;
mod input;
mod markers;
mod process;
mod pump;
mod state;
mod supervisor;

pub use markers::MarkerScanner;
pub use state::{EngineState, EngineStatus, Marker};
pub use supervisor::{Supervisor, SupervisorHandle};

use crate::error::BridgeError;
use crate::hub::{BroadcastHub, ClientSubscription};
use crate::ipc::OutputMessage;
use crate::lock_or_recover;
use input::EngineInput;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;

struct EngineShared {
    status: Mutex<EngineStatus>,
    input: EngineInput,
    hub: Arc<BroadcastHub>,
}

/// Shared view of the supervised engine. Cheap to clone.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<EngineShared>,
}

impl EngineHandle {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                status: Mutex::new(EngineStatus::initial()),
                input: EngineInput::new(),
                hub,
            }),
        }
    }

    pub fn status(&self) -> EngineStatus {
        *lock_or_recover(&self.shared.status, "engine status")
    }

    pub fn state(&self) -> EngineState {
        self.status().state
    }

    #[cfg(test)]
    pub(crate) fn is_booted(&self) -> bool {
        self.state() == EngineState::Booted
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.shared.hub
    }

    /// Register a client. Its first message is the status at this instant;
    /// the snapshot and registration happen under the status lock so no
    /// transition can slip in between.
    pub fn connect_client(&self) -> ClientSubscription {
        let status = lock_or_recover(&self.shared.status, "engine status");
        let greeting = OutputMessage::status(status.state.is_connected());
        self.shared.hub.subscribe(greeting)
    }

    /// Generation of the booted engine, or a rejection naming the current state.
    pub fn booted_generation(&self) -> Result<u64, BridgeError> {
        let status = self.status();
        if status.state == EngineState::Booted {
            Ok(status.generation)
        } else {
            Err(BridgeError::EvalRejected {
                state: status.state.label(),
            })
        }
    }

    /// Write a directive line, provided the engine is still the booted
    /// `generation`.
    pub fn send_if_booted(&self, generation: u64, line: &str) -> Result<(), BridgeError> {
        {
            let status = lock_or_recover(&self.shared.status, "engine status");
            if status.state != EngineState::Booted || status.generation != generation {
                return Err(BridgeError::EvalRejected {
                    state: status.state.label(),
                });
            }
        }
        self.shared.input.write_line(generation, line)
    }

    pub(crate) fn begin_generation(&self) -> u64 {
        let mut status = lock_or_recover(&self.shared.status, "engine status");
        status.generation += 1;
        status.state = EngineState::Spawning;
        status.spawned_at = Some(Instant::now());
        status.generation
    }

    pub(crate) fn attach_input(&self, generation: u64, writer: Box<dyn Write + Send>) {
        self.shared.input.attach(generation, writer);
    }

    /// Bootstrap and other lifecycle writes that do not require Booted.
    pub(crate) fn write_input(&self, generation: u64, line: &str) -> Result<(), BridgeError> {
        self.shared.input.write_line(generation, line)
    }

    /// Apply a marker seen in `generation`'s output. Returns the new state
    /// when it caused a transition.
    pub(crate) fn apply_marker(&self, generation: u64, marker: Marker) -> Option<EngineState> {
        let mut status = lock_or_recover(&self.shared.status, "engine status");
        if status.generation != generation {
            tracing::debug!(
                generation,
                current = status.generation,
                ?marker,
                "ignoring marker from stale engine"
            );
            return None;
        }
        let next = status.state.on_marker(marker)?;
        status.state = next;
        match next {
            EngineState::Compiling => {
                tracing::info!(generation, "class library compiled; loading startup script");
            }
            EngineState::Booted => {
                status.boots += 1;
                let boot_ms = status
                    .spawned_at
                    .map(|at| at.elapsed().as_millis() as u64)
                    .unwrap_or(0);
                tracing::info!(generation, boot_ms, boots = status.boots, "engine booted");
                self.shared.hub.broadcast(OutputMessage::status(true));
            }
            EngineState::Spawning | EngineState::Crashed => {}
        }
        Some(next)
    }

    /// Move `generation` to Crashed, close its stdin and tell every client.
    pub(crate) fn mark_crashed(&self, generation: u64) -> bool {
        let mut status = lock_or_recover(&self.shared.status, "engine status");
        if status.generation != generation || status.state == EngineState::Crashed {
            return false;
        }
        status.state = EngineState::Crashed;
        self.shared.input.detach(generation);
        self.shared.hub.broadcast(OutputMessage::status(false));
        true
    }

    #[cfg(test)]
    pub(crate) fn force_booted(&self, writer: Box<dyn Write + Send>) -> u64 {
        let generation = self.begin_generation();
        self.attach_input(generation, writer);
        self.apply_marker(generation, Marker::Compiled);
        self.apply_marker(generation, Marker::ServerBooted);
        generation
    }
}
