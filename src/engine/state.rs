use std::fmt;
use std::time::Instant;

/// Lifecycle of the current engine process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Process launched, class library still compiling.
    Spawning,
    /// Language is up; the startup script is booting the audio server.
    Compiling,
    /// Audio server ready; evaluations are accepted.
    Booted,
    /// Process exited (or never started); a respawn is pending.
    Crashed,
}

/// Output markers that drive lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Compiled,
    ServerBooted,
}

impl EngineState {
    pub fn label(self) -> &'static str {
        match self {
            EngineState::Spawning => "spawning",
            EngineState::Compiling => "compiling",
            EngineState::Booted => "booted",
            EngineState::Crashed => "crashed",
        }
    }

    /// Next state after seeing `marker`, or `None` when it does not apply.
    pub fn on_marker(self, marker: Marker) -> Option<EngineState> {
        match (self, marker) {
            (EngineState::Spawning, Marker::Compiled) => Some(EngineState::Compiling),
            (EngineState::Compiling, Marker::ServerBooted) => Some(EngineState::Booted),
            _ => None,
        }
    }

    pub fn is_connected(self) -> bool {
        self == EngineState::Booted
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Snapshot of the supervisor's view of the engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineStatus {
    pub state: EngineState,
    /// Incremented on every spawn attempt; 0 before the first one.
    pub generation: u64,
    pub spawned_at: Option<Instant>,
    /// Completed boot cycles since the bridge started.
    pub boots: u64,
}

impl EngineStatus {
    pub(crate) fn initial() -> Self {
        Self {
            state: EngineState::Spawning,
            generation: 0,
            spawned_at: None,
            boots: 0,
        }
    }
}
