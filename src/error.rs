//! Error taxonomy for the bridge.
//!
//! None of these are fatal to the running bridge: each one is contained to
//! the request, client, or engine generation that produced it.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The engine binary could not be started.
    #[error("failed to spawn engine `{command}`: {source}")]
    SpawnFailure {
        command: String,
        #[source]
        source: io::Error,
    },

    /// An eval arrived while the engine was not booted.
    #[error("engine is not ready (state: {state})")]
    EvalRejected { state: &'static str },

    /// A client sent something we could not parse.
    #[error("malformed client message: {0}")]
    MalformedClientMessage(#[from] serde_json::Error),

    /// The staging artifact could not be written, so no directive was sent.
    #[error("failed to write staging artifact {}: {source}", path.display())]
    StagingWriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing to the engine's stdin failed, or no engine input is attached.
    #[error("engine input unavailable: {0}")]
    EngineInput(#[source] io::Error),

    /// Delivery to a single client failed.
    #[error("delivery to client {client} failed: {source}")]
    BroadcastDelivery {
        client: u64,
        #[source]
        source: io::Error,
    },
}

impl BridgeError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, BridgeError::EvalRejected { .. })
    }
}
