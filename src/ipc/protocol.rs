//! JSON wire protocol between the bridge and its clients.
//!
//! Messages are newline-delimited JSON objects with a `"type"` tag.

use serde::{Deserialize, Serialize};

// ============================================================================
// Output messages (bridge → client)
// ============================================================================

/// Messages fanned out to clients. Immutable once built; the hub shares one
/// instance between every client queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputMessage {
    /// Sanitized engine output
    Post { text: String },

    /// Engine availability
    Status { connected: bool },
}

impl OutputMessage {
    pub fn post(text: impl Into<String>) -> Self {
        OutputMessage::Post { text: text.into() }
    }

    pub fn status(connected: bool) -> Self {
        OutputMessage::Status { connected }
    }

    pub fn is_status(&self) -> bool {
        matches!(self, OutputMessage::Status { .. })
    }

    /// Encode as a single JSON line including the trailing newline.
    pub fn to_line(&self) -> String {
        // Both variants only hold strings and bools, which always serialize.
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}

// ============================================================================
// Client messages (client → bridge)
// ============================================================================

/// Requests received from a client connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Evaluate a block of code
    Eval { code: String },

    /// Silence the engine
    Stop,
}

impl ClientMessage {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Eval { .. } => "eval",
            ClientMessage::Stop => "stop",
        }
    }
}

/// Reply sent only to the requester when an eval arrives before the engine booted.
pub const NOT_READY_NOTICE: &str = "scbridge: engine is not ready, evaluation rejected\n";
