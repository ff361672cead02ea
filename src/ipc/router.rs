use super::protocol::{ClientMessage, NOT_READY_NOTICE};
use crate::dispatch::{EvalDispatcher, EvalId};
use crate::error::BridgeError;
use crate::hub::{BroadcastHub, ClientId};
use crate::ipc::OutputMessage;

/// What became of one line read from a client.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Routed {
    Blank,
    Malformed,
    Evaluated(EvalId),
    /// Engine not booted; the requester was told, nobody else.
    Rejected,
    /// Accepted but not delivered (staging or engine input failure).
    Failed,
    Stop { sent: bool },
}

/// Parse one client line and act on it.
pub(super) fn route_line(
    line: &str,
    client: ClientId,
    dispatcher: &EvalDispatcher,
    hub: &BroadcastHub,
) -> Routed {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Routed::Blank;
    }

    let message = match ClientMessage::parse(trimmed) {
        Ok(message) => message,
        Err(err) => {
            let err = BridgeError::from(err);
            tracing::warn!(client, error = %err, "dropping client message");
            return Routed::Malformed;
        }
    };
    tracing::debug!(client, kind = message.kind(), "client message");

    match message {
        ClientMessage::Eval { code } => match dispatcher.eval(&code, client) {
            Ok(id) => Routed::Evaluated(id),
            Err(err) if err.is_rejection() => {
                hub.send_to(client, OutputMessage::post(NOT_READY_NOTICE));
                Routed::Rejected
            }
            Err(_) => Routed::Failed,
        },
        ClientMessage::Stop => Routed::Stop {
            sent: dispatcher.stop(client),
        },
    }
}
