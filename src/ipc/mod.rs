//! Client transport.
//!
//! Architecture:
//! - Accept thread: polls a nonblocking listener, registers each client with
//!   the hub (status snapshot first) and starts its two threads
//! - Reader thread: one JSON request per line, routed to the dispatcher
//! - Writer thread: drains the client's hub queue onto the socket
//!
//! Protocol:
//! - Each line is a JSON object tagged by `"type"`
//! - Bridge → client: `post`, `status`
//! - Client → bridge: `eval`, `stop`

mod protocol;
mod router;
mod server;

#[cfg(test)]
mod tests;

pub use protocol::{ClientMessage, OutputMessage, NOT_READY_NOTICE};
pub use server::{BridgeServer, ServerHandle, MAX_LINE_BYTES};
