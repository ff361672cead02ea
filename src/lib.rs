//! Bridge between a long-running `sclang` interpreter and many remote viewers.
//!
//! The engine supervisor owns the interpreter process, the dispatcher turns
//! client requests into load directives, and the hub fans sanitized output
//! out to every connected client over newline-delimited JSON.

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod hub;
pub mod ipc;
mod lock;
pub mod sanitize;
pub mod staging;
pub mod telemetry;
#[cfg(test)]
mod test_support;
pub mod utf8_safe;

pub(crate) use lock::lock_or_recover;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use ipc::{ClientMessage, OutputMessage};
