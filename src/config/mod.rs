//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::{ArgAction, Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::{
    default_staging_dir, ARTIFACT_PREFIX, ARTIFACT_SUFFIX, BOOT_MARKER, COMPILE_MARKER,
    DEFAULT_ARTIFACT_TTL_MS, DEFAULT_CLIENT_QUEUE_CAPACITY, DEFAULT_LISTEN_ADDR,
    DEFAULT_RESTART_DELAY_MS, HEADLESS_ENV, INTERRUPT_DIRECTIVE, PROMPT,
};

/// CLI options for the scbridge daemon. Validated values keep the engine subprocess safe.
#[derive(Debug, Parser, Clone)]
#[command(about = "scbridge: share one sclang session with many clients", author, version)]
pub struct BridgeConfig {
    /// sclang command line (program plus arguments, shell-quoted)
    #[arg(long = "sclang-cmd", env = "SCLANG_CMD", default_value = "sclang")]
    pub sclang_cmd: String,

    /// Startup script loaded once per boot to bring up the audio server
    #[arg(long = "startup-script", env = "SCBRIDGE_STARTUP_SCRIPT")]
    pub startup_script: PathBuf,

    /// Extra KEY=VALUE environment for the engine process (repeatable)
    #[arg(long = "engine-env", action = ArgAction::Append, value_name = "KEY=VALUE")]
    pub engine_env: Vec<String>,

    /// Directory holding staged code files
    #[arg(long = "staging-dir", default_value_os_t = default_staging_dir())]
    pub staging_dir: PathBuf,

    /// Address the JSON-lines client server listens on
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// Messages buffered per client before the oldest are dropped
    #[arg(long = "client-queue-capacity", default_value_t = DEFAULT_CLIENT_QUEUE_CAPACITY)]
    pub client_queue_capacity: usize,

    /// Delay between an engine exit and the next spawn (milliseconds)
    #[arg(long = "restart-delay-ms", default_value_t = DEFAULT_RESTART_DELAY_MS)]
    pub restart_delay_ms: u64,

    /// Lifetime of a staged code file before it is removed (milliseconds)
    #[arg(long = "artifact-ttl-ms", default_value_t = DEFAULT_ARTIFACT_TTL_MS)]
    pub artifact_ttl_ms: u64,

    /// Minimum log level
    #[arg(long = "log-level", env = "SCBRIDGE_LOG", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Write JSON logs to this file instead of stderr
    #[arg(long = "log-file", env = "SCBRIDGE_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Allow code snippets in debug logs
    #[arg(
        long = "log-content",
        env = "SCBRIDGE_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Disable all logging
    #[arg(long = "no-logs", env = "SCBRIDGE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Resolved engine launch parameters, derived from a validated [`BridgeConfig`].
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Absolute path of the startup script.
    pub startup_script: PathBuf,
    pub restart_delay: Duration,
}

impl EngineCommand {
    /// Human-readable command line for logs and errors.
    pub fn display(&self) -> String {
        let mut words = vec![self.program.clone()];
        words.extend(self.args.iter().cloned());
        shell_words::join(words)
    }
}

impl BridgeConfig {
    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_millis(self.artifact_ttl_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}
