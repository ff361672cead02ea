use std::env;
use std::path::PathBuf;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7770";
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_RESTART_DELAY_MS: u64 = 3_000;
pub const DEFAULT_ARTIFACT_TTL_MS: u64 = 15_000;

pub const MIN_CLIENT_QUEUE_CAPACITY: usize = 8;
pub const MAX_CLIENT_QUEUE_CAPACITY: usize = 65_536;
pub const MAX_DELAY_MS: u64 = 600_000;

/// Printed by sclang once the class library has compiled.
pub const COMPILE_MARKER: &str = "*** Welcome to SuperCollider";
/// Printed once scsynth has booted and the language is connected to it.
pub const BOOT_MARKER: &str = "SuperCollider 3 server ready.";
/// Interactive prompt sclang prints before reading input.
pub const PROMPT: &str = "sc3> ";
/// Silences everything currently playing.
pub const INTERRUPT_DIRECTIVE: &str = "CmdPeriod.run;";

pub const ARTIFACT_PREFIX: &str = "scbridge-eval-";
pub const ARTIFACT_SUFFIX: &str = ".scd";

/// Always exported to the engine so it never tries to open a display.
pub const HEADLESS_ENV: &[(&str, &str)] = &[("QT_QPA_PLATFORM", "offscreen")];

pub fn default_staging_dir() -> PathBuf {
    env::temp_dir().join("scbridge")
}
