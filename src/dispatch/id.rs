use std::fmt;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Unique name for one evaluation: `<millis hex>-<pid>-<seq>`.
///
/// The sequence counter is process-wide, so ids never repeat within a run
/// even when the clock does not move; the pid keeps concurrent bridges
/// sharing a staging directory apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EvalId(String);

impl EvalId {
    pub fn next() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or(0);
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        EvalId(format!("{millis:x}-{}-{seq}", process::id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EvalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
