use crate::error::BridgeError;
use crate::lock_or_recover;
use std::io::{self, Write};
use std::sync::Mutex;

/// The single writer to the engine's stdin.
///
/// Every directive goes through `write_line`, which holds the lock for the
/// whole write so directives never interleave. A write is tagged with the
/// generation it was decided for; a stale tag fails instead of reaching the
/// next process.
pub(crate) struct EngineInput {
    inner: Mutex<Option<Attached>>,
}

struct Attached {
    generation: u64,
    writer: Box<dyn Write + Send>,
}

impl EngineInput {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub(crate) fn attach(&self, generation: u64, writer: Box<dyn Write + Send>) {
        let mut guard = lock_or_recover(&self.inner, "engine input");
        *guard = Some(Attached { generation, writer });
    }

    /// Drop the writer if it still belongs to `generation`; closes the pipe.
    pub(crate) fn detach(&self, generation: u64) -> bool {
        let mut guard = lock_or_recover(&self.inner, "engine input");
        match guard.as_ref() {
            Some(attached) if attached.generation == generation => {
                *guard = None;
                true
            }
            _ => false,
        }
    }

    /// Write `line` plus a newline terminator and flush.
    pub(crate) fn write_line(&self, generation: u64, line: &str) -> Result<(), BridgeError> {
        let mut guard = lock_or_recover(&self.inner, "engine input");
        let attached = match guard.as_mut() {
            Some(attached) if attached.generation == generation => attached,
            _ => {
                return Err(BridgeError::EngineInput(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "engine stdin is not attached",
                )))
            }
        };
        let mut payload = String::with_capacity(line.len() + 1);
        payload.push_str(line);
        if !payload.ends_with('\n') {
            payload.push('\n');
        }
        let result = attached
            .writer
            .write_all(payload.as_bytes())
            .and_then(|()| attached.writer.flush());
        if let Err(err) = result {
            // A broken pipe will not recover; the driver notices the exit.
            if err.kind() == io::ErrorKind::BrokenPipe {
                *guard = None;
            }
            return Err(BridgeError::EngineInput(err));
        }
        Ok(())
    }
}
