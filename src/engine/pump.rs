use super::markers::MarkerScanner;
use super::process::OutputChunk;
use super::state::EngineState;
use super::EngineHandle;
use crate::ipc::OutputMessage;
use crate::sanitize::{OutputSanitizer, StreamFilter};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Partial lines are flushed after this much output silence.
pub(crate) const IDLE_FLUSH: Duration = Duration::from_millis(50);

pub(crate) struct OutputPump {
    pub(crate) generation: u64,
    pub(crate) engine: EngineHandle,
    pub(crate) sanitizer: Arc<OutputSanitizer>,
    /// Written once when the generation reaches Compiling.
    pub(crate) bootstrap: String,
}

impl OutputPump {
    /// Consume one generation's output until both pipes close.
    ///
    /// Every chunk feeds marker detection and the sanitized broadcast side
    /// by side; neither waits on the other.
    pub(crate) fn spawn(self, output: Receiver<OutputChunk>) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run(output))
    }

    fn run(self, output: Receiver<OutputChunk>) {
        let mut scanners = [MarkerScanner::new(), MarkerScanner::new()];
        let mut filters = [
            StreamFilter::new(Arc::clone(&self.sanitizer)),
            StreamFilter::new(Arc::clone(&self.sanitizer)),
        ];
        loop {
            match output.recv_timeout(IDLE_FLUSH) {
                Ok(chunk) => {
                    let idx = chunk.stream.index();
                    for marker in scanners[idx].feed(&chunk.bytes) {
                        if self.engine.apply_marker(self.generation, marker)
                            == Some(EngineState::Compiling)
                        {
                            self.send_bootstrap();
                        }
                    }
                    let text = filters[idx].push(&chunk.bytes);
                    self.publish(text);
                }
                Err(RecvTimeoutError::Timeout) => {
                    for filter in filters.iter_mut().filter(|f| f.has_pending()) {
                        let text = filter.flush_partial();
                        self.publish(text);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    for filter in filters.iter_mut() {
                        let text = filter.finish();
                        self.publish(text);
                    }
                    break;
                }
            }
        }
        tracing::debug!(generation = self.generation, "engine output closed");
    }

    fn send_bootstrap(&self) {
        match self.engine.write_input(self.generation, &self.bootstrap) {
            Ok(()) => tracing::debug!(generation = self.generation, "startup script directive sent"),
            Err(err) => tracing::error!(
                generation = self.generation,
                error = %err,
                "failed to send startup script directive"
            ),
        }
    }

    fn publish(&self, text: String) {
        if text.is_empty() {
            return;
        }
        self.engine.hub().broadcast(OutputMessage::post(text));
    }
}
