use super::directives::load_directive;
use super::process::{describe_exit, EngineProcess, SpawnedEngine};
use super::pump::OutputPump;
use super::EngineHandle;
use crate::config::EngineCommand;
use crate::sanitize::OutputSanitizer;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::process::ExitStatus;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How often the driver checks whether the child exited.
const EXIT_POLL: Duration = Duration::from_millis(50);
/// SIGTERM grace period before SIGKILL on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Exited,
    Shutdown,
}

/// Owns the engine lifecycle: spawn, watch, and respawn after every exit.
pub struct Supervisor {
    command: EngineCommand,
    engine: EngineHandle,
    sanitizer: Arc<OutputSanitizer>,
    bootstrap: String,
}

impl Supervisor {
    pub fn new(command: EngineCommand, engine: EngineHandle) -> Self {
        let bootstrap = load_directive(&command.startup_script);
        let sanitizer = Arc::new(OutputSanitizer::new(&bootstrap));
        Self {
            command,
            engine,
            sanitizer,
            bootstrap,
        }
    }

    pub fn sanitizer(&self) -> Arc<OutputSanitizer> {
        Arc::clone(&self.sanitizer)
    }

    /// Start the lifecycle driver thread. It is the only place a child is
    /// ever spawned, so two generations can never run at once.
    pub fn start(self) -> SupervisorHandle {
        let engine = self.engine.clone();
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let thread = thread::spawn(move || self.run(shutdown_rx));
        SupervisorHandle {
            engine,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    fn run(self, shutdown: Receiver<()>) {
        tracing::info!(command = %self.command.display(), "engine supervisor started");
        loop {
            let generation = self.engine.begin_generation();
            let outcome = match EngineProcess::spawn(&self.command, generation) {
                Ok(spawned) => self.supervise(spawned, &shutdown),
                Err(err) => {
                    tracing::error!(generation, error = %err, "engine spawn failed");
                    self.engine.mark_crashed(generation);
                    Lifecycle::Exited
                }
            };
            if outcome == Lifecycle::Shutdown {
                break;
            }

            tracing::info!(
                delay_ms = self.command.restart_delay.as_millis() as u64,
                "restarting engine after delay"
            );
            match shutdown.recv_timeout(self.command.restart_delay) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::info!("engine supervisor stopped");
    }

    fn supervise(&self, spawned: SpawnedEngine, shutdown: &Receiver<()>) -> Lifecycle {
        let SpawnedEngine {
            mut process,
            stdin,
            output,
        } = spawned;
        let generation = process.generation;
        tracing::info!(generation, pid = process.pid(), "engine spawned");

        self.engine.attach_input(generation, Box::new(stdin));
        OutputPump {
            generation,
            engine: self.engine.clone(),
            sanitizer: Arc::clone(&self.sanitizer),
            bootstrap: self.bootstrap.clone(),
        }
        .spawn(output);

        loop {
            match process.try_wait() {
                Ok(Some(status)) => {
                    self.on_exit(&process, Some(status));
                    return Lifecycle::Exited;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(generation, error = %err, "failed to poll engine; terminating");
                    let status = process.terminate(SHUTDOWN_GRACE);
                    self.on_exit(&process, status);
                    return Lifecycle::Exited;
                }
            }
            match shutdown.recv_timeout(EXIT_POLL) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!(generation, "stopping engine");
                    let status = process.terminate(SHUTDOWN_GRACE);
                    self.engine.mark_crashed(generation);
                    if let Some(status) = status {
                        tracing::info!(generation, exit = %describe_exit(&status), "engine stopped");
                    }
                    return Lifecycle::Shutdown;
                }
            }
        }
    }

    fn on_exit(&self, process: &EngineProcess, status: Option<ExitStatus>) {
        let generation = process.generation;
        let exit = status
            .as_ref()
            .map(describe_exit)
            .unwrap_or_else(|| "unknown exit status".to_string());
        tracing::warn!(
            generation,
            exit = %exit,
            uptime_ms = process.spawned_at.elapsed().as_millis() as u64,
            "engine exited"
        );
        self.engine.mark_crashed(generation);
        // Anything the engine started (the audio server) goes with it.
        process.signal_group(libc::SIGTERM);
    }
}

/// Running supervisor. Stopping (or dropping) it terminates the engine.
pub struct SupervisorHandle {
    engine: EngineHandle,
    shutdown: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SupervisorHandle {
    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("engine supervisor thread panicked");
            }
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
