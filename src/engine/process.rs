use crate::config::EngineCommand;
use crate::error::BridgeError;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{self, ErrorKind, Read};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const READ_CHUNK: usize = 4096;
/// Chunks buffered between the reader threads and the pump.
const CHUNK_BACKLOG: usize = 256;
const WAIT_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub(crate) fn index(self) -> usize {
        match self {
            OutputStream::Stdout => 0,
            OutputStream::Stderr => 1,
        }
    }
}

#[derive(Debug)]
pub(crate) struct OutputChunk {
    pub(crate) stream: OutputStream,
    pub(crate) bytes: Vec<u8>,
}

/// One running engine process and the pipes it was started with.
pub(crate) struct EngineProcess {
    child: Child,
    pub(crate) generation: u64,
    pub(crate) spawned_at: Instant,
}

pub(crate) struct SpawnedEngine {
    pub(crate) process: EngineProcess,
    pub(crate) stdin: ChildStdin,
    pub(crate) output: Receiver<OutputChunk>,
}

impl EngineProcess {
    /// Start the engine in its own process group with all three stdio pipes.
    pub(crate) fn spawn(
        command: &EngineCommand,
        generation: u64,
    ) -> Result<SpawnedEngine, BridgeError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|source| BridgeError::SpawnFailure {
                command: command.display(),
                source,
            })?;

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (stdin, stdout, stderr) = match pipes {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BridgeError::SpawnFailure {
                    command: command.display(),
                    source: io::Error::new(ErrorKind::BrokenPipe, "engine stdio pipe missing"),
                });
            }
        };

        let (tx, rx) = bounded(CHUNK_BACKLOG);
        spawn_reader_thread(OutputStream::Stdout, stdout, tx.clone(), generation);
        spawn_reader_thread(OutputStream::Stderr, stderr, tx, generation);

        Ok(SpawnedEngine {
            process: EngineProcess {
                child,
                generation,
                spawned_at: Instant::now(),
            },
            stdin,
            output: rx,
        })
    }

    pub(crate) fn pid(&self) -> u32 {
        self.child.id()
    }

    pub(crate) fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// SIGTERM the process group, escalate to SIGKILL after `grace`, then reap.
    pub(crate) fn terminate(&mut self, grace: Duration) -> Option<ExitStatus> {
        if let Ok(Some(status)) = self.child.try_wait() {
            self.signal_group(libc::SIGTERM);
            return Some(status);
        }
        self.signal_group(libc::SIGTERM);
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) => thread::sleep(WAIT_POLL),
                Err(_) => break,
            }
        }
        tracing::warn!(
            generation = self.generation,
            pid = self.pid(),
            "engine ignored SIGTERM; sending SIGKILL"
        );
        self.signal_group(libc::SIGKILL);
        self.child.wait().ok()
    }

    /// Signal whatever is left of the engine's process group (the audio
    /// server it started, for instance). Missing groups are not an error.
    pub(crate) fn signal_group(&self, signo: libc::c_int) {
        let pgid = self.pid() as libc::pid_t;
        let rc = unsafe { libc::kill(-pgid, signo) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                tracing::debug!(
                    generation = self.generation,
                    signo,
                    error = %err,
                    "failed to signal engine process group"
                );
            }
        }
    }
}

pub(crate) fn should_retry_read_error(err: &io::Error) -> bool {
    err.kind() == ErrorKind::Interrupted || err.kind() == ErrorKind::WouldBlock
}

/// Forward raw chunks from one pipe until EOF or the pump goes away.
fn spawn_reader_thread<R>(
    stream: OutputStream,
    mut reader: R,
    tx: Sender<OutputChunk>,
    generation: u64,
) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = OutputChunk {
                        stream,
                        bytes: buffer[..n].to_vec(),
                    };
                    if tx.send(chunk).is_err() {
                        break;
                    }
                }
                Err(err) if should_retry_read_error(&err) => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(err) => {
                    tracing::debug!(generation, ?stream, error = %err, "engine pipe read failed");
                    break;
                }
            }
        }
    })
}

/// "exit code 1" / "signal 9" for logs.
pub(crate) fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        format!("exit code {code}")
    } else if let Some(signal) = status.signal() {
        format!("signal {signal}")
    } else {
        "unknown exit status".to_string()
    }
}
