use super::StagedArtifact;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on a single wait when nothing is scheduled.
const IDLE_WAIT: Duration = Duration::from_secs(60);

enum ReaperCommand {
    Schedule {
        artifact: Arc<StagedArtifact>,
        deadline: Instant,
    },
    Shutdown,
}

/// Background thread that deletes staged files once their TTL expires.
///
/// Deletion is fire-and-forget: it does not know whether the engine has
/// read the file yet. Whatever is still pending at shutdown is removed
/// right away.
pub struct ArtifactReaper {
    handle: ReaperHandle,
    thread: Option<thread::JoinHandle<()>>,
}

/// Cloneable scheduling side of the reaper.
#[derive(Clone)]
pub struct ReaperHandle {
    tx: Sender<ReaperCommand>,
}

impl ReaperHandle {
    /// Remove `artifact` after `ttl`. Once the reaper stopped, removal is immediate.
    pub fn schedule(&self, artifact: Arc<StagedArtifact>, ttl: Duration) {
        let command = ReaperCommand::Schedule {
            artifact,
            deadline: Instant::now() + ttl,
        };
        if let Err(err) = self.tx.send(command) {
            if let ReaperCommand::Schedule { artifact, .. } = err.into_inner() {
                artifact.remove();
            }
        }
    }
}

impl ArtifactReaper {
    pub fn start() -> Self {
        let (tx, rx) = unbounded();
        let thread = thread::spawn(move || run(rx));
        Self {
            handle: ReaperHandle { tx },
            thread: Some(thread),
        }
    }

    pub fn handle(&self) -> ReaperHandle {
        self.handle.clone()
    }

    pub fn schedule(&self, artifact: Arc<StagedArtifact>, ttl: Duration) {
        self.handle.schedule(artifact, ttl);
    }

    /// Stop the thread, removing every artifact still waiting for its TTL.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.handle.tx.send(ReaperCommand::Shutdown);
        if thread.join().is_err() {
            tracing::error!("artifact reaper thread panicked");
        }
    }
}

impl Drop for ArtifactReaper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(rx: Receiver<ReaperCommand>) {
    let mut pending: BTreeMap<(Instant, u64), Arc<StagedArtifact>> = BTreeMap::new();
    let mut seq: u64 = 0;
    loop {
        let wait = pending
            .keys()
            .next()
            .map(|(deadline, _)| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_WAIT);
        match rx.recv_timeout(wait) {
            Ok(ReaperCommand::Schedule { artifact, deadline }) => {
                seq += 1;
                pending.insert((deadline, seq), artifact);
            }
            Ok(ReaperCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        while let Some(entry) = pending.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let artifact = entry.remove();
            artifact.remove();
        }
    }

    // Late schedules are drained too, so nothing sent before shutdown leaks.
    let late = rx.try_iter().filter_map(|command| match command {
        ReaperCommand::Schedule { artifact, .. } => Some(artifact),
        ReaperCommand::Shutdown => None,
    });
    let leftovers: Vec<_> = pending.into_values().chain(late).collect();
    let remaining = leftovers.len();
    for artifact in leftovers {
        artifact.remove();
    }
    tracing::debug!(remaining, "artifact reaper stopped");
}
