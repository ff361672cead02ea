use crate::config::{ARTIFACT_PREFIX, ARTIFACT_SUFFIX};
use crate::dispatch::EvalId;
use crate::engine::directives::wrap_block;
use crate::error::BridgeError;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Directory of short-lived code files the engine loads by path.
#[derive(Debug)]
pub struct StagingStore {
    dir: PathBuf,
}

impl StagingStore {
    /// Open (creating if needed) the staging directory and sweep files left
    /// behind by bridges that are no longer running.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, BridgeError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| BridgeError::StagingWriteFailure {
            path: dir.clone(),
            source,
        })?;
        let store = Self { dir };
        let swept = store.sweep_stale();
        if swept > 0 {
            tracing::info!(dir = %store.dir.display(), swept, "removed stale staging files");
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, id: &EvalId) -> PathBuf {
        self.dir.join(format!("{ARTIFACT_PREFIX}{id}{ARTIFACT_SUFFIX}"))
    }

    /// Write `code` wrapped in one block. Never overwrites an existing file.
    pub fn write(&self, id: &EvalId, code: &str) -> Result<Arc<StagedArtifact>, BridgeError> {
        let path = self.artifact_path(id);
        let result = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .and_then(|mut file| {
                file.write_all(wrap_block(code).as_bytes())?;
                file.flush()
            });
        match result {
            Ok(()) => Ok(Arc::new(StagedArtifact::new(path))),
            Err(source) => {
                // A half-written file is still ours to clean up.
                if source.kind() != io::ErrorKind::AlreadyExists {
                    let _ = fs::remove_file(&path);
                }
                Err(BridgeError::StagingWriteFailure { path, source })
            }
        }
    }

    /// Remove staged artifacts whose owning process is gone. Files of live
    /// bridges sharing the directory, this one included, are left alone.
    /// Returns the count.
    pub fn sweep_stale(&self) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %self.dir.display(), error = %err, "cannot list staging dir");
                return 0;
            }
        };
        entries
            .filter_map(Result::ok)
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                is_artifact_name(&name) && !owner_alive(&name)
            })
            .filter(|entry| fs::remove_file(entry.path()).is_ok())
            .count()
    }
}

pub(crate) fn is_artifact_name(name: &str) -> bool {
    name.starts_with(ARTIFACT_PREFIX) && name.ends_with(ARTIFACT_SUFFIX)
}

/// Pid recorded in an artifact name (`<prefix><millis hex>-<pid>-<seq><suffix>`).
pub(crate) fn artifact_owner(name: &str) -> Option<libc::pid_t> {
    let id = name
        .strip_prefix(ARTIFACT_PREFIX)?
        .strip_suffix(ARTIFACT_SUFFIX)?;
    let mut fields = id.split('-');
    let _millis = fields.next()?;
    let pid = fields.next()?.parse().ok()?;
    fields.next()?;
    (pid > 0).then_some(pid)
}

/// Names without a readable pid count as abandoned.
fn owner_alive(name: &str) -> bool {
    let Some(pid) = artifact_owner(name) else {
        return false;
    };
    if pid as u32 == std::process::id() {
        return true;
    }
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// A staged file. Removal happens at most once, whoever asks first.
#[derive(Debug)]
pub struct StagedArtifact {
    path: PathBuf,
    removed: AtomicBool,
}

impl StagedArtifact {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            removed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Delete the file. Returns `true` only for the call that did it.
    pub fn remove(&self) -> bool {
        if self.removed.swap(true, Ordering::AcqRel) {
            return false;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "staging file removed");
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "staging file already gone");
            }
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to remove staging file"
                );
            }
        }
        true
    }
}
