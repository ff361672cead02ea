//! Helpers shared by unit tests: a fake sclang and message collection.

use crate::config::{EngineCommand, HEADLESS_ENV};
use crate::hub::ClientSubscription;
use crate::ipc::OutputMessage;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shell stand-in for sclang. Prints the compile marker, boots when it sees
/// the startup script directive, answers load directives with the staged
/// code, and logs every stdin line to `$STUB_LOG`.
pub(crate) const STUB_ENGINE: &str = r#"#!/bin/sh
echo "compiling class library..."
echo "*** Welcome to SuperCollider 3.13.0. *** For help type cmd-d."
while IFS= read -r line; do
  printf '%s\n' "$line" >> "$STUB_LOG"
  case "$line" in
    *startup.scd\".load\;)
      echo "sc3> $line"
      echo "Booting server 'localhost' on address 127.0.0.1:57110."
      echo "SuperCollider 3 server ready."
      ;;
    \"*\".load\;)
      path=${line#\"}
      path=${path%\".load;}
      echo "sc3> $line"
      if [ -f "$path" ]; then
        echo "-> $(sed -n '2p' "$path")"
      fi
      ;;
    CmdPeriod.run\;)
      echo "sc3> CmdPeriod.run;"
      echo "-> CmdPeriod"
      ;;
    exit)
      exit 3
      ;;
  esac
done
"#;

pub(crate) fn write_script(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write stub");
    let mut perms = fs::metadata(&path).expect("stat stub").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod stub");
    path
}

/// Engine command running `script` with a fast restart and a stdin log.
pub(crate) fn stub_command(dir: &Path, script: &Path) -> (EngineCommand, PathBuf) {
    let startup = dir.join("startup.scd");
    fs::write(&startup, "s.boot;\n").expect("write startup");
    let log = dir.join("stdin.log");
    let command = EngineCommand {
        program: script.to_string_lossy().into_owned(),
        args: Vec::new(),
        env: HEADLESS_ENV
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .chain([("STUB_LOG".to_string(), log.to_string_lossy().into_owned())])
            .collect(),
        startup_script: startup,
        restart_delay: Duration::from_millis(150),
    };
    (command, log)
}

/// Collect messages until `done` matches one; panics after `timeout`.
pub(crate) fn collect_until(
    sub: &ClientSubscription,
    timeout: Duration,
    mut done: impl FnMut(&OutputMessage) -> bool,
) -> Vec<OutputMessage> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            panic!("timed out waiting for message; saw {seen:?}");
        }
        if let Ok(batch) = sub.recv_timeout(remaining) {
            for message in batch {
                let message = (*message).clone();
                let finished = done(&message);
                seen.push(message);
                if finished {
                    return seen;
                }
            }
        }
    }
}

/// All posted text in `messages`, concatenated.
pub(crate) fn posted_text(messages: &[OutputMessage]) -> String {
    messages
        .iter()
        .filter_map(|m| match m {
            OutputMessage::Post { text } => Some(text.as_str()),
            OutputMessage::Status { .. } => None,
        })
        .collect()
}

pub(crate) fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}

/// In-memory stdin stand-in.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("buffer lock")).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
