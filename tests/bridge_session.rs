use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

const STUB_ENGINE: &str = r#"#!/bin/sh
echo "*** Welcome to SuperCollider 3.13.0. ***"
while IFS= read -r line; do
  case "$line" in
    *startup.scd\".load\;)
      echo "sc3> $line"
      echo "SuperCollider 3 server ready."
      ;;
    \"*\".load\;)
      path=${line#\"}
      path=${path%\".load;}
      echo "sc3> $line"
      echo "-> $(sed -n '2p' "$path")"
      ;;
    CmdPeriod.run\;)
      echo "sc3> CmdPeriod.run;"
      echo "-> CmdPeriod"
      echo "silenced"
      ;;
  esac
done
"#;

fn scbridge_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_scbridge").expect("scbridge test binary not built")
}

fn write_executable(path: &Path, contents: &str) {
    fs::write(path, contents).expect("write stub");
    let mut perms = fs::metadata(path).expect("stat stub").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod stub");
}

struct Daemon {
    child: Child,
    addr: String,
}

impl Daemon {
    fn start(dir: &Path, staging: &Path) -> Self {
        let engine = dir.join("sclang");
        write_executable(&engine, STUB_ENGINE);
        let startup = dir.join("startup.scd");
        fs::write(&startup, "s.boot;\n").expect("write startup");

        let mut child = Command::new(scbridge_bin())
            .arg("--sclang-cmd")
            .arg(&engine)
            .arg("--startup-script")
            .arg(&startup)
            .arg("--staging-dir")
            .arg(staging)
            .arg("--listen")
            .arg("127.0.0.1:0")
            .arg("--restart-delay-ms")
            .arg("200")
            .arg("--log-level")
            .arg("debug")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn scbridge");

        let stdout = child.stdout.take().expect("stdout");
        let mut banner = String::new();
        BufReader::new(stdout)
            .read_line(&mut banner)
            .expect("read banner");
        let addr = banner
            .trim()
            .rsplit(' ')
            .next()
            .expect("address in banner")
            .to_string();
        Daemon { child, addr }
    }

    fn terminate(mut self) -> std::process::ExitStatus {
        unsafe {
            libc::kill(self.child.id() as libc::pid_t, libc::SIGTERM);
        }
        self.child.wait().expect("wait scbridge")
    }
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .expect("read timeout");
        let writer = stream.try_clone().expect("clone");
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    fn send(&mut self, value: serde_json::Value) {
        let line = format!("{value}\n");
        self.writer.write_all(line.as_bytes()).expect("send");
    }

    fn next(&mut self) -> serde_json::Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read");
        serde_json::from_str(&line).expect("json line")
    }

    /// Read until a status message arrives, returning its `connected` flag.
    fn next_status(&mut self) -> bool {
        loop {
            let message = self.next();
            if message["type"] == "status" {
                return message["connected"].as_bool().expect("connected flag");
            }
        }
    }

    /// Concatenate posted text until `needle` shows up.
    fn posts_until(&mut self, needle: &str) -> String {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut text = String::new();
        while !text.contains(needle) {
            assert!(Instant::now() < deadline, "never saw {needle:?} in {text:?}");
            let message = self.next();
            if message["type"] == "post" {
                text.push_str(message["text"].as_str().expect("text"));
            }
        }
        text
    }
}

fn staged(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
        .unwrap_or_default()
}

#[test]
fn eval_round_trip_through_stub_engine() {
    let dir = tempfile::tempdir().expect("tempdir");
    let staging = dir.path().join("staging");
    let daemon = Daemon::start(dir.path(), &staging);

    let mut client = Client::connect(&daemon.addr);
    let first = client.next();
    assert_eq!(first["type"], "status");
    if first["connected"] != true {
        assert!(client.next_status());
    }

    let mut watcher = Client::connect(&daemon.addr);
    assert_eq!(
        watcher.next(),
        serde_json::json!({"type": "status", "connected": true})
    );

    client.send(serde_json::json!({"type": "eval", "code": "\"hello\".postln;"}));
    let text = client.posts_until("-> \"hello\".postln;\n");
    assert!(!text.contains("sc3>"), "{text:?}");
    assert!(!text.contains(".load"), "{text:?}");

    // Everyone sees the output, not only the requester.
    watcher.posts_until("-> \"hello\".postln;\n");

    client.send(serde_json::json!({"type": "stop"}));
    let text = client.posts_until("silenced\n");
    assert!(!text.contains("CmdPeriod"), "{text:?}");

    let status = daemon.terminate();
    assert!(status.success(), "{status:?}");
    assert!(staged(&staging).is_empty());
}

#[test]
fn malformed_messages_do_not_close_the_connection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let staging = dir.path().join("staging");
    let daemon = Daemon::start(dir.path(), &staging);

    let mut client = Client::connect(&daemon.addr);
    let first = client.next();
    if first["connected"] != true {
        assert!(client.next_status());
    }
    client
        .writer
        .write_all(b"this is not json\n{\"type\":\"unknown\"}\n")
        .expect("send garbage");
    client.send(serde_json::json!({"type": "eval", "code": "42"}));
    client.posts_until("-> 42\n");

    daemon.terminate();
}
