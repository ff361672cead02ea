use super::router::{route_line, Routed};
use super::*;
use crate::dispatch::EvalDispatcher;
use crate::engine::EngineHandle;
use crate::hub::BroadcastHub;
use crate::staging::{ArtifactReaper, StagingStore};
use crate::test_support::{wait_for, SharedBuffer};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct Fixture {
    _dir: tempfile::TempDir,
    _reaper: ArtifactReaper,
    engine: EngineHandle,
    dispatcher: EvalDispatcher,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(StagingStore::new(dir.path()).expect("store"));
    let engine = EngineHandle::new(BroadcastHub::new(64));
    let reaper = ArtifactReaper::start();
    let dispatcher = EvalDispatcher::new(
        engine.clone(),
        store,
        reaper.handle(),
        Duration::from_secs(60),
    );
    Fixture {
        _dir: dir,
        _reaper: reaper,
        engine,
        dispatcher,
    }
}

// -------------------------------------------------------------------------
// Wire format
// -------------------------------------------------------------------------

#[test]
fn output_messages_use_type_tag() {
    assert_eq!(
        OutputMessage::post("-> 2\n").to_line(),
        "{\"type\":\"post\",\"text\":\"-> 2\\n\"}\n"
    );
    assert_eq!(
        OutputMessage::status(true).to_line(),
        "{\"type\":\"status\",\"connected\":true}\n"
    );
}

#[test]
fn client_messages_parse() {
    assert_eq!(
        ClientMessage::parse(r#"{"type":"eval","code":"1 + 1"}"#).expect("eval"),
        ClientMessage::Eval {
            code: "1 + 1".to_string()
        }
    );
    assert_eq!(
        ClientMessage::parse(r#"{"type":"stop"}"#).expect("stop"),
        ClientMessage::Stop
    );
    assert!(ClientMessage::parse(r#"{"type":"dance"}"#).is_err());
    assert!(ClientMessage::parse(r#"{"type":"eval"}"#).is_err());
    assert!(ClientMessage::parse("not json").is_err());
}

// -------------------------------------------------------------------------
// Routing
// -------------------------------------------------------------------------

#[test]
fn route_ignores_blank_and_malformed_lines() {
    let fx = fixture();
    let hub = fx.engine.hub();
    assert_eq!(route_line("  \n", 1, &fx.dispatcher, hub), Routed::Blank);
    assert_eq!(route_line("{oops", 1, &fx.dispatcher, hub), Routed::Malformed);
    assert_eq!(
        route_line(r#"{"type":"reboot"}"#, 1, &fx.dispatcher, hub),
        Routed::Malformed
    );
}

#[test]
fn rejection_reaches_only_the_requester() {
    let fx = fixture();
    let requester = fx.engine.connect_client();
    let bystander = fx.engine.connect_client();
    let _ = requester.try_recv();
    let _ = bystander.try_recv();

    let routed = route_line(
        r#"{"type":"eval","code":"1"}"#,
        requester.id(),
        &fx.dispatcher,
        fx.engine.hub(),
    );
    assert_eq!(routed, Routed::Rejected);

    let notice = requester.try_recv().expect("notice");
    assert_eq!(*notice[0], OutputMessage::post(NOT_READY_NOTICE));
    assert!(bystander.try_recv().is_err());
}

#[test]
fn route_dispatches_eval_and_stop() {
    let fx = fixture();
    let hub = fx.engine.hub();
    assert_eq!(
        route_line(r#"{"type":"stop"}"#, 1, &fx.dispatcher, hub),
        Routed::Stop { sent: false }
    );

    let stdin = SharedBuffer::default();
    fx.engine.force_booted(Box::new(stdin.clone()));
    let routed = route_line(r#"{"type":"eval","code":"2"}"#, 1, &fx.dispatcher, hub);
    assert!(matches!(routed, Routed::Evaluated(_)));
    assert_eq!(
        route_line(r#"{"type":"stop"}"#, 1, &fx.dispatcher, hub),
        Routed::Stop { sent: true }
    );
    let written = stdin.contents();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(".scd\".load;"));
    assert_eq!(lines[1], "CmdPeriod.run;");
}

// -------------------------------------------------------------------------
// TCP server
// -------------------------------------------------------------------------

struct TestClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TestClient {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("read timeout");
        let writer = stream.try_clone().expect("clone");
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .expect("send");
    }

    fn next(&mut self) -> OutputMessage {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read line");
        serde_json::from_str(&line).expect("output message")
    }
}

fn start_server(fx: &Fixture) -> (ServerHandle, SocketAddr) {
    let server = BridgeServer::bind(
        "127.0.0.1:0".parse().expect("addr"),
        fx.engine.clone(),
        fx.dispatcher.clone(),
    )
    .expect("bind");
    let addr = server.local_addr().expect("local addr");
    (server.start(), addr)
}

#[test]
fn server_greets_with_status_and_rejects_early_eval() {
    let fx = fixture();
    let (server, addr) = start_server(&fx);

    let mut alice = TestClient::connect(addr);
    let mut bob = TestClient::connect(addr);
    assert_eq!(alice.next(), OutputMessage::status(false));
    assert_eq!(bob.next(), OutputMessage::status(false));

    alice.send(r#"{"type":"eval","code":"1"}"#);
    assert_eq!(alice.next(), OutputMessage::post(NOT_READY_NOTICE));

    fx.engine.force_booted(Box::new(SharedBuffer::default()));
    // Bob's next message is the boot status, not Alice's notice.
    assert_eq!(bob.next(), OutputMessage::status(true));
    assert_eq!(alice.next(), OutputMessage::status(true));

    server.shutdown();
}

#[test]
fn server_keeps_connection_after_malformed_line() {
    let fx = fixture();
    let stdin = SharedBuffer::default();
    fx.engine.force_booted(Box::new(stdin.clone()));
    let (server, addr) = start_server(&fx);

    let mut client = TestClient::connect(addr);
    assert_eq!(client.next(), OutputMessage::status(true));
    client.send("{not json");
    client.send(r#"{"type":"stop"}"#);
    assert!(wait_for(READ_TIMEOUT, || stdin.contents() == "CmdPeriod.run;\n"));

    server.shutdown();
}

#[test]
fn server_forwards_broadcasts_and_forgets_closed_clients() {
    let fx = fixture();
    let (server, addr) = start_server(&fx);
    let hub = Arc::clone(fx.engine.hub());

    let mut client = TestClient::connect(addr);
    assert_eq!(client.next(), OutputMessage::status(false));
    hub.broadcast(OutputMessage::post("hello\n"));
    assert_eq!(client.next(), OutputMessage::post("hello\n"));
    assert_eq!(hub.client_count(), 1);

    drop(client);
    assert!(wait_for(READ_TIMEOUT, || hub.client_count() == 0));
    assert!(wait_for(READ_TIMEOUT, || server.client_count() == 0));

    server.shutdown();
}

#[test]
fn shutdown_closes_client_connections() {
    let fx = fixture();
    let (server, addr) = start_server(&fx);
    let mut client = TestClient::connect(addr);
    assert_eq!(client.next(), OutputMessage::status(false));

    server.shutdown();
    let mut line = String::new();
    let read = client.reader.read_line(&mut line).expect("read after shutdown");
    assert_eq!(read, 0);
}
