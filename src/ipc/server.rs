use super::router::route_line;
use crate::dispatch::EvalDispatcher;
use crate::engine::EngineHandle;
use crate::error::BridgeError;
use crate::hub::{ClientId, ClientSubscription};
use crate::lock_or_recover;
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(25);
/// A client that cannot take a write for this long is considered gone.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest accepted client line.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

type ClientRegistry = Arc<Mutex<HashMap<ClientId, TcpStream>>>;

/// Newline-delimited JSON server. One reader and one writer thread per client.
pub struct BridgeServer {
    listener: TcpListener,
    engine: EngineHandle,
    dispatcher: EvalDispatcher,
}

impl BridgeServer {
    pub fn bind(
        addr: SocketAddr,
        engine: EngineHandle,
        dispatcher: EvalDispatcher,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            engine,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn start(self) -> ServerHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let clients: ClientRegistry = Arc::new(Mutex::new(HashMap::new()));
        let thread = {
            let shutdown = Arc::clone(&shutdown);
            let clients = Arc::clone(&clients);
            thread::spawn(move || self.accept_loop(&shutdown, &clients))
        };
        ServerHandle {
            shutdown,
            clients,
            thread: Some(thread),
        }
    }

    fn accept_loop(self, shutdown: &AtomicBool, clients: &ClientRegistry) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "client server listening");
        }
        while !shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(err) = self.admit(stream, peer, clients) {
                        tracing::warn!(%peer, error = %err, "failed to set up client");
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
        tracing::info!("client server stopped");
    }

    fn admit(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        clients: &ClientRegistry,
    ) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        let _ = stream.set_nodelay(true);
        let writer = stream.try_clone()?;
        let registered = stream.try_clone()?;

        let subscription = self.engine.connect_client();
        let id = subscription.id();
        lock_or_recover(clients, "client registry").insert(id, registered);
        tracing::debug!(client = id, %peer, "client accepted");

        thread::spawn(move || write_loop(subscription, writer));

        let dispatcher = self.dispatcher.clone();
        let engine = self.engine.clone();
        let clients = Arc::clone(clients);
        thread::spawn(move || {
            read_loop(id, stream, &dispatcher, &engine);
            engine.hub().disconnect(id);
            if let Some(stream) = lock_or_recover(&clients, "client registry").remove(&id) {
                let _ = stream.shutdown(Shutdown::Both);
            }
        });
        Ok(())
    }
}

/// Drain the client's queue onto the socket until it disconnects.
fn write_loop(subscription: ClientSubscription, mut stream: TcpStream) {
    let id = subscription.id();
    'outer: while let Some(batch) = subscription.recv() {
        for message in batch {
            if let Err(source) = stream.write_all(message.to_line().as_bytes()) {
                let err = BridgeError::BroadcastDelivery { client: id, source };
                tracing::warn!(error = %err, "dropping client");
                break 'outer;
            }
        }
        if let Err(source) = stream.flush() {
            let err = BridgeError::BroadcastDelivery { client: id, source };
            tracing::warn!(error = %err, "dropping client");
            break;
        }
    }
    // Wakes the reader so both halves go away together.
    let _ = stream.shutdown(Shutdown::Both);
}

fn read_loop(
    id: ClientId,
    stream: TcpStream,
    dispatcher: &EvalDispatcher,
    engine: &EngineHandle,
) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        let limit = (MAX_LINE_BYTES + 1) as u64;
        match reader.by_ref().take(limit).read_line(&mut line) {
            Ok(0) => break,
            Ok(n) if n > MAX_LINE_BYTES && !line.ends_with('\n') => {
                tracing::warn!(
                    client = id,
                    limit = MAX_LINE_BYTES,
                    "client line too long; closing"
                );
                break;
            }
            Ok(_) => {
                route_line(&line, id, dispatcher, engine.hub());
            }
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                // read_line already consumed the offending line.
                tracing::warn!(client = id, "client sent invalid UTF-8; dropping line");
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                tracing::debug!(client = id, error = %err, "client read ended");
                break;
            }
        }
    }
}

/// Running server. Shutting down closes every client connection.
pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
    clients: ClientRegistry,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    pub fn client_count(&self) -> usize {
        lock_or_recover(&self.clients, "client registry").len()
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("client server thread panicked");
            }
        }
        let clients: Vec<TcpStream> = lock_or_recover(&self.clients, "client registry")
            .drain()
            .map(|(_, stream)| stream)
            .collect();
        for stream in clients {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
