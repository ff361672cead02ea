//! Broadcast hub: the live set of connected clients and fan-out of every
//! [`OutputMessage`] to all of them.
//!
//! Each client owns a bounded queue plus a wake-up signal. Broadcasting only
//! pushes into queues, so a stalled client never blocks the engine pump or
//! the other clients; its own writer thread drains the queue at whatever
//! pace the socket allows.

mod queue;

use crate::ipc::OutputMessage;
use crate::lock_or_recover;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use queue::{ClientQueue, PushOutcome};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

pub type ClientId = u64;

struct ClientSlot {
    queue: Arc<ClientQueue>,
    signal: Sender<()>,
}

impl ClientSlot {
    fn deliver(&self, id: ClientId, message: Arc<OutputMessage>) {
        if self.queue.push(message) == PushOutcome::DroppedOldest {
            tracing::debug!(
                client = id,
                dropped = self.queue.dropped(),
                "client queue full; dropped oldest message"
            );
        }
        // A full signal channel means a wake-up is already pending.
        let _ = self.signal.try_send(());
    }
}

pub struct BroadcastHub {
    capacity: usize,
    clients: Mutex<HashMap<ClientId, ClientSlot>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Register a client whose first message is `greeting`.
    pub fn subscribe(self: &Arc<Self>, greeting: OutputMessage) -> ClientSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let queue = Arc::new(ClientQueue::new(self.capacity));
        let (signal, signal_rx) = bounded(1);
        let slot = ClientSlot {
            queue: Arc::clone(&queue),
            signal,
        };
        slot.deliver(id, Arc::new(greeting));

        let count = {
            let mut clients = lock_or_recover(&self.clients, "BroadcastHub::subscribe");
            clients.insert(id, slot);
            clients.len()
        };
        tracing::info!(client = id, clients = count, "client connected");

        ClientSubscription {
            id,
            queue,
            signal_rx,
            hub: Arc::downgrade(self),
        }
    }

    /// Deliver `message` to every connected client. Returns how many clients it was queued for.
    pub fn broadcast(&self, message: OutputMessage) -> usize {
        let message = Arc::new(message);
        let clients = lock_or_recover(&self.clients, "BroadcastHub::broadcast");
        for (id, slot) in clients.iter() {
            slot.deliver(*id, Arc::clone(&message));
        }
        clients.len()
    }

    /// Deliver `message` to one client only.
    pub fn send_to(&self, id: ClientId, message: OutputMessage) -> bool {
        let clients = lock_or_recover(&self.clients, "BroadcastHub::send_to");
        match clients.get(&id) {
            Some(slot) => {
                slot.deliver(id, Arc::new(message));
                true
            }
            None => false,
        }
    }

    /// Remove a client. Safe to call more than once.
    pub fn disconnect(&self, id: ClientId) -> bool {
        let (removed, count) = {
            let mut clients = lock_or_recover(&self.clients, "BroadcastHub::disconnect");
            let removed = clients.remove(&id).is_some();
            (removed, clients.len())
        };
        if removed {
            tracing::info!(client = id, clients = count, "client disconnected");
        }
        removed
    }

    pub fn client_count(&self) -> usize {
        lock_or_recover(&self.clients, "BroadcastHub::client_count").len()
    }

    pub fn is_connected(&self, id: ClientId) -> bool {
        lock_or_recover(&self.clients, "BroadcastHub::is_connected").contains_key(&id)
    }
}

/// Receiving end of one client's queue. Dropping it disconnects the client.
pub struct ClientSubscription {
    id: ClientId,
    queue: Arc<ClientQueue>,
    signal_rx: Receiver<()>,
    hub: Weak<BroadcastHub>,
}

impl ClientSubscription {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Block until messages are queued. `None` once the client was disconnected.
    pub fn recv(&self) -> Option<Vec<Arc<OutputMessage>>> {
        loop {
            self.signal_rx.recv().ok()?;
            if !self.is_connected() {
                return None;
            }
            let batch = self.queue.drain();
            if !batch.is_empty() {
                return Some(batch);
            }
        }
    }

    /// Like [`ClientSubscription::recv`] but gives up after `timeout`.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Vec<Arc<OutputMessage>>, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.signal_rx.recv_timeout(remaining)?;
            let batch = self.queue.drain();
            if !batch.is_empty() {
                return Ok(batch);
            }
        }
    }

    /// Drain whatever is queued without blocking.
    pub fn try_recv(&self) -> Result<Vec<Arc<OutputMessage>>, TryRecvError> {
        self.signal_rx.try_recv()?;
        Ok(self.queue.drain())
    }

    fn is_connected(&self) -> bool {
        self.hub
            .upgrade()
            .is_some_and(|hub| hub.is_connected(self.id))
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

impl Drop for ClientSubscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.disconnect(self.id);
        }
    }
}
