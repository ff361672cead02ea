use crate::ipc::OutputMessage;
use crate::lock_or_recover;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Queued,
    DroppedOldest,
}

/// Per-client buffer with bounded capacity and drop-oldest semantics.
///
/// When full, the oldest `Post` is evicted first so a status change is not
/// lost behind a burst of output; only a queue made entirely of status
/// messages evicts a status.
pub(crate) struct ClientQueue {
    capacity: usize,
    inner: Mutex<VecDeque<Arc<OutputMessage>>>,
    dropped: AtomicU64,
}

impl ClientQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn push(&self, message: Arc<OutputMessage>) -> PushOutcome {
        let mut queue = lock_or_recover(&self.inner, "ClientQueue::push");
        let mut outcome = PushOutcome::Queued;
        if queue.len() >= self.capacity {
            let victim = queue
                .iter()
                .position(|queued| !queued.is_status())
                .unwrap_or(0);
            queue.remove(victim);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            outcome = PushOutcome::DroppedOldest;
        }
        queue.push_back(message);
        outcome
    }

    pub(crate) fn drain(&self) -> Vec<Arc<OutputMessage>> {
        let mut queue = lock_or_recover(&self.inner, "ClientQueue::drain");
        queue.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        lock_or_recover(&self.inner, "ClientQueue::len").len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
