//! Process-wide count of advertisements that were sent but not yet processed.
//!
//! This is a termination heuristic, not a proof of convergence. Senders add
//! the fan-out size before enqueueing and receivers subtract only after they
//! have processed a message and enqueued any triggered fan-out, so the count
//! cannot drain while work is still in a mailbox. It can still read zero
//! spuriously when advertisements are dropped (full mailbox under the
//! drop-newest policy) or injected from outside after a round has settled;
//! callers that need certainty should compare the tables against a reference
//! (see `Simulation::verify`).

use log::warn;
use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Debug)]
pub struct PendingTracker {
    count: Mutex<usize>,
    empty: watch::Sender<bool>,
}

impl Default for PendingTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTracker {
    pub fn new() -> Self {
        let (empty, _) = watch::channel(true);
        Self {
            count: Mutex::new(0),
            empty,
        }
    }

    pub fn add(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count += n;
        self.empty.send_replace(false);
    }

    pub fn subtract(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        if n > *count {
            warn!("Pending count underflow: subtracting {} from {}", n, *count);
        }
        *count = count.saturating_sub(n);
        self.empty.send_replace(*count == 0);
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        *self.count.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Watch over the "count is zero" flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.empty.subscribe()
    }

    /// Resolves once the count reads zero.
    pub async fn wait_empty(&self) {
        let mut rx = self.subscribe();
        // the sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|empty| *empty).await;
    }
}
