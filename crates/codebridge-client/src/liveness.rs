//! Liveness bookkeeping shared by the router and heartbeat of one session.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Read deadline for one session.
///
/// The router's read fails once the deadline passes; the heartbeat pushes it
/// forward on every ping sent and every pong observed.
#[derive(Debug)]
pub struct ReadDeadline {
    timeout: Duration,
    deadline: Mutex<Instant>,
}

impl ReadDeadline {
    /// Deadline armed at now + `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Mutex::new(Instant::now() + timeout),
        }
    }

    /// Push the deadline to now + timeout.
    pub fn refresh(&self) {
        *self.deadline.lock() = Instant::now() + self.timeout;
    }

    /// Current deadline.
    pub fn deadline(&self) -> Instant {
        *self.deadline.lock()
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline()
    }
}

/// Producer side of the single-slot pong notification.
///
/// `notify` never blocks: when a signal is already pending the new one is
/// dropped, since one pending refresh covers both.
#[derive(Clone, Debug)]
pub struct LivenessSignal {
    tx: mpsc::Sender<()>,
}

impl LivenessSignal {
    /// New signal and the receiver the heartbeat listens on.
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Send or drop.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}
