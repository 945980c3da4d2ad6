//! Cancelable expiry timers for Huddle.
//!
//! Every room has exactly one live expiry timer. When it fires, the room's
//! key is delivered on an [`ExpiryReceiver`], and whoever owns the registry
//! deletes the room. Timers never call back into the registry themselves,
//! so they hold no locks and capture nothing but a key.
//!
//! # Stale timers
//!
//! Cancelling a timer that is already mid-fire cannot un-send its
//! notification. Each scheduled timer therefore gets a unique [`Ticket`],
//! and the notification carries it. The owner compares the ticket against
//! the one it currently holds and ignores anything older.
//!
//! ```ignore
//! let (scheduler, mut expired) = ExpiryScheduler::new();
//! let handle = scheduler.schedule(Duration::from_secs(300), room_code);
//!
//! // later, atomically with the state change that shortens the lifetime:
//! let handle = scheduler.reschedule(handle, Duration::from_secs(10), room_code);
//!
//! while let Some(Expired { key, ticket }) = expired.recv().await {
//!     // delete `key` if `ticket` is still its current ticket
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

/// Identifies one scheduled timer. Never reused within a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ttl-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Expired notification
// ---------------------------------------------------------------------------

/// Delivered on the [`ExpiryReceiver`] when a timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired<K> {
    /// The key the timer was scheduled for.
    pub key: K,
    /// The ticket of the timer that fired.
    pub ticket: Ticket,
}

/// Receiving end of a scheduler's expiry notifications.
pub struct ExpiryReceiver<K> {
    rx: mpsc::UnboundedReceiver<Expired<K>>,
}

impl<K> ExpiryReceiver<K> {
    /// Waits for the next fired timer.
    ///
    /// Returns `None` once every [`ExpiryScheduler`] clone is dropped and
    /// no notifications are pending.
    pub async fn recv(&mut self) -> Option<Expired<K>> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A live timer. Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct ExpiryHandle {
    ticket: Ticket,
    deadline: Instant,
    task: AbortHandle,
}

impl ExpiryHandle {
    /// The ticket this timer will report when it fires.
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// When the timer is due.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left until the deadline (zero once it has passed).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the timer has already fired (or was aborted).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ExpiryHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Schedules keyed expiry timers on the Tokio runtime.
///
/// Cheap to clone; all clones share one ticket counter and one notification
/// channel.
pub struct ExpiryScheduler<K> {
    expired_tx: mpsc::UnboundedSender<Expired<K>>,
    next_ticket: Arc<AtomicU64>,
}

impl<K> Clone for ExpiryScheduler<K> {
    fn clone(&self) -> Self {
        Self {
            expired_tx: self.expired_tx.clone(),
            next_ticket: Arc::clone(&self.next_ticket),
        }
    }
}

impl<K> ExpiryScheduler<K>
where
    K: fmt::Display + Send + 'static,
{
    /// Creates a scheduler and the receiver its timers report to.
    pub fn new() -> (Self, ExpiryReceiver<K>) {
        let (expired_tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            expired_tx,
            next_ticket: Arc::new(AtomicU64::new(1)),
        };
        (scheduler, ExpiryReceiver { rx })
    }

    /// Starts a timer that reports `key` after `after` has elapsed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, after: Duration, key: K) -> ExpiryHandle {
        let ticket = Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        let deadline = Instant::now() + after;
        let tx = self.expired_tx.clone();

        debug!(%key, %ticket, after_ms = after.as_millis() as u64, "expiry scheduled");

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            trace!(%key, %ticket, "expiry fired");
            // The receiver is gone when the registry has shut down.
            let _ = tx.send(Expired { key, ticket });
        });

        ExpiryHandle {
            ticket,
            deadline,
            task: task.abort_handle(),
        }
    }

    /// Cancels a timer.
    ///
    /// Returns `true` if the timer was stopped before it fired. A `false`
    /// return means its notification may already be queued; the ticket
    /// check on the receiving side discards it.
    pub fn cancel(&self, handle: ExpiryHandle) -> bool {
        let stopped = !handle.is_finished();
        trace!(ticket = %handle.ticket, stopped, "expiry cancelled");
        drop(handle);
        stopped
    }

    /// Cancels `handle` and schedules a replacement for `key`.
    pub fn reschedule(&self, handle: ExpiryHandle, after: Duration, key: K) -> ExpiryHandle {
        self.cancel(handle);
        self.schedule(after, key)
    }
}
