//! Thread-safe timed message queue.
//!
//! Any thread may enqueue, remove or register idle handlers; only the owning
//! looper pops and parks. One `parking_lot::Mutex` guards the pending list, the
//! quit latch, the wake flag and the idle handlers, and one `Condvar` releases
//! the parked consumer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use super::error::{AppResult, LoopError};
use super::message::Message;
use crate::infra::MessageList;
use crate::util::clock::{Clock, MonotonicClock};

/// Callback run when the queue has nothing immediately due.
///
/// Returning `Ok(true)` keeps the handler registered; `Ok(false)`, an error or
/// a panic removes it.
pub trait IdleHandler: Send + Sync {
    /// Called by the pump before it blocks waiting for more messages.
    ///
    /// # Errors
    ///
    /// An error is logged and the handler is removed.
    fn queue_idle(&self) -> AppResult<bool>;
}

impl<F> IdleHandler for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn queue_idle(&self) -> AppResult<bool> {
        Ok(self())
    }
}

/// Outcome of a single non-blocking fetch attempt by the pump.
pub(crate) enum Fetch {
    /// A due message, unlinked from the queue.
    Ready(Message),
    /// Nothing is due; these idle handlers should be told.
    Idle(Vec<Arc<dyn IdleHandler>>),
    /// Nothing is due and nobody needs telling.
    Empty,
}

/// Pending message as shown in dumps.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PendingMessage {
    /// Due time in milliseconds.
    pub when: u64,
    /// Message code.
    pub what: i32,
    /// Target label, `"quit"` for the sentinel.
    pub target: String,
    /// Whether the message carries a callback.
    pub has_callback: bool,
}

struct QueueState {
    messages: MessageList,
    idle_handlers: Vec<Arc<dyn IdleHandler>>,
    quitting: bool,
    wake_pending: bool,
}

/// Time-ordered queue of pending messages for one looper.
pub struct MessageQueue {
    state: Mutex<QueueState>,
    wake: Condvar,
    quit_allowed: bool,
    clock: Arc<dyn Clock>,
}

impl MessageQueue {
    /// Create a queue on the process monotonic clock.
    #[must_use]
    pub fn new(quit_allowed: bool) -> Self {
        Self::with_clock(quit_allowed, Arc::new(MonotonicClock))
    }

    /// Create a queue reading due times from `clock`.
    #[must_use]
    pub fn with_clock(quit_allowed: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                messages: MessageList::new(),
                idle_handlers: Vec::new(),
                quitting: false,
                wake_pending: false,
            }),
            wake: Condvar::new(),
            quit_allowed,
            clock,
        }
    }

    /// Clock used for due times.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current reading of the queue's clock.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.uptime_ms()
    }

    /// Whether a quit message may ever be accepted.
    #[must_use]
    pub const fn quit_allowed(&self) -> bool {
        self.quit_allowed
    }

    /// Whether a quit message has been accepted.
    #[must_use]
    pub fn is_quitting(&self) -> bool {
        self.state.lock().quitting
    }

    /// Number of pending messages, the quit sentinel included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// `true` when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().messages.is_empty()
    }

    /// Schedule `message` to become due at `when` (0 means as soon as possible).
    ///
    /// A new head wakes the parked consumer. Accepting the quit sentinel latches
    /// the queue closed; already pending messages stay poppable.
    ///
    /// # Errors
    ///
    /// - `LoopError::AlreadyScheduled` if the message still carries a due time
    /// - `LoopError::QuitNotAllowed` for a quit message on a queue that may not quit
    /// - `LoopError::QueueClosed` once the queue is quitting (logged, not fatal)
    pub fn enqueue(&self, mut message: Message, when: u64) -> Result<(), LoopError> {
        if let Some(scheduled) = message.when() {
            return Err(LoopError::AlreadyScheduled { when: scheduled });
        }
        if message.is_quit() && !self.quit_allowed {
            return Err(LoopError::QuitNotAllowed);
        }

        let mut state = self.state.lock();
        if state.quitting {
            let err = LoopError::QueueClosed(message.target_label());
            warn!(what = message.what, error = %err, "dropping message for quitting queue");
            return Err(err);
        }
        if message.is_quit() {
            state.quitting = true;
        }

        message.schedule(when);
        trace!(what = message.what, when, "enqueue");
        if state.messages.insert(message) {
            self.wake.notify_one();
        }
        Ok(())
    }

    /// Unlink and return the head message if it is due at `now`. Never blocks.
    pub fn pop_due(&self, now: u64) -> Option<Message> {
        self.state.lock().messages.pop_due(now)
    }

    /// Remove every pending message matching `predicate`.
    ///
    /// With `dry_run` the queue is left untouched and the scan stops at the first
    /// match. Returns whether anything matched.
    pub fn remove_matching<F>(&self, predicate: F, dry_run: bool) -> bool
    where
        F: FnMut(&Message) -> bool,
    {
        self.state.lock().messages.remove_where(predicate, dry_run)
    }

    /// Register an idle handler. Safe from any thread.
    pub fn add_idle_handler(&self, handler: Arc<dyn IdleHandler>) {
        self.state.lock().idle_handlers.push(handler);
    }

    /// Unregister an idle handler; a handler that is not registered is ignored.
    pub fn remove_idle_handler(&self, handler: &Arc<dyn IdleHandler>) {
        let mut state = self.state.lock();
        if let Some(pos) = state
            .idle_handlers
            .iter()
            .position(|h| std::ptr::addr_eq(Arc::as_ptr(h), Arc::as_ptr(handler)))
        {
            state.idle_handlers.remove(pos);
        }
    }

    /// Number of registered idle handlers.
    #[must_use]
    pub fn idle_handler_count(&self) -> usize {
        self.state.lock().idle_handlers.len()
    }

    /// Release a parked consumer without queueing a message.
    ///
    /// If the consumer is not parked yet, its next park returns immediately.
    pub fn wake(&self) {
        let mut state = self.state.lock();
        state.wake_pending = true;
        self.wake.notify_one();
    }

    /// Snapshot of pending messages in dispatch order.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingMessage> {
        self.state
            .lock()
            .messages
            .iter()
            .map(|m| PendingMessage {
                when: m.due(),
                what: m.what,
                target: m.target_label(),
                has_callback: m.callback().is_some(),
            })
            .collect()
    }

    /// Pop the due head or, when `want_idle` is set and nothing is due, hand
    /// back the idle handlers to run, all under one lock acquisition.
    pub(crate) fn fetch(&self, now: u64, want_idle: bool) -> Fetch {
        let mut state = self.state.lock();
        if let Some(message) = state.messages.pop_due(now) {
            return Fetch::Ready(message);
        }
        if want_idle && !state.idle_handlers.is_empty() {
            return Fetch::Idle(state.idle_handlers.clone());
        }
        Fetch::Empty
    }

    /// Block until the head may be due, a new head arrives or [`wake`](Self::wake)
    /// is called. The timeout is recomputed from the head on every entry.
    pub(crate) fn park(&self) {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.wake_pending) {
            return;
        }
        let now = self.clock.uptime_ms();
        match state.messages.head_due() {
            Some(when) if when <= now => return,
            Some(when) => {
                let _ = self.wake.wait_for(&mut state, Duration::from_millis(when - now));
            }
            None => self.wake.wait(&mut state),
        }
        state.wake_pending = false;
    }

    /// Drop everything still pending; used once the loop has terminated.
    pub(crate) fn abandon_pending(&self) -> usize {
        // Dropped outside the lock.
        let abandoned = std::mem::take(&mut self.state.lock().messages);
        abandoned.len()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MessageQueue")
            .field("pending", &state.messages.len())
            .field("idle_handlers", &state.idle_handlers.len())
            .field("quitting", &state.quitting)
            .field("quit_allowed", &self.quit_allowed)
            .finish()
    }
}
