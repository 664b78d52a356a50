//! Per-thread message loop context.
//!
//! A thread prepares at most one [`Looper`], hands the returned `Arc` to whoever
//! needs to post work, then calls [`Looper::run`] to pump messages until a quit
//! message is popped.
//!
//! ```rust,ignore
//! use prometheus_looper::core::{Handler, Looper};
//!
//! let looper = Looper::prepare()?;
//! let handler = Handler::new(&looper, |msg| {
//!     println!("got {}", msg.what);
//!     Ok(())
//! });
//! handler.send_empty_message(1)?;
//! looper.quit()?;
//! let stats = looper.run()?;
//! assert_eq!(stats.dispatched, 1);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::LoopError;
use super::message::Message;
use super::message_queue::{MessageQueue, PendingMessage};
use super::pump::LoopPump;
use super::registry::{self, MainRegistry};
use crate::config::LooperConfig;
use crate::util::clock::{Clock, MonotonicClock};
use crate::util::telemetry::TracingPrinter;

thread_local! {
    static CURRENT: RefCell<Option<Arc<Looper>>> = const { RefCell::new(None) };
}

/// Where a looper's pump currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpState {
    /// Prepared, [`Looper::run`] not called yet.
    Prepared,
    /// Blocked (or about to block) until the head is due.
    Waiting,
    /// Running idle handlers.
    Idle,
    /// Executing a popped message.
    Dispatching,
    /// The quit message was popped. Final.
    Terminated,
}

impl PumpState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Prepared,
            1 => Self::Waiting,
            2 => Self::Idle,
            3 => Self::Dispatching,
            _ => Self::Terminated,
        }
    }
}

/// Sink for the begin/end lines emitted around every dispatch.
pub trait MessagePrinter: Send + Sync {
    /// Record one line.
    fn println(&self, line: &str);
}

impl<F> MessagePrinter for F
where
    F: Fn(&str) + Send + Sync,
{
    fn println(&self, line: &str) {
        self(line);
    }
}

/// Counters describing what a looper has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    /// Messages handed to their target.
    pub dispatched: u64,
    /// Dispatches that returned an error or panicked.
    pub dispatch_failures: u64,
    /// Individual idle-handler invocations.
    pub idle_invocations: u64,
    /// Idle-handler invocations that returned an error or panicked.
    pub idle_failures: u64,
    /// Dispatches slower than the configured threshold.
    pub slow_dispatches: u64,
}

#[derive(Debug, Default)]
pub(crate) struct LoopCounters {
    pub dispatched: AtomicU64,
    pub dispatch_failures: AtomicU64,
    pub idle_invocations: AtomicU64,
    pub idle_failures: AtomicU64,
    pub slow_dispatches: AtomicU64,
}

impl LoopCounters {
    pub fn snapshot(&self) -> LoopStats {
        LoopStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            idle_invocations: self.idle_invocations.load(Ordering::Relaxed),
            idle_failures: self.idle_failures.load(Ordering::Relaxed),
            slow_dispatches: self.slow_dispatches.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a looper, for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LooperSnapshot {
    /// Unique looper id.
    pub id: Uuid,
    /// Configured name.
    pub name: String,
    /// Owning thread, debug-formatted.
    pub thread: String,
    /// Pump state.
    pub state: PumpState,
    /// Whether the queue accepted a quit message.
    pub quitting: bool,
    /// Whether the queue may ever quit.
    pub quit_allowed: bool,
    /// Pending messages in dispatch order.
    pub pending: Vec<PendingMessage>,
    /// Counters.
    pub stats: LoopStats,
}

/// A thread's message loop: one queue, one owning thread, one pump.
pub struct Looper {
    id: Uuid,
    config: LooperConfig,
    queue: Arc<MessageQueue>,
    thread: ThreadId,
    state: AtomicU8,
    running: AtomicBool,
    printer: Mutex<Option<Arc<dyn MessagePrinter>>>,
    pub(crate) counters: LoopCounters,
}

impl Looper {
    /// Prepare a looper for the current thread, named after the thread.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::AlreadyPrepared` if this thread already has a looper.
    pub fn prepare() -> Result<Arc<Self>, LoopError> {
        let name = thread::current().name().unwrap_or("looper").to_string();
        Self::prepare_with(&LooperConfig::new(name))
    }

    /// Prepare a looper for the current thread from `config`.
    ///
    /// # Errors
    ///
    /// - `LoopError::InvalidConfig` if the configuration does not validate
    /// - `LoopError::AlreadyPrepared` if this thread already has a looper
    pub fn prepare_with(config: &LooperConfig) -> Result<Arc<Self>, LoopError> {
        Self::prepare_with_clock(config, Arc::new(MonotonicClock))
    }

    /// Prepare a looper for the current thread whose queue reads `clock`.
    ///
    /// # Errors
    ///
    /// Same as [`prepare_with`](Self::prepare_with).
    pub fn prepare_with_clock(
        config: &LooperConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, LoopError> {
        config.validate().map_err(LoopError::InvalidConfig)?;

        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            if current.is_some() {
                return Err(LoopError::AlreadyPrepared);
            }

            let printer: Option<Arc<dyn MessagePrinter>> = if config.message_logging {
                Some(Arc::new(TracingPrinter::new(config.name.clone())))
            } else {
                None
            };
            let looper = Arc::new(Self {
                id: Uuid::new_v4(),
                config: config.clone(),
                queue: Arc::new(MessageQueue::with_clock(config.quit_allowed, clock)),
                thread: thread::current().id(),
                state: AtomicU8::new(PumpState::Prepared as u8),
                running: AtomicBool::new(false),
                printer: Mutex::new(printer),
                counters: LoopCounters::default(),
            });

            debug!(looper = %looper.config.name, id = %looper.id, "looper prepared");
            *current = Some(Arc::clone(&looper));
            Ok(looper)
        })
    }

    /// Prepare the current thread's looper as the process-wide main looper.
    ///
    /// The main looper never accepts a quit message.
    ///
    /// # Errors
    ///
    /// - `LoopError::MainAlreadyInitialized` if a main looper exists
    /// - `LoopError::AlreadyPrepared` if this thread already has a looper
    pub fn prepare_main() -> Result<Arc<Self>, LoopError> {
        Self::prepare_main_in(registry::global())
    }

    /// [`prepare_main`](Self::prepare_main) against an explicit registry.
    ///
    /// # Errors
    ///
    /// Same as [`prepare_main`](Self::prepare_main).
    pub fn prepare_main_in(registry: &MainRegistry) -> Result<Arc<Self>, LoopError> {
        if registry.is_initialized() {
            return Err(LoopError::MainAlreadyInitialized);
        }
        let looper = Self::prepare_with(&LooperConfig::new("main").with_quit_allowed(false))?;
        if let Err(err) = registry.init(Arc::clone(&looper)) {
            CURRENT.with(|current| current.borrow_mut().take());
            return Err(err);
        }
        info!(id = %looper.id, "main looper initialized");
        Ok(looper)
    }

    /// The process-wide main looper, if one was prepared.
    #[must_use]
    pub fn main_looper() -> Option<Arc<Self>> {
        registry::global().get()
    }

    /// The looper prepared on the current thread, if any.
    #[must_use]
    pub fn my_looper() -> Option<Arc<Self>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Pump messages on the owning thread until the quit message is popped.
    ///
    /// Messages still pending when the quit message is popped are dropped
    /// without running.
    ///
    /// # Errors
    ///
    /// - `LoopError::WrongThread` when called off the owning thread
    /// - `LoopError::Terminated` when the loop already finished
    /// - `LoopError::AlreadyRunning` when called re-entrantly from a dispatch
    pub fn run(&self) -> Result<LoopStats, LoopError> {
        if thread::current().id() != self.thread {
            return Err(LoopError::WrongThread { owner: self.thread });
        }
        if self.state() == PumpState::Terminated {
            return Err(LoopError::Terminated);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(LoopError::AlreadyRunning);
        }

        info!(looper = %self.config.name, id = %self.id, "loop starting");
        LoopPump::new(self).run();
        self.running.store(false, Ordering::Release);

        let stats = self.stats();
        info!(
            looper = %self.config.name,
            dispatched = stats.dispatched,
            dispatch_failures = stats.dispatch_failures,
            "loop terminated"
        );
        Ok(stats)
    }

    /// Ask the loop to stop by queueing the quit message at time 0.
    ///
    /// Returns `Ok(false)` if the loop is already quitting.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::QuitNotAllowed` for the main looper.
    pub fn quit(&self) -> Result<bool, LoopError> {
        match self.queue.enqueue(Message::quit(), 0) {
            Ok(()) => Ok(true),
            Err(LoopError::QueueClosed(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// The looper's queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Unique id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Configured name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Configuration the looper was prepared with.
    #[must_use]
    pub const fn config(&self) -> &LooperConfig {
        &self.config
    }

    /// Id of the owning thread.
    #[must_use]
    pub const fn thread_id(&self) -> ThreadId {
        self.thread
    }

    /// Whether the caller runs on the owning thread.
    #[must_use]
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread
    }

    /// Current pump state.
    #[must_use]
    pub fn state(&self) -> PumpState {
        PumpState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Install or clear the dispatch printer.
    pub fn set_message_logging(&self, printer: Option<Arc<dyn MessagePrinter>>) {
        *self.printer.lock() = printer;
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> LoopStats {
        self.counters.snapshot()
    }

    /// Diagnostic snapshot including pending messages.
    #[must_use]
    pub fn dump(&self) -> LooperSnapshot {
        LooperSnapshot {
            id: self.id,
            name: self.config.name.clone(),
            thread: format!("{:?}", self.thread),
            state: self.state(),
            quitting: self.queue.is_quitting(),
            quit_allowed: self.queue.quit_allowed(),
            pending: self.queue.pending(),
            stats: self.stats(),
        }
    }

    /// [`dump`](Self::dump) rendered as pretty JSON.
    ///
    /// # Errors
    ///
    /// Propagates serialization failures.
    pub fn dump_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.dump())
    }

    pub(crate) fn set_state(&self, state: PumpState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn printer(&self) -> Option<Arc<dyn MessagePrinter>> {
        self.printer.lock().clone()
    }
}

impl fmt::Debug for Looper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Looper")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("thread", &self.thread)
            .field("state", &self.state())
            .field("queue", &self.queue)
            .finish()
    }
}
