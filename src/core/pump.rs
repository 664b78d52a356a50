//! The fetch/dispatch loop run by [`Looper::run`](crate::core::Looper::run).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use super::error::LoopError;
use super::looper::{Looper, MessagePrinter, PumpState};
use super::message::{Message, MessageTarget, WorkKind};
use super::message_queue::{Fetch, IdleHandler};

pub(crate) struct LoopPump<'a> {
    looper: &'a Looper,
    slow_threshold: Option<Duration>,
}

impl<'a> LoopPump<'a> {
    pub(crate) fn new(looper: &'a Looper) -> Self {
        Self {
            looper,
            slow_threshold: looper
                .config()
                .slow_dispatch_threshold_ms
                .map(Duration::from_millis),
        }
    }

    /// Dispatch until the quit sentinel is popped, then drop whatever is left.
    pub(crate) fn run(&self) {
        self.looper.set_state(PumpState::Waiting);
        loop {
            let message = self.next();
            let target = match message.kind() {
                WorkKind::Quit => break,
                WorkKind::Normal(target) => Arc::clone(target),
            };
            self.dispatch(&target, message);
        }

        self.looper.set_state(PumpState::Terminated);
        let abandoned = self.looper.queue().abandon_pending();
        if abandoned > 0 {
            debug!(looper = %self.looper.name(), abandoned, "dropped pending messages on quit");
        }
    }

    /// Block until a message is due.
    ///
    /// Idle handlers run at most once per call: the first time nothing is due
    /// and at least one handler is registered, including handlers added while
    /// the pump was parked.
    fn next(&self) -> Message {
        let queue = self.looper.queue();
        let mut try_idle = true;
        loop {
            match queue.fetch(queue.now(), try_idle) {
                Fetch::Ready(message) => return message,
                Fetch::Idle(handlers) => {
                    try_idle = false;
                    self.looper.set_state(PumpState::Idle);
                    self.run_idle_handlers(handlers);
                    self.looper.set_state(PumpState::Waiting);
                }
                Fetch::Empty => {
                    trace!(looper = %self.looper.name(), "parking");
                    queue.park();
                }
            }
        }
    }

    fn run_idle_handlers(&self, handlers: Vec<Arc<dyn IdleHandler>>) {
        let counters = &self.looper.counters;
        for handler in handlers {
            counters.idle_invocations.fetch_add(1, Ordering::Relaxed);
            let keep = match panic::catch_unwind(AssertUnwindSafe(|| handler.queue_idle())) {
                Ok(Ok(keep)) => keep,
                Ok(Err(e)) => {
                    self.idle_failed(LoopError::IdleHandlerFailed(format!("{e:#}")));
                    false
                }
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    self.idle_failed(LoopError::IdleHandlerFailed(reason));
                    false
                }
            };
            if !keep {
                self.looper.queue().remove_idle_handler(&handler);
            }
        }
    }

    fn idle_failed(&self, err: LoopError) {
        self.looper
            .counters
            .idle_failures
            .fetch_add(1, Ordering::Relaxed);
        error!(looper = %self.looper.name(), error = %err, "idle handler removed");
    }

    fn dispatch(&self, target: &Arc<dyn MessageTarget>, mut message: Message) {
        self.looper.set_state(PumpState::Dispatching);
        let printer = self.looper.printer();
        let label = panic::catch_unwind(AssertUnwindSafe(|| target.describe()))
            .unwrap_or_else(|_| "target".to_string());
        if let Some(printer) = &printer {
            self.print(
                printer.as_ref(),
                &format!(
                    ">>>>> Dispatching to {label} {}: {}",
                    callback_label(&message),
                    message.what
                ),
            );
        }

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| target.dispatch(&message)));
        let elapsed = started.elapsed();

        let counters = &self.looper.counters;
        counters.dispatched.fetch_add(1, Ordering::Relaxed);
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };
        if let Some(reason) = failure {
            counters.dispatch_failures.fetch_add(1, Ordering::Relaxed);
            let err = LoopError::DispatchFailed {
                target: label.clone(),
                reason,
            };
            error!(
                looper = %self.looper.name(),
                what = message.what,
                error = %err,
                "dispatch failed"
            );
        }

        if let Some(threshold) = self.slow_threshold {
            if elapsed > threshold {
                counters.slow_dispatches.fetch_add(1, Ordering::Relaxed);
                warn!(
                    looper = %self.looper.name(),
                    target = %label,
                    what = message.what,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "slow dispatch"
                );
            }
        }

        if let Some(printer) = &printer {
            self.print(
                printer.as_ref(),
                &format!("<<<<< Finished to {label} {}", callback_label(&message)),
            );
        }

        message.recycle();
        self.looper.set_state(PumpState::Waiting);
    }

    fn print(&self, printer: &dyn MessagePrinter, line: &str) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| printer.println(line))) {
            warn!(
                looper = %self.looper.name(),
                reason = %panic_message(payload.as_ref()),
                "message printer panicked"
            );
        }
    }
}

fn callback_label(message: &Message) -> &'static str {
    if message.callback().is_some() {
        "callback"
    } else {
        "message"
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
