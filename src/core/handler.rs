//! User-facing dispatch target bound to one looper's queue.
//!
//! A [`Handler`] builds messages addressed to itself, schedules them, posts
//! callbacks and cancels pending work. It is cheap to clone and may be used
//! from any thread; dispatch always happens on the looper's thread.

use std::fmt;
use std::sync::Arc;

use super::error::{AppResult, LoopError};
use super::looper::Looper;
use super::message::{Callback, Message, MessageTarget, Payload};
use super::message_queue::MessageQueue;

type MessageFn = dyn Fn(&Message) -> AppResult<()> + Send + Sync;

struct HandlerCore {
    name: String,
    handle: Option<Box<MessageFn>>,
}

impl MessageTarget for HandlerCore {
    fn dispatch(&self, message: &Message) -> AppResult<()> {
        if let Some(callback) = message.callback() {
            return callback();
        }
        match &self.handle {
            Some(handle) => handle(message),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Sends messages and callbacks to a looper.
#[derive(Clone)]
pub struct Handler {
    queue: Arc<MessageQueue>,
    target: Arc<dyn MessageTarget>,
}

impl Handler {
    /// Handler on `looper` whose messages are passed to `handle`.
    pub fn new<F>(looper: &Looper, handle: F) -> Self
    where
        F: Fn(&Message) -> AppResult<()> + Send + Sync + 'static,
    {
        Self::named(looper, "handler", handle)
    }

    /// Like [`new`](Self::new) with a name shown in logs and dumps.
    pub fn named<F>(looper: &Looper, name: impl Into<String>, handle: F) -> Self
    where
        F: Fn(&Message) -> AppResult<()> + Send + Sync + 'static,
    {
        Self::with_core(
            Arc::clone(looper.queue()),
            HandlerCore {
                name: name.into(),
                handle: Some(Box::new(handle)),
            },
        )
    }

    /// Handler that only runs posted callbacks; plain messages are ignored.
    #[must_use]
    pub fn callbacks_only(looper: &Looper) -> Self {
        Self::with_core(
            Arc::clone(looper.queue()),
            HandlerCore {
                name: "callbacks".to_string(),
                handle: None,
            },
        )
    }

    /// Handler delivering to an arbitrary target through `queue`.
    ///
    /// Callbacks attached to messages reach `target` unchanged; running them is
    /// up to the target.
    #[must_use]
    pub const fn from_parts(queue: Arc<MessageQueue>, target: Arc<dyn MessageTarget>) -> Self {
        Self { queue, target }
    }

    fn with_core(queue: Arc<MessageQueue>, core: HandlerCore) -> Self {
        Self {
            queue,
            target: Arc::new(core),
        }
    }

    /// Queue this handler sends to.
    #[must_use]
    pub const fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Dispatch target identity used for matching.
    #[must_use]
    pub const fn target(&self) -> &Arc<dyn MessageTarget> {
        &self.target
    }

    /// Name shown in logs.
    #[must_use]
    pub fn name(&self) -> String {
        self.target.describe()
    }

    /// Fresh message addressed to this handler.
    #[must_use]
    pub fn obtain_message(&self, what: i32) -> Message {
        Message::new(Arc::clone(&self.target), what)
    }

    /// Queue `message` to run as soon as possible after pending due messages.
    ///
    /// Returns `Ok(false)` if the looper is quitting.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::AlreadyScheduled` if the message was already sent.
    pub fn send_message(&self, message: Message) -> Result<bool, LoopError> {
        self.send_message_delayed(message, 0)
    }

    /// Queue an empty message carrying only `what`.
    ///
    /// # Errors
    ///
    /// Same as [`send_message`](Self::send_message).
    pub fn send_empty_message(&self, what: i32) -> Result<bool, LoopError> {
        self.send_message(self.obtain_message(what))
    }

    /// Queue `message` to run `delay_ms` from now.
    ///
    /// # Errors
    ///
    /// Same as [`send_message`](Self::send_message).
    pub fn send_message_delayed(&self, message: Message, delay_ms: u64) -> Result<bool, LoopError> {
        let when = self.queue.now().saturating_add(delay_ms);
        self.send_message_at_time(message, when)
    }

    /// Queue `message` to run at absolute uptime `uptime_ms`.
    ///
    /// # Errors
    ///
    /// Same as [`send_message`](Self::send_message).
    pub fn send_message_at_time(
        &self,
        message: Message,
        uptime_ms: u64,
    ) -> Result<bool, LoopError> {
        self.enqueue(message, uptime_ms)
    }

    /// Queue `message` ahead of everything scheduled after time 0.
    ///
    /// # Errors
    ///
    /// Same as [`send_message`](Self::send_message).
    pub fn send_message_at_front_of_queue(&self, message: Message) -> Result<bool, LoopError> {
        self.enqueue(message, 0)
    }

    /// Run `f` on the looper thread as soon as possible.
    ///
    /// # Errors
    ///
    /// Same as [`send_message`](Self::send_message).
    pub fn post<F>(&self, f: F) -> Result<bool, LoopError>
    where
        F: Fn() -> AppResult<()> + Send + Sync + 'static,
    {
        self.post_delayed(f, 0)
    }

    /// Run `f` on the looper thread `delay_ms` from now.
    ///
    /// # Errors
    ///
    /// Same as [`send_message`](Self::send_message).
    pub fn post_delayed<F>(&self, f: F, delay_ms: u64) -> Result<bool, LoopError>
    where
        F: Fn() -> AppResult<()> + Send + Sync + 'static,
    {
        self.post_callback_delayed(&(Arc::new(f) as Callback), delay_ms)
    }

    /// Run `f` on the looper thread at absolute uptime `uptime_ms`.
    ///
    /// # Errors
    ///
    /// Same as [`send_message`](Self::send_message).
    pub fn post_at_time<F>(&self, f: F, uptime_ms: u64) -> Result<bool, LoopError>
    where
        F: Fn() -> AppResult<()> + Send + Sync + 'static,
    {
        let message = self.obtain_message(0).with_callback(Arc::new(f));
        self.send_message_at_time(message, uptime_ms)
    }

    /// Post a shared callback so it can later be cancelled with
    /// [`remove_callbacks`](Self::remove_callbacks).
    ///
    /// # Errors
    ///
    /// Same as [`send_message`](Self::send_message).
    pub fn post_callback_delayed(
        &self,
        callback: &Callback,
        delay_ms: u64,
    ) -> Result<bool, LoopError> {
        let message = self.obtain_message(0).with_callback(Arc::clone(callback));
        self.send_message_delayed(message, delay_ms)
    }

    /// Remove pending messages with code `what` and, if given, object `obj`.
    pub fn remove_messages(&self, what: i32, obj: Option<&Payload>) {
        self.queue.remove_matching(
            |m| m.targets(&self.target) && m.what == what && m.obj_matches(obj),
            false,
        );
    }

    /// Whether a message with code `what` and, if given, object `obj` is pending.
    #[must_use]
    pub fn has_messages(&self, what: i32, obj: Option<&Payload>) -> bool {
        self.queue.remove_matching(
            |m| m.targets(&self.target) && m.what == what && m.obj_matches(obj),
            true,
        )
    }

    /// Remove pending posts of exactly `callback` and, if given, object `obj`.
    pub fn remove_callbacks(&self, callback: &Callback, obj: Option<&Payload>) {
        self.queue.remove_matching(
            |m| m.targets(&self.target) && m.callback_is(callback) && m.obj_matches(obj),
            false,
        );
    }

    /// Remove every pending message and callback of this handler; with `obj`,
    /// only those carrying that object.
    pub fn remove_callbacks_and_messages(&self, obj: Option<&Payload>) {
        self.queue
            .remove_matching(|m| m.targets(&self.target) && m.obj_matches(obj), false);
    }

    fn enqueue(&self, mut message: Message, when: u64) -> Result<bool, LoopError> {
        message.retarget(Arc::clone(&self.target));
        match self.queue.enqueue(message, when) {
            Ok(()) => Ok(true),
            Err(LoopError::QueueClosed(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.target.describe())
            .field("queue", &self.queue)
            .finish()
    }
}
