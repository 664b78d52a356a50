//! Work items carried by a [`MessageQueue`](crate::core::MessageQueue).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::error::AppResult;

/// Opaque shared object attached to a message. Matched by identity.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Runnable attached to a message in place of a `what` code. Matched by identity.
pub type Callback = Arc<dyn Fn() -> AppResult<()> + Send + Sync>;

/// Capability to execute a message on the looper thread.
pub trait MessageTarget: Send + Sync {
    /// Execute `message`. Called synchronously on the owning looper's thread.
    ///
    /// # Errors
    ///
    /// Any error is logged by the pump and counted; the loop keeps running.
    fn dispatch(&self, message: &Message) -> AppResult<()>;

    /// Short label used in logs and dumps.
    fn describe(&self) -> String {
        "target".to_string()
    }
}

/// What a message does when it reaches the head of the queue.
#[derive(Clone)]
pub enum WorkKind {
    /// Deliver the message to its target.
    Normal(Arc<dyn MessageTarget>),
    /// Terminate the loop that pops it.
    Quit,
}

impl fmt::Debug for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal(target) => write!(f, "Normal({})", target.describe()),
            Self::Quit => write!(f, "Quit"),
        }
    }
}

/// A unit of deferred work.
///
/// `when` is `None` until the message is enqueued; a message that still carries
/// a due time is rejected by `enqueue` until it is [`recycle`](Self::recycle)d.
pub struct Message {
    /// User-defined message code.
    pub what: i32,
    /// First integer argument.
    pub arg1: i32,
    /// Second integer argument.
    pub arg2: i32,
    obj: Option<Payload>,
    callback: Option<Callback>,
    kind: WorkKind,
    when: Option<u64>,
}

impl Message {
    /// Create a message for `target` with code `what`.
    pub fn new(target: Arc<dyn MessageTarget>, what: i32) -> Self {
        Self {
            what,
            arg1: 0,
            arg2: 0,
            obj: None,
            callback: None,
            kind: WorkKind::Normal(target),
            when: None,
        }
    }

    /// Create the quit sentinel.
    #[must_use]
    pub const fn quit() -> Self {
        Self {
            what: 0,
            arg1: 0,
            arg2: 0,
            obj: None,
            callback: None,
            kind: WorkKind::Quit,
            when: None,
        }
    }

    /// Set both integer arguments.
    #[must_use]
    pub fn with_args(mut self, arg1: i32, arg2: i32) -> Self {
        self.arg1 = arg1;
        self.arg2 = arg2;
        self
    }

    /// Attach an opaque object.
    #[must_use]
    pub fn with_obj(mut self, obj: Payload) -> Self {
        self.obj = Some(obj);
        self
    }

    /// Attach a callback run instead of the target's message handling.
    #[must_use]
    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Attached object, if any.
    #[must_use]
    pub const fn obj(&self) -> Option<&Payload> {
        self.obj.as_ref()
    }

    /// Attached object downcast to `T`.
    #[must_use]
    pub fn obj_as<T: Any>(&self) -> Option<&T> {
        self.obj.as_ref().and_then(|obj| obj.downcast_ref::<T>())
    }

    /// Attached callback, if any.
    #[must_use]
    pub const fn callback(&self) -> Option<&Callback> {
        self.callback.as_ref()
    }

    /// Dispatch kind.
    #[must_use]
    pub const fn kind(&self) -> &WorkKind {
        &self.kind
    }

    /// `true` for the quit sentinel.
    #[must_use]
    pub const fn is_quit(&self) -> bool {
        matches!(self.kind, WorkKind::Quit)
    }

    /// Due time assigned on enqueue.
    #[must_use]
    pub const fn when(&self) -> Option<u64> {
        self.when
    }

    /// Label of the target, `"quit"` for the sentinel.
    #[must_use]
    pub fn target_label(&self) -> String {
        match &self.kind {
            WorkKind::Normal(target) => target.describe(),
            WorkKind::Quit => "quit".to_string(),
        }
    }

    /// `true` if the message is addressed to exactly `target`.
    #[must_use]
    pub fn targets(&self, target: &Arc<dyn MessageTarget>) -> bool {
        match &self.kind {
            WorkKind::Normal(own) => std::ptr::addr_eq(Arc::as_ptr(own), Arc::as_ptr(target)),
            WorkKind::Quit => false,
        }
    }

    /// `true` if `obj` is `None` or is the very object attached to this message.
    #[must_use]
    pub fn obj_matches(&self, obj: Option<&Payload>) -> bool {
        match (obj, &self.obj) {
            (None, _) => true,
            (Some(wanted), Some(own)) => std::ptr::addr_eq(Arc::as_ptr(own), Arc::as_ptr(wanted)),
            (Some(_), None) => false,
        }
    }

    /// `true` if the attached callback is exactly `callback`.
    #[must_use]
    pub fn callback_is(&self, callback: &Callback) -> bool {
        self.callback
            .as_ref()
            .is_some_and(|own| std::ptr::addr_eq(Arc::as_ptr(own), Arc::as_ptr(callback)))
    }

    /// Clear scheduling state and contents so the message can be sent again.
    pub fn recycle(&mut self) {
        self.what = 0;
        self.arg1 = 0;
        self.arg2 = 0;
        self.obj = None;
        self.callback = None;
        self.when = None;
    }

    pub(crate) fn retarget(&mut self, target: Arc<dyn MessageTarget>) {
        self.kind = WorkKind::Normal(target);
    }

    pub(crate) fn schedule(&mut self, when: u64) {
        self.when = Some(when);
    }

    /// Due time of a message that is linked into a queue.
    pub(crate) fn due(&self) -> u64 {
        self.when.unwrap_or(0)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("what", &self.what)
            .field("arg1", &self.arg1)
            .field("arg2", &self.arg2)
            .field("when", &self.when)
            .field("kind", &self.kind)
            .field("has_obj", &self.obj.is_some())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
