//! Error types for queue and loop operations.

use std::thread::ThreadId;

use thiserror::Error;

/// Errors produced by message queues, loopers and handler threads.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The message already carries a due time and may still be linked into a queue.
    #[error("message is already scheduled at {when}ms")]
    AlreadyScheduled {
        /// Due time the message already carries.
        when: u64,
    },
    /// A quit message was sent to a looper that must never quit.
    #[error("quit is not allowed on this looper")]
    QuitNotAllowed,
    /// The queue accepted a quit message and rejects new work.
    #[error("queue closed: {0} sent a message to a quitting looper")]
    QueueClosed(String),
    /// A dispatch target returned an error or panicked.
    #[error("dispatch to {target} failed: {reason}")]
    DispatchFailed {
        /// Description of the failing target.
        target: String,
        /// Error or panic message.
        reason: String,
    },
    /// An idle handler returned an error or panicked.
    #[error("idle handler failed: {0}")]
    IdleHandlerFailed(String),
    /// The current thread already owns a looper.
    #[error("only one looper may be prepared per thread")]
    AlreadyPrepared,
    /// The process-wide main looper was already set.
    #[error("main looper already initialized")]
    MainAlreadyInitialized,
    /// A loop was run from a thread that does not own it.
    #[error("looper is owned by thread {owner:?}")]
    WrongThread {
        /// Thread that prepared the looper.
        owner: ThreadId,
    },
    /// The loop is already being pumped.
    #[error("looper is already running")]
    AlreadyRunning,
    /// The loop processed its quit message; it cannot be restarted.
    #[error("looper has terminated")]
    Terminated,
    /// Submitted work was dropped before it could run.
    #[error("work abandoned before dispatch")]
    Abandoned,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The OS refused to spawn a handler thread.
    #[error("failed to spawn handler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl LoopError {
    /// Programmer errors that must surface to the caller rather than be logged and absorbed.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AlreadyScheduled { .. }
                | Self::QuitNotAllowed
                | Self::AlreadyPrepared
                | Self::MainAlreadyInitialized
                | Self::WrongThread { .. }
        )
    }
}

/// Application-facing result used by targets, callbacks and idle handlers.
pub type AppResult<T> = Result<T, anyhow::Error>;
