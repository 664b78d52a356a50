//! Message loop primitives: messages, the timed queue, loopers and handlers.

pub mod error;
pub mod handler;
pub mod looper;
pub mod message;
pub mod message_queue;
mod pump;
pub mod registry;

pub use error::{AppResult, LoopError};
pub use handler::Handler;
pub use looper::{LoopStats, Looper, LooperSnapshot, MessagePrinter, PumpState};
pub use message::{Callback, Message, MessageTarget, Payload, WorkKind};
pub use message_queue::{IdleHandler, MessageQueue, PendingMessage};
pub use registry::MainRegistry;
