//! # Prometheus Looper
//!
//! Single-threaded message loops with timed work queues.
//!
//! Each worker thread owns one [`Looper`](core::Looper): a time-ordered
//! [`MessageQueue`](core::MessageQueue) plus a pump that blocks until the next
//! message is due, dispatches it on the owning thread and runs idle handlers
//! when nothing is ready. Any thread may post work through a
//! [`Handler`](core::Handler); only the owner executes it.
//!
//! ## Key Features
//!
//! - **Timed queue**: messages ordered by due time, FIFO among equal times
//! - **No polling**: the pump parks on a `parking_lot::Condvar` until the head
//!   is due or a new head arrives
//! - **Idle handlers**: one-shot or persistent callbacks run before blocking
//! - **Cancellation**: remove pending messages by code, object or callback identity
//! - **Handler threads**: dedicated OS threads started from JSON configuration
//! - **Async bridge**: await closures run on a looper from tokio (`tokio-runtime`)
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use prometheus_looper::config::HandlerThreadConfig;
//! use prometheus_looper::runtime::HandlerThread;
//!
//! let thread = HandlerThread::spawn(&HandlerThreadConfig::new("io"))?;
//! let handler = thread.handler(|msg| {
//!     tracing::info!(what = msg.what, "handled");
//!     Ok(())
//! });
//!
//! handler.send_empty_message(1)?;
//! handler.send_message_delayed(handler.obtain_message(2), 100)?;
//! handler.post(|| Ok(()))?;
//!
//! thread.quit();
//! let stats = thread.join()?;
//! ```
//!
//! For complete scenarios, see `tests/looper_test.rs`.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Messages, queues, loopers and handlers.
pub mod core;
/// Configuration models for loopers and handler threads.
pub mod config;
/// Builders to start handler threads from configuration.
pub mod builders;
/// Storage backing the message queue.
pub mod infra;
/// Handler threads and the async bridge.
pub mod runtime;
/// Shared utilities.
pub mod util;
