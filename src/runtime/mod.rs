//! Thread and async runtime adapters.

pub mod handler_thread;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_bridge;

pub use handler_thread::HandlerThread;
#[cfg(feature = "tokio-runtime")]
pub use tokio_bridge::run_on;
