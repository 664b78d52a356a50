//! Clock sources and logging helpers.

pub mod clock;
pub mod telemetry;

pub use clock::*;
pub use telemetry::*;
