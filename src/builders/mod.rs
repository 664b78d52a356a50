//! Builders to construct loop components from configuration.

pub mod looper_builder;

pub use looper_builder::{build_handler_threads, shutdown};
