//! Configuration models for loopers and handler threads.

pub mod looper;

pub use looper::{
    HandlerThreadConfig, LoopSystemConfig, LooperConfig, CONFIG_ENV_VAR, DEFAULT_STACK_SIZE,
};
