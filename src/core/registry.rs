//! Process-wide registry for the main looper.
//!
//! The registry is written exactly once. Later attempts fail with
//! [`LoopError::MainAlreadyInitialized`] and leave the first looper in place.

use std::sync::{Arc, OnceLock};

use super::error::LoopError;
use super::looper::Looper;

static MAIN: MainRegistry = MainRegistry::new();

/// Single-assignment slot holding the designated main looper.
#[derive(Debug, Default)]
pub struct MainRegistry {
    slot: OnceLock<Arc<Looper>>,
}

impl MainRegistry {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// Record `looper` as the main looper.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::MainAlreadyInitialized` if a looper was already recorded.
    pub fn init(&self, looper: Arc<Looper>) -> Result<(), LoopError> {
        self.slot
            .set(looper)
            .map_err(|_| LoopError::MainAlreadyInitialized)
    }

    /// The main looper, or `None` before [`init`](Self::init).
    #[must_use]
    pub fn get(&self) -> Option<Arc<Looper>> {
        self.slot.get().cloned()
    }

    /// Whether a main looper has been recorded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// The process-wide registry used by [`Looper::prepare_main`].
#[must_use]
pub fn global() -> &'static MainRegistry {
    &MAIN
}
