//! Monotonic clock sources used to stamp and wait for due times.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// First reading of [`uptime_ms`]. Time 0 is reserved for front-of-queue sends.
pub const UPTIME_BASE_MS: u64 = 1;

/// Milliseconds elapsed since the process-wide clock origin, plus [`UPTIME_BASE_MS`].
///
/// The origin is fixed on first use, so values are comparable across threads.
#[must_use]
pub fn uptime_ms() -> u64 {
    let origin = ORIGIN.get_or_init(Instant::now);
    u64::try_from(origin.elapsed().as_millis())
        .unwrap_or(u64::MAX)
        .saturating_add(UPTIME_BASE_MS)
}

/// Source of monotonic "now" readings in milliseconds.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current uptime in milliseconds. Must never go backwards.
    fn uptime_ms(&self) -> u64;
}

/// Clock backed by [`Instant`], shared by every looper in the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn uptime_ms(&self) -> u64 {
        uptime_ms()
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start` milliseconds.
    #[must_use]
    pub const fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock forward and return the new reading.
    pub fn advance(&self, ms: u64) -> u64 {
        self.now.fetch_add(ms, Ordering::AcqRel) + ms
    }

    /// Jump to `ms`; ignored if it would move the clock backwards.
    pub fn set(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn uptime_ms(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}
