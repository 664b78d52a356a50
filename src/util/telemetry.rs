//! Telemetry helpers for structured logging and tracing.

use tracing::info;

use crate::core::MessagePrinter;

/// Directive used when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVE: &str = "prometheus_looper=info";

/// Initialize tracing/telemetry. Users can install their own subscriber; this
/// helper installs a default env-based subscriber if none is set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_DIRECTIVE));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// [`MessagePrinter`] that forwards dispatch lines to `tracing` at `info`.
#[derive(Debug, Clone)]
pub struct TracingPrinter {
    looper: String,
}

impl TracingPrinter {
    /// Printer tagging every line with `looper`.
    pub fn new(looper: impl Into<String>) -> Self {
        Self {
            looper: looper.into(),
        }
    }
}

impl MessagePrinter for TracingPrinter {
    fn println(&self, line: &str) {
        info!(target: "prometheus_looper::dispatch", looper = %self.looper, "{line}");
    }
}
