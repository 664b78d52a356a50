//! Builders to start handler threads from configuration.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::config::LoopSystemConfig;
use crate::core::LoopError;
use crate::runtime::HandlerThread;

/// Validate `cfg` and spawn one [`HandlerThread`] per configured entry.
///
/// Threads already started are quit and joined if a later one fails to spawn.
///
/// # Errors
///
/// - `LoopError::InvalidConfig` if the configuration does not validate
/// - `LoopError::Spawn` if a thread cannot be started
pub fn build_handler_threads(
    cfg: &LoopSystemConfig,
) -> Result<HashMap<String, HandlerThread>, LoopError> {
    cfg.validate()
        .map_err(|e| LoopError::InvalidConfig(format!("config invalid: {e}")))?;

    let mut threads = HashMap::with_capacity(cfg.threads.len());
    for (name, thread_cfg) in &cfg.threads {
        match HandlerThread::spawn(thread_cfg) {
            Ok(thread) => {
                threads.insert(name.clone(), thread);
            }
            Err(err) => {
                shutdown(threads);
                return Err(err);
            }
        }
    }

    info!(count = threads.len(), "handler threads started");
    Ok(threads)
}

/// Quit every thread, then join them all.
pub fn shutdown(threads: HashMap<String, HandlerThread>) {
    for thread in threads.values() {
        thread.quit();
    }
    for (name, thread) in threads {
        if let Err(err) = thread.join() {
            warn!(thread = %name, error = %err, "handler thread ended with error");
        }
    }
}
