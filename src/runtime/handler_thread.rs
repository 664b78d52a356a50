//! Dedicated OS thread running its own looper.
//!
//! The spawned thread prepares a looper, hands it back over a rendezvous
//! channel, runs the optional on-prepared hook and then pumps messages until
//! quit. [`HandlerThread::spawn`] returns only once the looper exists, so the
//! caller can build handlers on it straight away.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::bounded;
use tracing::{debug, info, warn};

use crate::config::HandlerThreadConfig;
use crate::core::{AppResult, Handler, LoopError, LoopStats, Looper, Message};

/// A named thread that owns and runs one looper.
pub struct HandlerThread {
    name: String,
    looper: Arc<Looper>,
    join: Option<JoinHandle<Result<LoopStats, LoopError>>>,
}

impl HandlerThread {
    /// Spawn a thread and wait for its looper to be prepared.
    ///
    /// # Errors
    ///
    /// - `LoopError::InvalidConfig` if `config` does not validate
    /// - `LoopError::Spawn` if the OS thread cannot be created or dies early
    pub fn spawn(config: &HandlerThreadConfig) -> Result<Self, LoopError> {
        Self::spawn_with(config, |_| {})
    }

    /// Like [`spawn`](Self::spawn), running `on_prepared` on the new thread
    /// after the looper exists and before it starts pumping.
    ///
    /// # Errors
    ///
    /// Same as [`spawn`](Self::spawn).
    pub fn spawn_with<F>(config: &HandlerThreadConfig, on_prepared: F) -> Result<Self, LoopError>
    where
        F: FnOnce(&Arc<Looper>) + Send + 'static,
    {
        config.validate().map_err(LoopError::InvalidConfig)?;

        let name = config.name().to_string();
        let looper_config = config.looper.clone();
        let (ready_tx, ready_rx) = bounded::<Result<Arc<Looper>, LoopError>>(1);

        let join = thread::Builder::new()
            .name(name.clone())
            .stack_size(config.stack_size)
            .spawn(move || {
                debug!(thread = %looper_config.name, "handler thread started");
                let looper = match Looper::prepare_with(&looper_config) {
                    Ok(looper) => looper,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return Ok(LoopStats::default());
                    }
                };
                if ready_tx.send(Ok(Arc::clone(&looper))).is_err() {
                    debug!(thread = %looper_config.name, "spawner gone before looper handoff");
                }
                drop(ready_tx);

                on_prepared(&looper);
                let stats = looper.run();
                debug!(thread = %looper_config.name, "handler thread exiting");
                stats
            })?;

        let looper = match ready_rx.recv() {
            Ok(Ok(looper)) => looper,
            Ok(Err(err)) => {
                let _ = join.join();
                return Err(err);
            }
            Err(_) => {
                let _ = join.join();
                return Err(LoopError::Spawn(io::Error::other(format!(
                    "handler thread `{name}` exited before preparing its looper"
                ))));
            }
        };

        info!(thread = %name, looper_id = %looper.id(), "handler thread ready");
        Ok(Self {
            name,
            looper,
            join: Some(join),
        })
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The thread's looper.
    #[must_use]
    pub const fn looper(&self) -> &Arc<Looper> {
        &self.looper
    }

    /// Id of the spawned thread.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.looper.thread_id()
    }

    /// Handler on this thread's looper passing messages to `handle`.
    pub fn handler<F>(&self, handle: F) -> Handler
    where
        F: Fn(&Message) -> AppResult<()> + Send + Sync + 'static,
    {
        Handler::named(&self.looper, self.name.clone(), handle)
    }

    /// Ask the loop to stop. Returns `false` if it was already stopping.
    pub fn quit(&self) -> bool {
        match self.looper.quit() {
            Ok(queued) => queued,
            Err(err) => {
                warn!(thread = %self.name, error = %err, "quit rejected");
                false
            }
        }
    }

    /// Wait for the thread to finish and return its loop statistics.
    ///
    /// Does not quit the loop; call [`quit`](Self::quit) first.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::Spawn` if the thread panicked outside a dispatch,
    /// or the error its loop finished with.
    pub fn join(mut self) -> Result<LoopStats, LoopError> {
        let Some(join) = self.join.take() else {
            return Err(LoopError::Terminated);
        };
        join.join().map_err(|_| {
            LoopError::Spawn(io::Error::other(format!(
                "handler thread `{}` panicked",
                self.name
            )))
        })?
    }
}

impl Drop for HandlerThread {
    fn drop(&mut self) {
        if self.join.is_some() {
            debug!(
                thread = %self.name,
                "handler thread dropped without join - quitting and detaching"
            );
            let _ = self.looper.quit();
        }
    }
}

impl std::fmt::Debug for HandlerThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerThread")
            .field("name", &self.name)
            .field("looper", &self.looper)
            .finish_non_exhaustive()
    }
}
