//! Await work executed on a looper thread from async code.

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::core::{Handler, LoopError};

/// Run `f` on `handler`'s looper thread and await its return value.
///
/// The closure is posted like any other callback, so it runs after messages
/// that are already due.
///
/// # Errors
///
/// - `LoopError::QueueClosed` if the looper is already quitting
/// - `LoopError::Abandoned` if the loop quit before running `f`, or `f` panicked
pub async fn run_on<F, T>(handler: &Handler, f: F) -> Result<T, LoopError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let slot = Mutex::new(Some((f, tx)));

    let queued = handler.post(move || {
        if let Some((f, tx)) = slot.lock().take() {
            let _ = tx.send(f());
        }
        Ok(())
    })?;
    if !queued {
        return Err(LoopError::QueueClosed(handler.name()));
    }

    rx.await.map_err(|_| LoopError::Abandoned)
}
