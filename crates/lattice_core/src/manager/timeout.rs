//! Bounded execution of blocking manager calls.
//!
//! The bound is advisory: on timeout a warning is logged and the caller keeps
//! waiting for the worker to finish.

use crate::manager::LifecycleError;
use log::warn;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Runs `task` on a named worker thread and waits for its result.
pub(crate) fn run_within<T, F>(
    timeout: Duration,
    operation: &'static str,
    task: F,
) -> Result<T, LifecycleError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LifecycleError> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let worker = thread::Builder::new()
        .name(format!("lattice-{operation}"))
        .spawn(move || {
            // The receiver only disappears if the caller is gone.
            let _ = sender.send(task());
        })
        .map_err(LifecycleError::Worker)?;

    let result = match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                "event={operation}_timeout module=manager status=blocking timeout_ms={}",
                timeout.as_millis()
            );
            receiver.recv().map_err(|_| LifecycleError::WorkerLost)?
        }
        Err(RecvTimeoutError::Disconnected) => Err(LifecycleError::WorkerLost),
    };
    if worker.join().is_err() {
        return Err(LifecycleError::WorkerLost);
    }
    result
}
