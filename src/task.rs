//! Detached background task launching
//!
//! The controller's watcher runs concurrently with its caller and never
//! reports back through a join handle, so failures have to be surfaced
//! through the logging path instead. [`spawn_detached`] spawns the task and
//! watches its join handle from a companion task, logging panics and
//! cancellation.

use std::future::Future;

/// Run a unit of work concurrently with the caller
///
/// The task is detached: nothing awaits it directly. A companion task awaits
/// its join handle and reports abnormal termination through `tracing`, so a
/// panicking task is visible in the application's logs rather than silently
/// swallowed.
pub fn spawn_detached<F>(task: impl Into<String>, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = task.into();
    let handle = tokio::spawn(future);

    tokio::spawn(async move {
        match handle.await {
            Ok(()) => {}
            Err(err) if err.is_panic() => {
                tracing::error!("Background task '{}' panicked: {}", task, err);
            }
            Err(err) => {
                tracing::debug!("Background task '{}' cancelled: {}", task, err);
            }
        }
    });
}
