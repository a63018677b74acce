//! Controller-specific error types

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during controller operations
///
/// Invalid state transitions produce [`ControllerError::AlreadyRunning`] or
/// [`ControllerError::AlreadyNotRunning`]; both are terminal for the call that
/// triggered them and never retried internally. Anything the backend itself
/// returns from start or stop surfaces through [`ControllerError::Backend`]
/// with its concrete type intact.
#[derive(Debug, Error)]
pub enum ControllerError<E> {
    /// Start was called while a run is already active
    #[error("already running")]
    AlreadyRunning,

    /// Stop was called while no run is active
    #[error("already not running")]
    AlreadyNotRunning,

    /// The backend returned an error from start or stop
    ///
    /// The error is shared behind an [`Arc`] because a single stop result is
    /// delivered to every caller waiting in `stop()` at that moment.
    #[error("backend error: {0}")]
    Backend(Arc<E>),

    /// The watcher task terminated before publishing a stop result
    ///
    /// This indicates the backend panicked inside its stop path; the panic
    /// itself is surfaced through the task launcher's logging.
    #[error("stop result lost: watcher terminated before publishing it")]
    StopResultLost,
}

impl<E> ControllerError<E> {
    /// Wrap a backend error
    pub fn backend(err: E) -> Self {
        Self::Backend(Arc::new(err))
    }

    /// True if this is a state-transition error rather than a backend failure
    pub fn is_transition_error(&self) -> bool {
        matches!(self, Self::AlreadyRunning | Self::AlreadyNotRunning)
    }
}

/// A specialized Result type for controller operations
pub type Result<T, E> = std::result::Result<T, ControllerError<E>>;
