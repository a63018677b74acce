//! # Runguard
//!
//! A guarded start/stop lifecycle controller for cancellable backends.
//!
//! Runguard wraps any long-running component that exposes explicit start and
//! stop operations into a [`Controller`] that guarantees the two never
//! overlap: a backend is started at most once at a time and stopped exactly
//! once per run, whether the stop comes from an explicit call or from the
//! caller's cancellation token expiring.
//!
//! ## What you get
//!
//! - **A two-state machine**: `NotRunning` and `Running`, with invalid
//!   transitions rejected as typed errors instead of racing.
//! - **Cooperative cancellation**: each run gets a child
//!   [`CancellationToken`]; cancelling the parent tears the run down exactly
//!   as an explicit [`Controller::stop`] would.
//! - **One stop, many waiters**: concurrent `stop()` calls all receive the
//!   single published stop result, and the backend's stop runs once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runguard::{Backend, CancellationToken, Controller, async_trait};
//! use std::convert::Infallible;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Backend for Echo {
//!     type Config = String;
//!     type Error = Infallible;
//!
//!     async fn start(&self, _shutdown: CancellationToken, greeting: String) -> Result<(), Infallible> {
//!         println!("starting: {greeting}");
//!         Ok(())
//!     }
//!
//!     async fn stop(&self, _shutdown: CancellationToken) -> Result<(), Infallible> {
//!         println!("stopped");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let controller = Controller::new(Echo);
//!     let shutdown = CancellationToken::new();
//!
//!     controller.start(shutdown.clone(), "hello".into()).await.unwrap();
//!     assert!(controller.is_running().await);
//!
//!     controller.stop().await.unwrap();
//!     assert!(!controller.is_running().await);
//! }
//! ```
//!
//! There is deliberately no retry policy, no health checking, and no built-in
//! stop deadline: cancellation and timeout semantics belong entirely to the
//! tokens handed to the backend.

pub mod backend;
pub mod controller;
pub mod error;
pub mod task;

// Re-export core types
pub use backend::{Backend, FnBackend};
pub use controller::Controller;
pub use error::{ControllerError, Result};
pub use task::spawn_detached;

// Re-export the foreign items the API contract is written in terms of
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient imports
///
/// ```
/// use runguard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backend::{Backend, FnBackend};
    pub use crate::controller::Controller;
    pub use crate::error::{ControllerError, Result};
    pub use crate::task::spawn_detached;
    pub use async_trait::async_trait;
    pub use tokio_util::sync::CancellationToken;
}
