//! Lifecycle Controller
//!
//! Wraps a [`Backend`] into a controlled start/stop lifecycle with
//! cooperative cancellation. A controller instance is always in one of two
//! states and guarantees that no two "running" periods ever overlap:
//!
//! ```text
//!              start()                cancel / stop()
//! NotRunning ───────────▶ Running ───────────────────▶ NotRunning
//!     ▲                                                    │
//!     └────────────────────────────────────────────────────┘
//! ```
//!
//! Stopping can be triggered two ways: an explicit [`Controller::stop`] call,
//! or the cancellation token originally passed to [`Controller::start`]
//! becoming cancelled. Both funnel into the same teardown: a detached watcher
//! task waits for the run's token, invokes the backend's stop exactly once,
//! and publishes the result for whoever is waiting.

use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::error::{ControllerError, Result};
use crate::task;

/// Outcome of one run's `backend.stop`, shareable across concurrent waiters.
type StopResult<E> = std::result::Result<(), Arc<E>>;

/// The per-run (cancellation handle, completion channel) pair.
///
/// Created atomically by `start`, destroyed by the watcher. At most one slot
/// is alive per controller at any time.
struct RunSlot<E> {
    cancel: CancellationToken,
    done: watch::Receiver<Option<StopResult<E>>>,
}

/// Controls the lifecycle of a single [`Backend`]
///
/// The controller holds the backend for its whole lifetime and enforces the
/// start-at-most-once / stop-exactly-once discipline per run. It is cheap to
/// share behind an [`Arc`] and safe to drive from many tasks concurrently.
///
/// # Example
///
/// ```rust,no_run
/// use runguard::{Backend, CancellationToken, Controller, async_trait};
/// use std::convert::Infallible;
///
/// struct Recorder;
///
/// #[async_trait]
/// impl Backend for Recorder {
///     type Config = String;
///     type Error = Infallible;
///
///     async fn start(&self, _shutdown: CancellationToken, path: String) -> Result<(), Infallible> {
///         println!("recording to {path}");
///         Ok(())
///     }
///
///     async fn stop(&self, _shutdown: CancellationToken) -> Result<(), Infallible> {
///         println!("recording finished");
///         Ok(())
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let controller = Controller::new(Recorder);
///     let shutdown = CancellationToken::new();
///
///     controller.start(shutdown.clone(), "/tmp/out.wav".into()).await.unwrap();
///     assert!(controller.is_running().await);
///
///     controller.stop().await.unwrap();
///     assert!(!controller.is_running().await);
/// }
/// ```
pub struct Controller<B: Backend> {
    backend: Arc<B>,
    name: String,
    // Locking discipline: `start` takes the guard exclusively for the whole
    // run creation, so no other operation can observe a half-installed pair.
    // `stop` and `is_running` take it shared and only read the slot; `stop`
    // releases the guard *before* awaiting the completion channel, which is
    // what lets the watcher take its own brief exclusive hold to publish the
    // result and clear the slot without deadlocking a pending stop. A new
    // start needs the exclusive hold and therefore cannot begin until the
    // watcher has cleared the previous slot, so every stop observes exactly
    // the pair created by the most recent successful start.
    slot: Arc<RwLock<Option<RunSlot<B::Error>>>>,
}

impl<B: Backend> Controller<B> {
    /// Create a controller for the given backend
    ///
    /// The controller's name, used in log output, defaults to the backend's
    /// type name.
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            name: std::any::type_name::<B>().to_string(),
            slot: Arc::new(RwLock::new(None)),
        }
    }

    /// Override the controller name used in log output
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The controller name used in log output
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The controlled backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Start the backend
    ///
    /// Derives a child token from `shutdown` (so the run ends when either the
    /// caller cancels `shutdown` or [`stop`](Controller::stop) is called),
    /// invokes the backend's start, and on success launches the watcher that
    /// will perform the eventual teardown.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::AlreadyRunning`] if a run is already
    /// active; in that case the backend is not invoked. A backend start
    /// failure is returned as [`ControllerError::Backend`] and leaves the
    /// controller stopped, so a later `start` reaches the backend again.
    pub async fn start(
        &self,
        shutdown: CancellationToken,
        config: B::Config,
    ) -> Result<(), B::Error> {
        let mut slot = self.slot.write().await;
        if slot.is_some() {
            return Err(ControllerError::AlreadyRunning);
        }

        let cancel = shutdown.child_token();
        self.backend
            .start(cancel.clone(), config)
            .await
            .map_err(ControllerError::backend)?;

        let (done_tx, done_rx) = watch::channel(None);
        *slot = Some(RunSlot {
            cancel: cancel.clone(),
            done: done_rx,
        });

        tracing::info!("Started backend '{}'", self.name);
        self.spawn_watcher(cancel, done_tx);
        Ok(())
    }

    /// Stop the backend and return the result of its stop operation
    ///
    /// Cancels the run's token (idempotent, so racing stop calls are
    /// harmless) and waits for the watcher to publish the stop result. Every
    /// caller waiting here receives the same published result; the backend's
    /// stop runs exactly once regardless of how many callers are waiting.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::AlreadyNotRunning`] if no run is active,
    /// or the backend's own stop error as [`ControllerError::Backend`].
    pub async fn stop(&self) -> Result<(), B::Error> {
        let (cancel, mut done) = {
            let slot = self.slot.read().await;
            match slot.as_ref() {
                None => return Err(ControllerError::AlreadyNotRunning),
                Some(run) => (run.cancel.clone(), run.done.clone()),
            }
        };

        cancel.cancel();

        let published = match done.wait_for(|result| result.is_some()).await {
            Ok(value) => (*value).clone(),
            Err(_) => return Err(ControllerError::StopResultLost),
        };
        match published {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(ControllerError::Backend(err)),
            None => Err(ControllerError::StopResultLost),
        }
    }

    /// Whether a run is currently active
    ///
    /// Pure query; causes no transition. Remains true after external
    /// cancellation until the watcher has finished tearing the run down.
    pub async fn is_running(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// Launch the watcher: the tail half of `start`.
    ///
    /// Waits for the run's token, invokes the backend's stop once, then
    /// publishes the result and clears the slot in one exclusive hold.
    fn spawn_watcher(
        &self,
        cancel: CancellationToken,
        done_tx: watch::Sender<Option<StopResult<B::Error>>>,
    ) {
        let backend = Arc::clone(&self.backend);
        let slot = Arc::clone(&self.slot);
        let name = self.name.clone();

        task::spawn_detached(format!("{name}-watcher"), async move {
            cancel.cancelled().await;
            tracing::debug!("Run cancelled, stopping backend '{}'", name);

            let outcome = backend.stop(cancel).await.map_err(Arc::new);
            if let Err(err) = &outcome {
                // Only a caller blocked in stop() will see this error; log it
                // so an externally-cancelled run does not fail silently.
                tracing::warn!("Backend '{}' stop returned error: {}", name, err);
            }

            let mut slot = slot.write().await;
            // The slot still holds a receiver, so this send cannot fail; the
            // publish must happen before the clear so a pending stop() never
            // observes an empty slot with no result.
            let _ = done_tx.send(Some(outcome));
            *slot = None;

            tracing::info!("Stopped backend '{}'", name);
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use thiserror::Error;

    use super::*;

    #[derive(Debug, Error, PartialEq)]
    #[error("{0}")]
    struct TestError(&'static str);

    #[derive(Default)]
    struct TestBackend {
        starts: AtomicUsize,
        stops: AtomicUsize,
        start_error: Option<&'static str>,
        stop_error: Option<&'static str>,
        stop_delay: Duration,
    }

    impl TestBackend {
        fn failing_start(message: &'static str) -> Self {
            Self {
                start_error: Some(message),
                ..Default::default()
            }
        }

        fn failing_stop(message: &'static str) -> Self {
            Self {
                stop_error: Some(message),
                // Slow the stop down so racing stop() calls overlap the run.
                stop_delay: Duration::from_millis(50),
                ..Default::default()
            }
        }

        fn starts(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }

        fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Backend for TestBackend {
        type Config = ();
        type Error = TestError;

        async fn start(
            &self,
            _shutdown: CancellationToken,
            _config: (),
        ) -> std::result::Result<(), TestError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            match self.start_error {
                Some(message) => Err(TestError(message)),
                None => Ok(()),
            }
        }

        async fn stop(&self, _shutdown: CancellationToken) -> std::result::Result<(), TestError> {
            if !self.stop_delay.is_zero() {
                tokio::time::sleep(self.stop_delay).await;
            }
            self.stops.fetch_add(1, Ordering::SeqCst);
            match self.stop_error {
                Some(message) => Err(TestError(message)),
                None => Ok(()),
            }
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    async fn wait_until_stopped(controller: &Controller<TestBackend>) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while controller.is_running().await {
            assert!(
                tokio::time::Instant::now() < deadline,
                "controller did not stop in time"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn start_then_stop_round_trip() {
        let controller = Controller::new(TestBackend::default());
        let shutdown = CancellationToken::new();

        assert!(!controller.is_running().await);

        controller.start(shutdown.clone(), ()).await.unwrap();
        assert!(controller.is_running().await);

        controller.stop().await.unwrap();
        assert!(!controller.is_running().await);

        assert_eq!(controller.backend().starts(), 1);
        assert_eq!(controller.backend().stops(), 1);
    }

    #[tokio::test]
    async fn second_start_fails_without_touching_the_backend() {
        let controller = Controller::new(TestBackend::default());
        let shutdown = CancellationToken::new();

        controller.start(shutdown.clone(), ()).await.unwrap();

        let err = controller.start(shutdown.clone(), ()).await.unwrap_err();
        assert!(matches!(err, ControllerError::AlreadyRunning));
        assert!(controller.is_running().await);
        assert_eq!(controller.backend().starts(), 1);

        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_when_not_running_fails() {
        let controller = Controller::new(TestBackend::default());

        let err = controller.stop().await.unwrap_err();
        assert!(matches!(err, ControllerError::AlreadyNotRunning));
    }

    #[tokio::test]
    async fn stop_returns_the_backend_stop_error() {
        let controller = Controller::new(TestBackend::failing_stop("disk on fire"));
        let shutdown = CancellationToken::new();

        controller.start(shutdown, ()).await.unwrap();

        let err = controller.stop().await.unwrap_err();
        match err {
            ControllerError::Backend(inner) => assert_eq!(*inner, TestError("disk on fire")),
            other => panic!("expected backend error, got {other:?}"),
        }
        assert!(!controller.is_running().await);
    }

    #[tokio::test]
    async fn external_cancellation_stops_the_backend_once() {
        init_tracing();
        let controller = Controller::new(TestBackend::default());
        let shutdown = CancellationToken::new();

        controller.start(shutdown.clone(), ()).await.unwrap();

        shutdown.cancel();
        wait_until_stopped(&controller).await;

        assert_eq!(controller.backend().stops(), 1);

        // The run is over, so a late stop is an invalid transition.
        let err = controller.stop().await.unwrap_err();
        assert!(matches!(err, ControllerError::AlreadyNotRunning));
    }

    #[tokio::test]
    async fn concurrent_stops_share_one_result() {
        let controller = Arc::new(Controller::new(TestBackend::failing_stop("boom")));
        let shutdown = CancellationToken::new();

        controller.start(shutdown, ()).await.unwrap();

        let first = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.stop().await })
        };
        let second = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.stop().await })
        };

        let first = first.await.unwrap();
        let second = second.await.unwrap();

        match (first, second) {
            (Err(ControllerError::Backend(a)), Err(ControllerError::Backend(b))) => {
                // Both waiters received the one published result.
                assert!(Arc::ptr_eq(&a, &b));
                assert_eq!(*a, TestError("boom"));
            }
            other => panic!("expected two backend errors, got {other:?}"),
        }

        assert_eq!(controller.backend().stops(), 1);
    }

    #[tokio::test]
    async fn restart_after_full_cycle_succeeds() {
        let controller = Controller::new(TestBackend::default());

        let first_run = CancellationToken::new();
        controller.start(first_run, ()).await.unwrap();
        controller.stop().await.unwrap();

        let second_run = CancellationToken::new();
        controller.start(second_run, ()).await.unwrap();
        assert!(controller.is_running().await);

        controller.stop().await.unwrap();
        assert_eq!(controller.backend().starts(), 2);
        assert_eq!(controller.backend().stops(), 2);
    }

    #[tokio::test]
    async fn start_failure_leaves_controller_stopped() {
        let controller = Controller::new(TestBackend::failing_start("no such device"));
        let shutdown = CancellationToken::new();

        let err = controller.start(shutdown.clone(), ()).await.unwrap_err();
        match err {
            ControllerError::Backend(inner) => assert_eq!(*inner, TestError("no such device")),
            other => panic!("expected backend error, got {other:?}"),
        }
        assert!(!controller.is_running().await);

        // A retry reaches the backend again instead of failing AlreadyRunning.
        let err = controller.start(shutdown, ()).await.unwrap_err();
        assert!(matches!(err, ControllerError::Backend(_)));
        assert_eq!(controller.backend().starts(), 2);
    }

    #[tokio::test]
    async fn unobserved_stop_error_is_dropped_not_stuck() {
        init_tracing();
        let controller = Controller::new(TestBackend::failing_stop("nobody listening"));
        let shutdown = CancellationToken::new();

        controller.start(shutdown.clone(), ()).await.unwrap();

        // Nobody calls stop(); the error only reaches the log.
        shutdown.cancel();
        wait_until_stopped(&controller).await;

        assert_eq!(controller.backend().stops(), 1);
    }

    #[tokio::test]
    async fn controller_name_defaults_to_backend_type() {
        let controller = Controller::new(TestBackend::default());
        assert!(controller.name().contains("TestBackend"));

        let named = Controller::new(TestBackend::default()).with_name("audio-pipeline");
        assert_eq!(named.name(), "audio-pipeline");
    }
}
