//! Backend capability traits
//!
//! A [`Backend`] is the controlled unit of work: anything with an explicit
//! start and an explicit stop, both cooperative with cancellation. The
//! controller never interprets what the backend does; it only enforces that
//! the two operations are called in a valid order.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// The controlled unit of work exposing explicit start/stop operations
///
/// Both operations receive the run's cancellation token. The token passed to
/// [`stop`](Backend::stop) is the same one the run was started with, already
/// cancelled by the time stop runs; backends that need a stop deadline should
/// derive their own timeout from it.
///
/// # Example
///
/// ```rust,ignore
/// use runguard::{Backend, CancellationToken, async_trait};
///
/// struct HttpServer {
///     addr: std::net::SocketAddr,
/// }
///
/// #[async_trait]
/// impl Backend for HttpServer {
///     type Config = ServerConfig;
///     type Error = std::io::Error;
///
///     async fn start(&self, shutdown: CancellationToken, config: ServerConfig) -> Result<(), Self::Error> {
///         // bind, then serve on a task that exits when `shutdown` is cancelled
///         Ok(())
///     }
///
///     async fn stop(&self, _shutdown: CancellationToken) -> Result<(), Self::Error> {
///         // drain in-flight connections
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Typed, backend-specific configuration passed to each start
    type Config: Send;

    /// Error type returned by the backend's own operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Bring the backend up
    ///
    /// Invoked at most once per run. The backend should return promptly once
    /// running and tie any long-lived work it spawns to `shutdown`.
    async fn start(
        &self,
        shutdown: CancellationToken,
        config: Self::Config,
    ) -> std::result::Result<(), Self::Error>;

    /// Tear the backend down
    ///
    /// Invoked exactly once per run, after the run's token has been
    /// cancelled.
    async fn stop(&self, shutdown: CancellationToken) -> std::result::Result<(), Self::Error>;
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type StartFn<C, E> =
    Box<dyn Fn(CancellationToken, C) -> BoxFuture<std::result::Result<(), E>> + Send + Sync>;
type StopFn<E> =
    Box<dyn Fn(CancellationToken) -> BoxFuture<std::result::Result<(), E>> + Send + Sync>;

/// A [`Backend`] assembled from a pair of closures
///
/// Useful for tests and for one-off backends that do not warrant a named
/// type.
///
/// # Example
///
/// ```rust,no_run
/// use runguard::{CancellationToken, FnBackend};
/// use std::convert::Infallible;
///
/// let backend: FnBackend<String, Infallible> = FnBackend::new(
///     |_shutdown: CancellationToken, greeting: String| async move {
///         println!("starting: {greeting}");
///         Ok(())
///     },
///     |_shutdown| async move {
///         println!("stopped");
///         Ok(())
///     },
/// );
/// ```
pub struct FnBackend<C, E> {
    start_fn: StartFn<C, E>,
    stop_fn: StopFn<E>,
}

impl<C, E> FnBackend<C, E> {
    /// Build a backend from a start closure and a stop closure
    pub fn new<S, SFut, T, TFut>(start: S, stop: T) -> Self
    where
        S: Fn(CancellationToken, C) -> SFut + Send + Sync + 'static,
        SFut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        T: Fn(CancellationToken) -> TFut + Send + Sync + 'static,
        TFut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    {
        Self {
            start_fn: Box::new(move |shutdown, config| Box::pin(start(shutdown, config))),
            stop_fn: Box::new(move |shutdown| Box::pin(stop(shutdown))),
        }
    }
}

impl<C, E> fmt::Debug for FnBackend<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl<C, E> Backend for FnBackend<C, E>
where
    C: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Config = C;
    type Error = E;

    async fn start(
        &self,
        shutdown: CancellationToken,
        config: Self::Config,
    ) -> std::result::Result<(), Self::Error> {
        (self.start_fn)(shutdown, config).await
    }

    async fn stop(&self, shutdown: CancellationToken) -> std::result::Result<(), Self::Error> {
        (self.stop_fn)(shutdown).await
    }
}
