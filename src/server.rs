//! HTTP server and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. Stops `listener.accept()` immediately; no new connections are made.
//! 2. Asks every open connection to finish its in-flight requests and close.
//! 3. Waits up to the shutdown timeout (default 5 s), then aborts whatever
//!    is left and returns from [`Server::serve`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{BoxError, Error};
use crate::guard::ResponseBody;
use crate::observe::{Observer, TraceObserver};
use crate::router::Router;
use crate::service::Service;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The HTTP server.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use nope::{Router, Server};
///
/// # async fn run(app: Router) -> Result<(), nope::Error> {
/// Server::bind("0.0.0.0:3000")
///     .request_timeout(Duration::from_secs(10))
///     .health()
///     .serve(app)
///     .await
/// # }
/// ```
pub struct Server {
    addr: String,
    request_timeout: Option<Duration>,
    shutdown_timeout: Duration,
    observer: Arc<dyn Observer>,
    health: bool,
}

impl Server {
    /// Configures the server to bind to `addr` (`host:port`) when
    /// [`serve`](Server::serve) is called. An invalid address is reported
    /// by `serve`.
    pub fn bind(addr: &str) -> Self {
        Self {
            addr: addr.to_owned(),
            request_timeout: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            observer: Arc::new(TraceObserver),
            health: false,
        }
    }

    /// Deadline for every request. Unset by default.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// How long shutdown waits for open connections. 5 s by default.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Lifecycle hooks for every request. [`TraceObserver`] by default.
    pub fn observer(mut self, observer: impl Observer) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Serves [`liveness`](crate::health::liveness) at `GET /healthz`, ahead
    /// of mounts, unless `router` has its own route there.
    pub fn health(mut self) -> Self {
        self.health = true;
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Fails before accepting anything if the address is invalid, the port
    /// can't be bound, or the router recorded a registration error. Returns
    /// `Ok` after a graceful shutdown.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|source| Error::Addr { addr: self.addr.clone(), source })?;

        let mut service = Service::new(router)?;
        service.observer = self.observer;
        service.timeout = self.request_timeout;
        if self.health {
            service = service.health();
        }

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "nope listening");

        // JoinSet tracks every spawned connection task so shutdown can wait
        // for them.
        let mut tasks = tokio::task::JoinSet::new();
        let (stop_tx, stop_rx) = watch::channel(false);

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Checked first, so a signal stops accepting even while more
                // connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };
                    tasks.spawn(serve_connection(service.clone(), TokioIo::new(stream), peer, stop_rx.clone()));
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        let _ = stop_tx.send(true);

        let drain = async { while tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(self.shutdown_timeout, drain).await.is_err() {
            warn!(remaining = tasks.len(), "shutdown timeout elapsed, aborting connections");
            tasks.shutdown().await;
        }

        info!("nope stopped");
        Ok(())
    }
}

/// Serves one connection until it closes or shutdown asks it to.
async fn serve_connection(
    service: Service,
    io: TokioIo<tokio::net::TcpStream>,
    peer: SocketAddr,
    mut stop: watch::Receiver<bool>,
) {
    // Called once per request on the connection.
    let svc = service_fn(move |req| dispatch(service.clone(), req));

    // `auto::Builder` handles both HTTP/1.1 and HTTP/2, whichever the client
    // negotiates.
    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);

    let res = tokio::select! {
        res = conn.as_mut() => res,
        _ = stop.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = res {
        error!(%peer, "connection error: {e}");
    }
}

/// The request was cancelled before anything was written. Returning it to
/// hyper closes the connection.
#[derive(Debug, thiserror::Error)]
#[error("request ended without a response")]
struct NoResponse;

/// Reads the body, then hands the request to the service.
async fn dispatch(
    service: Service,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<ResponseBody>, BoxError> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    match service.call(http::Request::from_parts(parts, body)).await {
        Some(res) => Ok(res),
        None => {
            debug!("no response written, closing connection");
            Err(NoResponse.into())
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives: SIGTERM or
/// SIGINT on Unix, Ctrl-C elsewhere. A signal that can't be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
