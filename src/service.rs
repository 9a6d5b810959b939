//! One request in, at most one response out, without a socket.
//!
//! [`Server`](crate::Server) feeds every hyper request through a
//! [`Service`]. Tests can call it directly.
//!
//! ```rust
//! # async fn demo() {
//! use bytes::Bytes;
//! use nope::{Request, Router, Service};
//!
//! async fn hello(_req: Request) -> &'static str { "hello" }
//!
//! let svc = Service::new(Router::new().get("/", hello)).unwrap();
//! let req = http::Request::get("/").body(Bytes::new()).unwrap();
//! let res = svc.call(req).await.unwrap();
//! assert_eq!(res.status(), 200);
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;

use crate::context::Context;
use crate::error::RouteError;
use crate::guard::{ResponseBody, ResponseGuard};
use crate::handler::{BoxedHandler, ErasedHandler, Handler};
use crate::health;
use crate::observe::{Observer, RequestInfo, TraceObserver};
use crate::request::Request;
use crate::request_id::RequestId;
use crate::router::Router;

/// A finished [`Router`] plus the per-request policy around it.
///
/// Cheap to clone; clones share the router and observer.
#[derive(Clone)]
pub struct Service {
    router: Arc<Router>,
    pub(crate) observer: Arc<dyn Observer>,
    pub(crate) timeout: Option<Duration>,
    /// Answers `GET /healthz` ahead of mounts and routes.
    health: Option<BoxedHandler>,
}

impl Service {
    /// Finishes `router`, failing on the first registration error.
    ///
    /// Requests are logged by [`TraceObserver`] and have no deadline until
    /// configured otherwise.
    pub fn new(router: Router) -> Result<Self, RouteError> {
        Ok(Self {
            router: Arc::new(router.finish()?),
            observer: Arc::new(TraceObserver),
            timeout: None,
            health: None,
        })
    }

    pub fn observer(mut self, observer: impl Observer) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Every request gets a deadline `timeout` after it starts. When it
    /// passes before the handler has written anything, the client gets
    /// `504 timeout`.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Serves [`health::liveness`] at `GET /healthz`, ahead of mounts,
    /// unless the router has its own route there.
    pub fn health(mut self) -> Self {
        if self.router.has_route(&Method::GET, health::PATH) {
            return self;
        }
        self.health = health::liveness.into_boxed_handler().ok();
        self
    }

    /// Handles one request.
    ///
    /// `None` means no response will be written (the request was cancelled
    /// for a reason other than its deadline) and the connection should be
    /// closed. Dropping the returned body before it ends cancels the
    /// request's context.
    pub async fn call(&self, req: http::Request<Bytes>) -> Option<http::Response<ResponseBody>> {
        let req = Request::from_http(req);
        let request_id = RequestId::from_headers(&req.headers);
        let info = RequestInfo {
            method: req.method.clone(),
            path: req.path.clone(),
            request_id: request_id.clone(),
        };

        let mut ctx = Context::new();
        if let Some(timeout) = self.timeout {
            ctx = ctx.with_timeout(timeout);
        }
        ctx.extensions_mut().insert(request_id);
        self.observer.on_request_start(&info, &mut ctx);

        let handler: BoxedHandler = match &self.health {
            Some(liveness) if req.method == Method::GET && req.path == health::PATH => {
                Arc::clone(liveness)
            }
            _ => Arc::clone(&self.router) as BoxedHandler,
        };

        let req = req.with_context(ctx.clone());
        let (guard, writer, pending) = ResponseGuard::new(ctx, Arc::clone(&self.observer), info);

        // The handler future is built inside the guarded task, so a panic
        // while building it is caught too.
        tokio::spawn(guard.run(async move { handler.call(req, writer).await }));

        pending.wait().await
    }
}
