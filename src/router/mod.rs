//! Path router.
//!
//! A request is resolved in two steps:
//!
//! 1. **Mounts.** If any mount prefix covers the path, the longest one wins
//!    and the rest of the path is forwarded to its handler.
//! 2. **Trie.** Otherwise the path walks the route trie
//!    (static → `:param` → `*wildcard`, with backtracking).
//!
//! Routing misses are not errors. They are [`Resolution`] variants, written
//! as an empty `404` or an empty `405` with a sorted `Allow` header.
//!
//! Registration mistakes are errors, but chaining calls can't return them.
//! The router records the first one and [`Router::finish`] reports it, so a
//! bad route fails before any request is served.

mod mount;
mod params;
mod tree;

pub use params::{Params, RouteParam};

use std::sync::Arc;

use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use tracing::debug;

use crate::error::RouteError;
use crate::guard::ResponseWriter;
use crate::handler::{private, BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;
use crate::response::Response;
use mount::Mount;
use tree::Tree;

/// The application router.
///
/// Patterns are `/literal`, `/:param` (one non-empty segment) and
/// `/*wildcard` (the rest of the path, possibly empty; last segment only).
/// Trailing slashes are significant: `/users` and `/users/` are different
/// routes.
///
/// ```rust
/// use nope::{Request, Response, Router};
///
/// # async fn list(_: Request) -> Response { Response::text("") }
/// # async fn show(_: Request) -> Response { Response::text("") }
/// # async fn asset(_: Request) -> Response { Response::text("") }
/// let api = Router::new()
///     .get("/users", list)
///     .get("/users/:id", show);
///
/// let app = Router::new()
///     .get("/assets/*path", asset)
///     .mount("/api", api)
///     .finish()
///     .expect("routes are valid");
/// ```
pub struct Router {
    tree: Tree<BoxedHandler>,
    mounts: Vec<Mount<BoxedHandler>>,
    error: Option<RouteError>,
}

/// Where a request goes.
pub enum Resolution<'r> {
    /// A mount covers the path. `rest` is the path with the prefix stripped,
    /// `/` if nothing remains.
    Mount { handler: &'r BoxedHandler, rest: &'r str },
    /// A route matched the path and method.
    Route { handler: &'r BoxedHandler, params: Params },
    /// A route matched the path but not the method.
    MethodNotAllowed { allow: String },
    NotFound,
}

impl Router {
    pub fn new() -> Self {
        Self { tree: Tree::new(), mounts: Vec::new(), error: None }
    }

    /// Registers `handler` for `method` at `pattern`. Registering the same
    /// method and pattern again replaces the handler.
    pub fn on(mut self, method: Method, pattern: &str, handler: impl Handler) -> Self {
        if let Err(e) = self.try_on(method, pattern, handler) {
            self.error.get_or_insert(e);
        }
        self
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, pattern, handler)
    }

    pub fn patch(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, pattern, handler)
    }

    /// Like [`Router::on`], returning the registration error directly.
    pub fn try_on(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Handler,
    ) -> Result<(), RouteError> {
        let handler = handler.into_boxed_handler()?;
        if self.tree.insert(method.clone(), pattern, handler)?.is_some() {
            debug!(%method, pattern, "route registered twice; keeping the last handler");
        }
        Ok(())
    }

    /// Forwards every path under `prefix` to `handler`, usually another
    /// [`Router`]. Mounts are checked before routes.
    pub fn mount(mut self, prefix: &str, handler: impl Handler) -> Self {
        if let Err(e) = self.try_mount(prefix, handler) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Like [`Router::mount`], returning the registration error directly.
    /// Mounting a router that recorded an error returns that error.
    pub fn try_mount(&mut self, prefix: &str, handler: impl Handler) -> Result<(), RouteError> {
        mount::validate_prefix(prefix)?;
        let handler = handler.into_boxed_handler()?;
        self.mounts.push(Mount { prefix: prefix.to_owned(), handler });
        Ok(())
    }

    /// Ends registration, returning the first recorded error if there was one.
    pub fn finish(mut self) -> Result<Self, RouteError> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    /// Resolves one request. Pure: the router is not modified.
    pub fn resolve<'r>(&'r self, method: &Method, path: &'r str) -> Resolution<'r> {
        if let Some((mount, rest)) = mount::longest_match(&self.mounts, path) {
            return Resolution::Mount { handler: &mount.handler, rest };
        }

        let Some(found) = self.tree.at(path) else {
            return Resolution::NotFound;
        };
        match found.get(method) {
            Some(handler) => Resolution::Route { handler, params: found.params },
            None => Resolution::MethodNotAllowed { allow: found.allow() },
        }
    }

    /// Whether a route (not a mount) is registered for `method` at `path`.
    pub fn has_route(&self, method: &Method, path: &str) -> bool {
        self.tree.at(path).is_some_and(|found| found.get(method).is_some())
    }

    /// Whether a `method` request to `path` would reach a handler.
    pub fn handles(&self, method: &Method, path: &str) -> bool {
        matches!(
            self.resolve(method, path),
            Resolution::Route { .. } | Resolution::Mount { .. }
        )
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

// ── Router as a handler ───────────────────────────────────────────────────────

impl private::Sealed for Router {}

impl Handler for Router {
    fn into_boxed_handler(mut self) -> Result<BoxedHandler, RouteError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        Ok(Arc::new(self))
    }
}

impl ErasedHandler for Router {
    fn call(&self, mut req: Request, writer: ResponseWriter) -> BoxFuture {
        let path = std::mem::take(&mut req.path);
        let resolution = self.resolve(&req.method, &path);

        match resolution {
            Resolution::Mount { handler, rest } => {
                let handler = Arc::clone(handler);
                req.path = rest.to_owned();
                handler.call(req, writer)
            }
            Resolution::Route { handler, params } => {
                let handler = Arc::clone(handler);
                req.path = path;
                req.params = params;
                handler.call(req, writer)
            }
            Resolution::MethodNotAllowed { allow } => {
                let mut res = Response::status(StatusCode::METHOD_NOT_ALLOWED);
                if let Ok(value) = HeaderValue::try_from(allow) {
                    res.headers.insert(header::ALLOW, value);
                }
                Box::pin(async move { writer.send(res).await })
            }
            Resolution::NotFound => {
                Box::pin(async move { writer.send(Response::status(StatusCode::NOT_FOUND)).await })
            }
        }
    }
}
