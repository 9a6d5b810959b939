//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router keeps handlers of *different* types in one trie, so every
//! handler is hidden behind a common trait object (`dyn ErasedHandler`).
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                       ← stored as BoxedHandler
//!        ↓
//! handler.call(req, writer)  at request time       ← one vtable dispatch
//!        ↓
//! writer.send(hello(req).await.into_response())    ← through the guard
//! ```
//!
//! Every handler writes through a [`ResponseWriter`]. Plain handlers never see
//! it: their return value is sent for them. Handlers built with [`stream`]
//! receive it and write the head and body chunks themselves.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::RouteError;
use crate::guard::ResponseWriter;
use crate::request::Request;
use crate::response::IntoResponse;

/// A heap-allocated, type-erased future driving one request to completion.
#[doc(hidden)]
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request, writer: ResponseWriter) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route or mount target.
///
/// Satisfied automatically by:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// async fn name(req: Request) -> Result<Outcome<T>, E>    // T: Serialize, E: Into<AppError>
/// handler::stream(|req: Request, w: ResponseWriter| async move { … })
/// Router                                                  // for mounts
/// ```
///
/// The trait is sealed: only the impls in this crate can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    /// Fails only for a [`Router`](crate::Router) that recorded a
    /// registration error.
    #[doc(hidden)]
    fn into_boxed_handler(self) -> Result<BoxedHandler, RouteError>;
}

pub(crate) mod private {
    pub trait Sealed {}
}

// ── Plain handlers ────────────────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> Result<BoxedHandler, RouteError> {
        Ok(Arc::new(FnHandler(self)))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request, writer: ResponseWriter) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { writer.send(fut.await.into_response()).await })
    }
}

// ── Streaming handlers ────────────────────────────────────────────────────────

/// A handler that writes its response itself. Build with [`stream`].
pub struct Streaming<F>(F);

/// Wraps a closure that receives the guarded [`ResponseWriter`].
///
/// ```rust
/// use http::{HeaderMap, StatusCode};
/// use nope::{handler, Request, ResponseWriter, Router};
///
/// let app = Router::new().get("/events", handler::stream(|_req: Request, w: ResponseWriter| async move {
///     w.write_head(StatusCode::OK, HeaderMap::new());
///     for i in 0..3 {
///         w.write(format!("tick {i}\n")).await;
///     }
/// }));
/// ```
pub fn stream<F, Fut>(f: F) -> Streaming<F>
where
    F: Fn(Request, ResponseWriter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Streaming(f)
}

impl<F> private::Sealed for Streaming<F> {}

impl<F, Fut> Handler for Streaming<F>
where
    F: Fn(Request, ResponseWriter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn into_boxed_handler(self) -> Result<BoxedHandler, RouteError> {
        Ok(Arc::new(self))
    }
}

impl<F, Fut> ErasedHandler for Streaming<F>
where
    F: Fn(Request, ResponseWriter) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, req: Request, writer: ResponseWriter) -> BoxFuture {
        Box::pin((self.0)(req, writer))
    }
}
