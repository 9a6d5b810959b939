//! # nope
//!
//! The request-dispatch core of a small HTTP service toolkit: a path router
//! and a response guard that together decide, for every request, which
//! handler runs and what single response reaches the wire.
//!
//! ## Routing
//!
//! - `/literal`, `/:param`, `/*wildcard` patterns in one trie
//! - static beats parameter beats wildcard, with backtracking
//! - mounts: longest matching prefix wins, the rest of the path is forwarded
//! - `404` on a miss, `405` with a sorted `Allow` header on a method miss
//! - registration mistakes fail at startup, never at request time
//!
//! ## One response per request
//!
//! Every request runs under a [`ResponseGuard`]. The handler, a deadline
//! responder and a panic responder race for the response; the first write
//! wins and everything after is dropped. A request that runs past its
//! deadline without writing gets `504 timeout`, a handler that panics before
//! writing gets `500 internal_error`, and an [`Observer`] sees every request
//! end exactly once.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use nope::{AppError, Outcome, Request, Router, Server};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct User { id: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nope::Error> {
//!     let app = Router::new()
//!         .get("/users/:id", get_user)
//!         .get("/static/*path", asset);
//!
//!     Server::bind("0.0.0.0:3000")
//!         .request_timeout(Duration::from_secs(10))
//!         .health()
//!         .serve(app)
//!         .await
//! }
//!
//! async fn get_user(req: Request) -> Result<Outcome<User>, AppError> {
//!     let id = req.param("id").unwrap_or_default().to_owned();
//!     Ok(Outcome::Success(User { id }))
//! }
//!
//! async fn asset(req: Request) -> String {
//!     format!("asset {}", req.param("path").unwrap_or_default())
//! }
//! ```

mod context;
mod error;
mod guard;
mod observe;
mod request;
mod request_id;
mod response;
mod server;
mod service;

pub mod handler;
pub mod health;
pub mod router;

pub use context::{Cancelled, Context};
pub use error::{AppError, BoxError, Error, RouteError};
pub use guard::{PendingResponse, ResponseBody, ResponseGuard, ResponseWriter};
pub use handler::Handler;
pub use observe::{NoopObserver, Observer, RequestInfo, ResponseInfo, TraceObserver};
pub use request::Request;
pub use request_id::{RequestId, X_REQUEST_ID};
pub use response::{IntoResponse, Outcome, Response, ResponseBuilder};
pub use router::{Params, Resolution, RouteParam, Router};
pub use server::Server;
pub use service::Service;
