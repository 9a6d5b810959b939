//! Built-in liveness check.
//!
//! [`Server::health`](crate::Server::health) answers `GET /healthz` with
//! [`liveness`] before mounts are consulted, unless the application routes
//! that path itself. It can also be registered by hand:
//!
//! ```rust
//! use nope::{Router, health};
//!
//! let app = Router::new().get("/healthz", health::liveness);
//! ```

use http::StatusCode;
use serde::Serialize;

use crate::request::Request;
use crate::response::Response;

/// Path the built-in liveness check is served on.
pub const PATH: &str = "/healthz";

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

/// Always `200 OK` with `{"status":"ok"}`. If the process can answer HTTP at
/// all, it is alive.
pub async fn liveness(_req: Request) -> Response {
    Response::json(StatusCode::OK, &Health { status: "ok" })
}
