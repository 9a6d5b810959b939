//! Request lifecycle hooks.
//!
//! An [`Observer`] sees every request three times at most:
//!
//! | Hook | When | Count |
//! |---|---|---|
//! | `on_request_start` | before routing | once |
//! | `on_panic` | the handler panicked | at most once |
//! | `on_request_end` | the response is final | exactly once |
//!
//! `on_request_start` may attach values to the [`Context`]; later hooks and
//! the handler see them. [`TraceObserver`] is the default and logs through
//! `tracing`.

use std::time::Duration;

use http::{Method, StatusCode};
use tracing::{error, info, warn};

use crate::context::Context;
use crate::error::AppError;
use crate::request_id::RequestId;

/// What an observer knows about a request.
#[derive(Clone, Debug)]
pub struct RequestInfo {
    pub method: Method,
    pub path: String,
    pub request_id: RequestId,
}

impl RequestInfo {
    /// Info with a freshly generated request id.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), request_id: RequestId::generate() }
    }
}

/// What an observer knows about the finished response.
#[derive(Debug)]
pub struct ResponseInfo {
    /// Same id as the request; also echoed as `x-request-id`.
    pub request_id: RequestId,
    /// Status on the wire; `200` if nothing was written.
    pub status: StatusCode,
    /// Time from guard creation to the end hook. Never zero.
    pub duration: Duration,
    /// Body bytes accepted from the winning producer.
    pub bytes: u64,
    /// The recorded error, if any.
    pub error: Option<AppError>,
}

/// Lifecycle hooks. Every method defaults to a no-op.
pub trait Observer: Send + Sync + 'static {
    fn on_request_start(&self, _req: &RequestInfo, _ctx: &mut Context) {}

    /// `message` is the panic payload. It is never sent to the client.
    fn on_panic(&self, _req: &RequestInfo, _ctx: &Context, _message: &str) {}

    fn on_request_end(&self, _req: &RequestInfo, _ctx: &Context, _res: &ResponseInfo) {}
}

/// Does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Logs one line per finished request.
///
/// Server errors log at `error`, client errors at `warn`, the rest at `info`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceObserver;

impl Observer for TraceObserver {
    fn on_request_end(&self, req: &RequestInfo, _ctx: &Context, res: &ResponseInfo) {
        let status = res.status.as_u16();
        let elapsed_ms = res.duration.as_secs_f64() * 1000.0;
        let code = res.error.as_ref().map(AppError::code);

        if res.status.is_server_error() {
            error!(req_id = %res.request_id, method = %req.method, path = %req.path, status, elapsed_ms, bytes = res.bytes, code, "request failed");
        } else if res.status.is_client_error() {
            warn!(req_id = %res.request_id, method = %req.method, path = %req.path, status, elapsed_ms, bytes = res.bytes, code, "request rejected");
        } else {
            info!(req_id = %res.request_id, method = %req.method, path = %req.path, status, elapsed_ms, bytes = res.bytes, "request");
        }
    }
}
