//! Error types.
//!
//! - [`Error`] surfaces infrastructure failures: binding a port, parsing the
//!   listen address, or a router that failed to build.
//! - [`RouteError`] is a registration mistake. It is reported while the
//!   router is being built and never at request time.
//! - [`AppError`] is what a handler returns when a request fails. It carries
//!   an HTTP status and a stable machine-readable code, and is written to the
//!   client as a JSON error body.
//!
//! Routing outcomes (404, 405) are not errors at all: they are variants of
//! [`Resolution`](crate::router::Resolution).

use std::borrow::Cow;
use std::collections::BTreeMap;

use http::StatusCode;
use serde::Serialize;

/// Stable code for internal failures, including recovered panics.
pub const CODE_INTERNAL: &str = "internal_error";
/// Client-safe message paired with [`CODE_INTERNAL`].
pub const MSG_INTERNAL: &str = "internal error";
/// Stable code for requests that ran past their deadline.
pub const CODE_TIMEOUT: &str = "timeout";
/// Client-safe message paired with [`CODE_TIMEOUT`].
pub const MSG_TIMEOUT: &str = "request timed out";

/// Boxed error used as the hidden cause of an [`AppError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── Error ─────────────────────────────────────────────────────────────────────

/// The error type returned by nope's fallible infrastructure operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    Addr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("router: {0}")]
    Route(#[from] RouteError),
}

// ── RouteError ────────────────────────────────────────────────────────────────

/// A route or mount that cannot be registered.
///
/// Every variant is a programming mistake. [`Router::finish`] and
/// [`Server::serve`] return the first one recorded, before any request is
/// served.
///
/// [`Router::finish`]: crate::Router::finish
/// [`Server::serve`]: crate::Server::serve
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("pattern `{0}` must start with `/`")]
    MissingLeadingSlash(String),

    #[error("empty parameter name in `{0}`")]
    EmptyParamName(String),

    #[error("empty wildcard name in `{0}`")]
    EmptyWildcardName(String),

    #[error("wildcard must be the last segment in `{0}`")]
    WildcardNotLast(String),

    #[error("wildcard `*{new}` in `{pattern}` conflicts with existing `*{existing}`")]
    WildcardConflict {
        pattern: String,
        existing: String,
        new: String,
    },

    #[error("mount prefix `{0}` must start with `/`")]
    InvalidPrefix(String),

    #[error("mount prefix `{0}` must not end with `/`")]
    TrailingSlashPrefix(String),
}

// ── AppError ──────────────────────────────────────────────────────────────────

/// A request failure that is safe to show to the client.
///
/// The `source`, if any, is kept for logs and observers and never written to
/// the wire.
///
/// ```rust
/// use http::StatusCode;
/// use nope::AppError;
///
/// let err = AppError::new(StatusCode::BAD_REQUEST, "bad_request", "name is required")
///     .with_field("name", "required");
/// assert_eq!(err.code(), "bad_request");
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    status: StatusCode,
    code: Cow<'static, str>,
    message: Cow<'static, str>,
    fields: BTreeMap<String, String>,
    #[source]
    source: Option<BoxError>,
}

impl AppError {
    pub fn new(
        status: StatusCode,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            fields: BTreeMap::new(),
            source: None,
        }
    }

    /// Like [`AppError::new`], keeping `cause` as the error source.
    pub fn wrap(
        cause: impl Into<BoxError>,
        status: StatusCode,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self { source: Some(cause.into()), ..Self::new(status, code, message) }
    }

    /// `500` with code `internal_error`.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, CODE_INTERNAL, MSG_INTERNAL)
    }

    /// An unexpected failure: reported as [`AppError::internal`], with `cause`
    /// kept as the source.
    pub fn unexpected(cause: impl Into<BoxError>) -> Self {
        Self::wrap(cause, StatusCode::INTERNAL_SERVER_ERROR, CODE_INTERNAL, MSG_INTERNAL)
    }

    /// `504` with code `timeout`.
    pub fn timeout() -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, CODE_TIMEOUT, MSG_TIMEOUT)
    }

    /// Adds one entry to the `fields` object of the error body.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn code(&self) -> &str { &self.code }
    pub fn message(&self) -> &str { &self.message }
    pub fn fields(&self) -> &BTreeMap<String, String> { &self.fields }

    pub fn is_timeout(&self) -> bool {
        self.code == CODE_TIMEOUT || self.status == StatusCode::GATEWAY_TIMEOUT
    }

    pub fn is_internal(&self) -> bool {
        self.status.is_server_error() && !self.is_timeout()
    }

    /// The JSON error body: `{"error":{"code":..,"message":..,"fields":{..}}}`.
    pub(crate) fn to_json(&self) -> Vec<u8> {
        let payload = ErrorPayload {
            error: ErrorBody { code: &self.code, message: &self.message, fields: &self.fields },
        };
        serde_json::to_vec(&payload).unwrap_or_else(|_| FALLBACK_BODY.to_vec())
    }
}

/// Any boxed error becomes an opaque `500 internal_error`, so `?` works on
/// foreign errors inside handlers. The cause is kept as the source.
impl From<BoxError> for AppError {
    fn from(cause: BoxError) -> Self {
        Self::unexpected(cause)
    }
}

impl From<std::io::Error> for AppError {
    fn from(cause: std::io::Error) -> Self {
        Self::unexpected(cause)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(cause: serde_json::Error) -> Self {
        Self::unexpected(cause)
    }
}

const FALLBACK_BODY: &[u8] = br#"{"error":{"code":"internal_error","message":"internal error"}}"#;

#[derive(Serialize)]
struct ErrorPayload<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    fields: &'a BTreeMap<String, String>,
}
