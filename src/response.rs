//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Handlers build a [`Response`] (or anything that converts into one) and
//! return it. Two constructors double as the writers every other part of the
//! crate goes through:
//!
//! - [`Response::json`] writes a success payload with a given status.
//! - [`Response::error`] writes an [`AppError`] in the JSON error format and
//!   remembers the error so observers see it.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use serde::Serialize;
use tracing::warn;

use crate::error::AppError;

pub(crate) const JSON: &str = "application/json; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts
///
/// ```rust
/// use http::StatusCode;
/// use nope::{AppError, Response};
///
/// Response::json(StatusCode::OK, &serde_json::json!({ "id": 1 }));
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::error(AppError::new(StatusCode::NOT_FOUND, "not_found", "no such user"));
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use http::StatusCode;
/// use nope::Response;
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(&serde_json::json!({ "id": 42 }));
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) error: Option<AppError>,
}

impl Response {
    /// Serializes `payload` as JSON. A payload that fails to serialize turns
    /// into a 500 `internal_error`.
    #[doc(alias = "WriteSuccess")]
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, payload: &T) -> Self {
        Self::builder().status(status).json(payload)
    }

    /// `200 OK` with a `text/plain; charset=utf-8` body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Bytes::new(), error: None }
    }

    /// The JSON error response for `err`. The error itself is kept and
    /// handed to observers once the response is written.
    #[doc(alias = "WriteError")]
    pub fn error(err: AppError) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON));
        Self {
            status: err.status(),
            headers,
            body: Bytes::from(err.to_json()),
            error: Some(err),
        }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// The error this response reports, if it is an error response.
    pub fn app_error(&self) -> Option<&AppError> {
        self.error.as_ref()
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`. Terminated by a
/// typed body method.
#[derive(Debug)]
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Appends a header. Invalid names or values are logged and skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(name, "skipping invalid response header"),
        }
        self
    }

    /// Terminate with a JSON body.
    pub fn json<T: Serialize + ?Sized>(self, payload: &T) -> Response {
        match serde_json::to_vec(payload) {
            Ok(body) => self.finish(JSON, body.into()),
            Err(e) => Response::error(AppError::unexpected(e)),
        }
    }

    /// Terminate with a plain-text body.
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(TEXT, Bytes::from(body.into()))
    }

    /// Terminate with raw bytes of the given content type.
    pub fn bytes(self, content_type: &'static str, body: impl Into<Bytes>) -> Response {
        self.finish(content_type, body.into())
    }

    /// Terminate with no body (e.g. `204 No Content`, redirects).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Bytes::new(), error: None }
    }

    fn finish(mut self, content_type: &'static str, body: Bytes) -> Response {
        self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Response { status: self.status, headers: self.headers, body, error: None }
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// What a contract handler produced on success.
///
/// Return `Result<Outcome<T>, E>` from a handler, with `E: Into<AppError>`.
///
/// ```rust
/// use nope::{AppError, Outcome, Request};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct User { id: u64 }
///
/// async fn create_user(_req: Request) -> Result<Outcome<User>, AppError> {
///     Ok(Outcome::Created(User { id: 99 }))
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    /// `200` with a JSON body.
    Success(T),
    /// `201` with a JSON body.
    Created(T),
    /// `204`, no body.
    NoContent,
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response { Response::error(self) }
}

impl<T: Serialize> IntoResponse for Outcome<T> {
    fn into_response(self) -> Response {
        match self {
            Outcome::Success(payload) => Response::json(StatusCode::OK, &payload),
            Outcome::Created(payload) => Response::json(StatusCode::CREATED, &payload),
            Outcome::NoContent => Response::status(StatusCode::NO_CONTENT),
        }
    }
}

impl<T, E> IntoResponse for Result<Outcome<T>, E>
where
    T: Serialize,
    E: Into<AppError>,
{
    fn into_response(self) -> Response {
        match self {
            Ok(outcome) => outcome.into_response(),
            Err(err) => Response::error(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn body_json(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[test]
    fn outcomes_map_to_statuses() {
        let ok = Outcome::Success(json!({ "ok": true })).into_response();
        assert_eq!(ok.status_code(), StatusCode::OK);
        assert_eq!(ok.headers()[header::CONTENT_TYPE], JSON);
        assert_eq!(body_json(&ok)["ok"], true);

        let created = Outcome::Created(json!({ "id": 1 })).into_response();
        assert_eq!(created.status_code(), StatusCode::CREATED);

        let empty = Outcome::<()>::NoContent.into_response();
        assert_eq!(empty.status_code(), StatusCode::NO_CONTENT);
        assert!(empty.body().is_empty());
        assert!(empty.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn handler_error_becomes_error_body_and_is_kept() {
        let result: Result<Outcome<()>, AppError> =
            Err(AppError::new(StatusCode::BAD_REQUEST, "bad_request", "bad"));
        let res = result.into_response();
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&res)["error"]["code"], "bad_request");
        assert_eq!(res.app_error().map(AppError::code), Some("bad_request"));
    }

    #[test]
    fn unserializable_payload_is_an_internal_error() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "tuple keys are not JSON object keys");
        let res = Response::json(StatusCode::OK, &map);
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&res)["error"]["code"], "internal_error");
    }

    #[test]
    fn builder_skips_invalid_headers() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/99")
            .header("bad header", "x")
            .no_body();
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.headers()[header::LOCATION], "/users/99");
        assert_eq!(res.headers().len(), 1);
    }
}
