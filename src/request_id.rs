//! Request IDs.
//!
//! Every request carries a [`RequestId`]. An inbound `x-request-id` header is
//! reused; otherwise a random 32-hex-digit id is generated. The id is stored
//! in the request [`Context`](crate::Context), echoed on the response head,
//! and handed to every observer hook.

use std::fmt;

use http::header::{HeaderMap, HeaderName};
use uuid::Uuid;

/// Header the id is read from and echoed on.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Correlates everything logged about one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// A fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// The inbound `x-request-id` if it is non-empty visible ASCII, else a
    /// fresh id.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Self(id.to_owned()))
            .unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
