//! Incoming HTTP request type.

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

use crate::context::Context;
use crate::request_id::RequestId;
use crate::router::Params;

/// An incoming HTTP request with its body already read.
///
/// `path()` is the path the current router sees. Inside a mounted router it
/// has the mount prefix stripped; `uri()` always holds the original.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: Params,
    pub(crate) context: Context,
}

impl Request {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        let path = uri.path().to_owned();
        Self {
            method,
            uri,
            path,
            headers,
            body,
            params: Params::new(),
            context: Context::new(),
        }
    }

    /// Splits an `http::Request` into a `Request`.
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts.method, parts.uri, parts.headers, body)
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn params(&self) -> &Params { &self.params }
    pub fn context(&self) -> &Context { &self.context }

    /// Header value as `&str`, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter, percent-decoded.
    ///
    /// For a route `/users/:name`, `req.param("name")` on `/users/john%20doe`
    /// returns `Some("john doe")`. [`Request::path`] stays as sent.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    /// The id this request is logged under; also echoed as `x-request-id`.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.context.request_id()
    }

    pub(crate) fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}
