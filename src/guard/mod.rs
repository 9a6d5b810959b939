//! Response lifecycle guard.
//!
//! For one request, three producers may try to write a response:
//!
//! 1. the handler, through its [`ResponseWriter`];
//! 2. the timeout responder, when the context deadline passes first;
//! 3. the panic responder, when the handler task panics.
//!
//! Exactly one of them reaches the sink. The first write of any kind
//! *claims* the response with a compare-and-swap on a single atomic. After
//! that, writes from the losing side are dropped. Dropped body writes still
//! report their full length so unaware callers see no error.
//!
//! ```text
//!            handler write           responder write
//! Unclaimed ───────────────▶ Handler   ─────────────▶ (dropped)
//!     │
//!     └──── responder write ──▶ Responder ── handler write ──▶ (dropped)
//! ```
//!
//! Once the outcome is final the guard closes the sink; later writes are
//! dropped the same way.

mod sink;

pub use sink::{PendingResponse, ResponseBody};

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::StatusCode;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::context::{Cancelled, Context};
use crate::error::AppError;
use crate::observe::{Observer, RequestInfo, ResponseInfo};
use crate::response::Response;
use crate::request_id::X_REQUEST_ID;
use sink::{HeadSlot, Sink};

/// Reported instead of a zero elapsed time.
const MIN_ELAPSED: Duration = Duration::from_nanos(1);

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Claim {
    Unclaimed = 0,
    Handler = 1,
    Responder = 2,
}

/// Per-request state shared by the guard and the handler's writer.
#[derive(Debug)]
struct Shared {
    claim: AtomicU8,
    /// Only changed while the sink's head slot is locked.
    closed: AtomicBool,
    /// 0 until a head is written.
    status: AtomicU16,
    bytes: AtomicU64,
    error: Mutex<Option<AppError>>,
    /// Echoed on every head unless the head already carries one.
    request_id: Option<HeaderValue>,
    sink: Sink,
}

impl Shared {
    fn try_claim(&self, by: Claim) -> bool {
        match self.claim.compare_exchange(
            Claim::Unclaimed as u8,
            by as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(current) => by == Claim::Handler && current == Claim::Handler as u8,
        }
    }

    fn is_unclaimed(&self) -> bool {
        self.claim.load(Ordering::Acquire) == Claim::Unclaimed as u8
    }

    /// Claims for the handler and sends `head()` if no head went out yet.
    ///
    /// The closed check, the claim and the send happen under the head lock,
    /// so the guard can't close the sink between a successful claim and its
    /// head.
    fn commit_handler(&self, head: impl FnOnce() -> (StatusCode, HeaderMap)) -> bool {
        let mut slot = self.sink.lock_head();
        if self.closed.load(Ordering::Acquire) || !self.try_claim(Claim::Handler) {
            return false;
        }
        if slot.is_some() {
            let (status, headers) = head();
            self.send_head_in(&mut slot, status, headers);
        }
        true
    }

    fn write_head(&self, status: StatusCode, headers: HeaderMap) {
        self.send_head_in(&mut self.sink.lock_head(), status, headers);
    }

    fn send_head_in(&self, slot: &mut HeadSlot<'_>, status: StatusCode, mut headers: HeaderMap) {
        if let Some(id) = &self.request_id {
            headers.entry(X_REQUEST_ID).or_insert_with(|| id.clone());
        }
        if sink::send_head_in(slot, status, headers) {
            self.status.store(status.as_u16(), Ordering::Release);
        }
    }

    async fn push_body(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.bytes.fetch_add(chunk.len() as u64, Ordering::AcqRel);
        self.sink.send_data(chunk).await;
    }

    /// Writes a complete response for the responder. The caller must hold
    /// the claim.
    async fn deliver(&self, res: Response) {
        let (status, headers, body, error) = split_response(res);
        if let Some(err) = error {
            self.set_error(err);
        }
        self.write_head(status, headers);
        self.push_body(body).await;
    }

    /// Marks the response final. Once this returns no head can be sent, so
    /// the recorded status is the one on the wire.
    fn seal(&self) {
        let _slot = self.sink.lock_head();
        self.closed.store(true, Ordering::Release);
    }

    fn set_error(&self, err: AppError) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    fn take_error(&self) -> Option<AppError> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn status(&self) -> StatusCode {
        match self.status.load(Ordering::Acquire) {
            0 => StatusCode::OK,
            code => StatusCode::from_u16(code).unwrap_or(StatusCode::OK),
        }
    }
}

/// Splits a response into head parts, adding `content-length` where the
/// status allows a body.
fn split_response(res: Response) -> (StatusCode, HeaderMap, Bytes, Option<AppError>) {
    let Response { status, mut headers, body, error } = res;
    if allows_body(status) && !headers.contains_key(header::CONTENT_LENGTH) {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    }
    (status, headers, body, error)
}

fn allows_body(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The handler's side of the guard.
///
/// Cheap to clone. Every method is safe to call at any time: once the
/// response belongs to the timeout or panic responder, or the guard has
/// closed it, writes are dropped silently.
#[derive(Clone, Debug)]
pub struct ResponseWriter {
    shared: Arc<Shared>,
}

impl ResponseWriter {
    /// Commits status and headers. A second head from the handler is ignored.
    pub fn write_head(&self, status: StatusCode, headers: HeaderMap) {
        if !self.shared.commit_handler(move || (status, headers)) {
            debug!(%status, "dropping head write: response already committed elsewhere");
        }
    }

    /// Writes a body chunk, committing an implicit `200` head first if none
    /// was written. Returns the chunk length, also when the write is dropped.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> usize {
        let chunk = chunk.into();
        let len = chunk.len();
        if !self.shared.commit_handler(|| (StatusCode::OK, HeaderMap::new())) {
            debug!(len, "dropping body write: response already committed elsewhere");
            return len;
        }
        self.shared.push_body(chunk).await;
        len
    }

    /// Writes a complete [`Response`] and records its error, if any.
    pub async fn send(&self, res: Response) {
        let (status, headers, body, error) = split_response(res);
        if !self.shared.commit_handler(move || (status, headers)) {
            debug!(%status, "dropping response: already committed elsewhere");
            return;
        }
        if let Some(err) = error {
            self.shared.set_error(err);
        }
        self.shared.push_body(body).await;
    }

    /// Records an error for observers without writing anything.
    pub fn set_error(&self, err: AppError) {
        self.shared.set_error(err);
    }

    /// Whether any producer has claimed the response.
    pub fn is_committed(&self) -> bool {
        !self.shared.is_unclaimed()
    }
}

// ── ResponseGuard ─────────────────────────────────────────────────────────────

/// How the handler's unit of work ended, as seen by the guard.
enum Completion {
    Finished,
    Panicked(String),
    Cancelled(Cancelled),
}

impl From<Result<(), JoinError>> for Completion {
    fn from(joined: Result<(), JoinError>) -> Self {
        match joined {
            Ok(()) => Self::Finished,
            Err(e) if e.is_panic() => Self::Panicked(panic_message(e.into_panic())),
            // The task was aborted, which only happens on runtime shutdown.
            Err(_) => Self::Cancelled(Cancelled::Canceled),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_owned(),
            Err(_) => "non-string panic payload".to_owned(),
        },
    }
}

/// Owns one request's response from start to end hook.
///
/// ```rust
/// # async fn demo() {
/// use std::sync::Arc;
/// use http::{Method, StatusCode};
/// use nope::{Context, NoopObserver, RequestInfo, Response, ResponseGuard};
///
/// let info = RequestInfo::new(Method::GET, "/");
/// let (guard, writer, pending) = ResponseGuard::new(Context::new(), Arc::new(NoopObserver), info);
/// tokio::spawn(guard.run(async move { writer.send(Response::text("hi")).await }));
/// let res = pending.wait().await.unwrap();
/// assert_eq!(res.status(), StatusCode::OK);
/// # }
/// ```
pub struct ResponseGuard {
    shared: Arc<Shared>,
    ctx: Context,
    observer: Arc<dyn Observer>,
    info: RequestInfo,
    started: Instant,
}

impl ResponseGuard {
    /// Creates the guard, the handler's writer, and the response waiting on
    /// them. Dropping the [`PendingResponse`] (or the body it yields)
    /// cancels `ctx`.
    pub fn new(
        ctx: Context,
        observer: Arc<dyn Observer>,
        info: RequestInfo,
    ) -> (Self, ResponseWriter, PendingResponse) {
        let (sink, pending) = sink::channel(ctx.cancel_on_drop());
        let shared = Arc::new(Shared {
            claim: AtomicU8::new(Claim::Unclaimed as u8),
            closed: AtomicBool::new(false),
            status: AtomicU16::new(0),
            bytes: AtomicU64::new(0),
            error: Mutex::new(None),
            request_id: HeaderValue::from_str(info.request_id.as_str()).ok(),
            sink,
        });
        let writer = ResponseWriter { shared: Arc::clone(&shared) };
        let guard = Self { shared, ctx, observer, info, started: Instant::now() };
        (guard, writer, pending)
    }

    /// Runs `handler` as its own task and races it against the context.
    ///
    /// - handler finished first: its output stands; nothing written means an
    ///   empty `200`.
    /// - deadline first: `504 timeout` if the response is still unclaimed.
    /// - other cancellation first: nothing is written.
    /// - handler panicked: `500 internal_error` if still unclaimed; the
    ///   panic message goes to the log and the panic hook only.
    ///
    /// A handler that outlives the guard keeps running; its writes are
    /// dropped.
    pub async fn run<F>(self, handler: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut task = tokio::spawn(handler);

        let completion = tokio::select! {
            biased;
            joined = &mut task => Completion::from(joined),
            reason = self.ctx.done() => Completion::Cancelled(reason),
        };

        match completion {
            Completion::Finished => {
                // Commits an empty 200 unless something was written.
                self.shared.commit_handler(|| (StatusCode::OK, HeaderMap::new()));
            }
            Completion::Panicked(message) => {
                error!(req_id = %self.info.request_id, method = %self.info.method, path = %self.info.path, panic = %message, "handler panicked");
                self.observer.on_panic(&self.info, &self.ctx, &message);
                self.respond_with(AppError::internal()).await;
            }
            Completion::Cancelled(Cancelled::DeadlineExceeded) => {
                warn!(req_id = %self.info.request_id, method = %self.info.method, path = %self.info.path, "request deadline exceeded");
                self.respond_with(AppError::timeout()).await;
            }
            Completion::Cancelled(Cancelled::Canceled) => {
                debug!(req_id = %self.info.request_id, method = %self.info.method, path = %self.info.path, "request cancelled; no response written");
            }
        }

        self.finish().await;
    }

    /// Writes the error response if the guard can still claim; records the
    /// error either way.
    async fn respond_with(&self, err: AppError) {
        if self.shared.try_claim(Claim::Responder) {
            self.shared.deliver(Response::error(err)).await;
        } else {
            debug!(code = err.code(), "response already committed; recording error only");
            self.shared.set_error(err);
        }
    }

    async fn finish(self) {
        self.shared.seal();

        let elapsed = self.started.elapsed();
        let res = ResponseInfo {
            request_id: self.info.request_id.clone(),
            status: self.shared.status(),
            duration: if elapsed.is_zero() { MIN_ELAPSED } else { elapsed },
            bytes: self.shared.bytes.load(Ordering::Acquire),
            error: self.shared.take_error(),
        };
        self.observer.on_request_end(&self.info, &self.ctx, &res);

        self.shared.sink.close().await;
    }
}
