//! The output sink behind a [`ResponseGuard`](super::ResponseGuard).
//!
//! The head (status + headers) goes through a oneshot channel, so the
//! waiting side can hand hyper a response as soon as it is committed. Body
//! chunks follow through a bounded channel and are streamed by
//! [`ResponseBody`]. An explicit end marker closes the body even while a
//! detached handler still holds a writer.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body::{Body, Frame, SizeHint};
use tokio::sync::{mpsc, oneshot};

use crate::context::CancelOnDrop;

/// Chunks buffered between the writer and hyper before writes wait.
const BODY_BUFFER: usize = 16;

#[derive(Debug)]
pub(crate) struct Head {
    status: StatusCode,
    headers: HeaderMap,
}

#[derive(Debug)]
enum Chunk {
    Data(Bytes),
    End,
}

/// Sending half.
#[derive(Debug)]
pub(crate) struct Sink {
    head: Mutex<Option<oneshot::Sender<Head>>>,
    body: mpsc::Sender<Chunk>,
}

/// Creates a sink and the response waiting on it. Dropping the response or
/// its body fires `cancel`.
pub(crate) fn channel(cancel: CancelOnDrop) -> (Sink, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(BODY_BUFFER);
    let sink = Sink { head: Mutex::new(Some(head_tx)), body: body_tx };
    let body = ResponseBody { rx: body_rx, done: false, _cancel: cancel };
    (sink, PendingResponse { head: head_rx, body })
}

/// Exclusive access to the unsent head. Whoever holds it decides whether a
/// head goes out; [`Sink::close`] waits for it.
pub(crate) type HeadSlot<'a> = MutexGuard<'a, Option<oneshot::Sender<Head>>>;

impl Sink {
    pub(crate) fn lock_head(&self) -> HeadSlot<'_> {
        self.head.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) async fn send_data(&self, chunk: Bytes) {
        let _ = self.body.send(Chunk::Data(chunk)).await;
    }

    /// Ends the body and abandons an unsent head, so the waiting side sees
    /// "no response".
    pub(crate) async fn close(&self) {
        drop(self.lock_head().take());
        let _ = self.body.send(Chunk::End).await;
    }
}

/// Sends the head through a locked slot. Returns `false` if a head was
/// already sent or the sink is closed.
pub(crate) fn send_head_in(slot: &mut HeadSlot<'_>, status: StatusCode, headers: HeaderMap) -> bool {
    let Some(tx) = slot.take() else {
        return false;
    };
    // A dropped receiver means nobody waits for the response any more;
    // the head still counts as written.
    let _ = tx.send(Head { status, headers });
    true
}

/// Receiving half: resolves once a head is committed.
#[derive(Debug)]
pub struct PendingResponse {
    head: oneshot::Receiver<Head>,
    body: ResponseBody,
}

impl PendingResponse {
    /// Waits for the head. `None` means no response will be written and the
    /// connection should be closed.
    pub async fn wait(self) -> Option<http::Response<ResponseBody>> {
        let head = self.head.await.ok()?;
        let mut res = http::Response::new(self.body);
        *res.status_mut() = head.status;
        *res.headers_mut() = head.headers;
        Some(res)
    }
}

/// Streaming response body fed by the guard.
#[derive(Debug)]
pub struct ResponseBody {
    rx: mpsc::Receiver<Chunk>,
    done: bool,
    _cancel: CancelOnDrop,
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        if self.done {
            return Poll::Ready(None);
        }
        match ready!(self.rx.poll_recv(cx)) {
            Some(Chunk::Data(bytes)) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            Some(Chunk::End) | None => {
                self.done = true;
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }

    fn size_hint(&self) -> SizeHint {
        if self.done { SizeHint::with_exact(0) } else { SizeHint::default() }
    }
}
