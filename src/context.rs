//! Request context: deadline, cancellation, and request-scoped values.
//!
//! Every request gets a fresh [`Context`]. Handlers reach it through
//! [`Request::context`](crate::Request::context) and should await
//! [`Context::done`] alongside slow downstream I/O so they stop promptly. The
//! guard never aborts a handler; it only decides what reaches the wire.

use std::sync::Arc;
use std::time::Duration;

use http::Extensions;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::request_id::RequestId;

/// Why a context finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cancelled {
    /// The deadline passed. The guard answers with `504 timeout`.
    DeadlineExceeded,
    /// Cancelled for any other reason, typically the client went away. No
    /// response is written.
    Canceled,
}

/// Deadline + cancellation signal + typed request-scoped values.
///
/// Clones share the cancellation signal; extensions are copied.
#[derive(Clone, Debug)]
pub struct Context {
    signal: Arc<watch::Sender<Option<Cancelled>>>,
    deadline: Option<Instant>,
    extensions: Extensions,
}

impl Context {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { signal: Arc::new(tx), deadline: None, extensions: Extensions::new() }
    }

    /// Sets the deadline to `now + timeout`, unless an earlier one is set.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets the deadline, unless an earlier one is set.
    pub fn with_deadline(mut self, at: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current <= at => current,
            _ => at,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels the context. The first reason recorded sticks.
    pub fn cancel(&self) {
        cancel(&self.signal);
    }

    /// Returns the reason if the context is already finished.
    pub fn err(&self) -> Option<Cancelled> {
        if let Some(reason) = *self.signal.borrow() {
            return Some(reason);
        }
        match self.deadline {
            Some(at) if Instant::now() >= at => Some(Cancelled::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the deadline passes or the context is cancelled.
    pub async fn done(&self) -> Cancelled {
        let mut rx = self.signal.subscribe();
        let cancelled = async move {
            // Copy the reason out so the watch borrow is not held across an await.
            let reason = rx
                .wait_for(Option::is_some)
                .await
                .ok()
                .map(|r| (*r).unwrap_or(Cancelled::Canceled));
            match reason {
                Some(reason) => reason,
                None => std::future::pending().await,
            }
        };

        match self.deadline {
            Some(at) => tokio::select! {
                reason = cancelled => reason,
                () = tokio::time::sleep_until(at) => Cancelled::DeadlineExceeded,
            },
            None => cancelled.await,
        }
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Set for every request served by a [`Service`](crate::Service).
    pub fn request_id(&self) -> Option<&RequestId> {
        self.extensions.get::<RequestId>()
    }

    /// Cancels this context when the returned value is dropped.
    pub(crate) fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop(Arc::clone(&self.signal))
    }
}

impl Default for Context {
    fn default() -> Self { Self::new() }
}

fn cancel(signal: &watch::Sender<Option<Cancelled>>) {
    signal.send_if_modified(|reason| {
        if reason.is_some() {
            return false;
        }
        *reason = Some(Cancelled::Canceled);
        true
    });
}

/// Tied to the lifetime of whatever is waiting on the response. When hyper
/// drops it, the client is gone.
#[derive(Debug)]
pub(crate) struct CancelOnDrop(Arc<watch::Sender<Option<Cancelled>>>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        cancel(&self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_reports_deadline_exceeded() {
        let ctx = Context::new().with_timeout(Duration::from_secs(1));
        assert_eq!(ctx.err(), None);
        assert_eq!(ctx.done().await, Cancelled::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(Cancelled::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_wins_over_a_later_deadline() {
        let ctx = Context::new().with_timeout(Duration::from_secs(60));
        let clone = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            clone.cancel();
        });
        assert_eq!(ctx.done().await, Cancelled::Canceled);
    }

    #[tokio::test]
    async fn dropping_the_guard_cancels() {
        let ctx = Context::new();
        drop(ctx.cancel_on_drop());
        assert_eq!(ctx.err(), Some(Cancelled::Canceled));
        assert_eq!(ctx.done().await, Cancelled::Canceled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn done_can_be_awaited_from_a_spawned_task() {
        let ctx = Context::new().with_timeout(Duration::from_secs(60));
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.done().await });
        ctx.cancel();
        assert_eq!(task.await.unwrap(), Cancelled::Canceled);
    }

    #[test]
    fn earliest_deadline_is_kept() {
        let now = Instant::now();
        let ctx = Context::new()
            .with_deadline(now + Duration::from_secs(5))
            .with_deadline(now + Duration::from_secs(10));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(5)));
    }

    #[test]
    fn extensions_travel_with_clones() {
        let mut ctx = Context::new();
        ctx.extensions_mut().insert(7u32);
        let clone = ctx.clone();
        assert_eq!(clone.extensions().get::<u32>(), Some(&7));
    }
}
