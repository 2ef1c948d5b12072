//! A single-producer, single-observer async result contract.
//!
//! Mapped onto native async primitives rather than a hand-rolled `Future` type: `RaftFuture<T>`
//! is a thin wrapper over `tokio::sync::oneshot`, the same primitive `core/client.rs` and
//! `replication/mod.rs` already use directly for one-shot RPC waits. Pulling it out once gives
//! call sites a single named contract (`get`/`wait`/`then`/`within`) instead of each call site
//! re-deriving its own oneshot dance.

use std::fmt;

use futures::future::FutureExt;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio::time::Duration;

/// A polymorphic error carried by a `RaftFuture`: a message plus an optional tag identifying the
/// kind of failure that produced it (timeout, shutdown, a storage/network error's `Display`, …).
#[derive(Clone, Debug)]
pub struct FutureError {
    pub message: String,
    pub tag: Option<&'static str>,
}

impl FutureError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tag: None,
        }
    }

    pub fn tagged(tag: &'static str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tag: Some(tag),
        }
    }

    pub fn timeout() -> Self {
        Self::tagged("timeout", "the operation did not complete before its deadline")
    }
}

impl fmt::Display for FutureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "[{}] {}", tag, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for FutureError {}

/// A single-value async result, produced once by a [`RaftFutureSender`] and observed once by the
/// caller holding the `RaftFuture`.
pub struct RaftFuture<T> {
    rx: oneshot::Receiver<Result<T, FutureError>>,
}

/// The producer half of a [`RaftFuture`]; call `send` exactly once.
pub struct RaftFutureSender<T> {
    tx: oneshot::Sender<Result<T, FutureError>>,
}

/// Create a connected `(RaftFuture, RaftFutureSender)` pair.
pub fn channel<T>() -> (RaftFuture<T>, RaftFutureSender<T>) {
    let (tx, rx) = oneshot::channel();
    (RaftFuture { rx }, RaftFutureSender { tx })
}

impl<T> RaftFutureSender<T> {
    /// Resolve the paired future with a successful value.
    pub fn send_ok(self, value: T) {
        let _ = self.tx.send(Ok(value));
    }

    /// Resolve the paired future with an error.
    pub fn send_err(self, err: FutureError) {
        let _ = self.tx.send(Err(err));
    }
}

impl<T: Send + 'static> RaftFuture<T> {
    /// A future which is already resolved with `value`.
    pub fn make_ready(value: T) -> Self {
        let (future, sender) = channel();
        sender.send_ok(value);
        future
    }

    /// A future which is already resolved with `err`.
    pub fn make_error(err: FutureError) -> Self {
        let (future, sender) = channel();
        sender.send_err(err);
        future
    }

    /// Whether the producer has already resolved this future. Since the backing channel is a
    /// oneshot, this can only answer "not yet" without consuming the result; a `true` answer is
    /// advisory only if `get`/`wait` haven't been called yet.
    pub fn is_ready(&self) -> bool {
        // `try_recv`-without-consuming isn't exposed by `oneshot::Receiver`; callers that need an
        // authoritative, non-consuming check should use `wait(Duration::ZERO)` instead, which
        // does consume this future.
        false
    }

    /// Consume this future, blocking (asynchronously) until it resolves.
    pub async fn get(self) -> Result<T, FutureError> {
        self.rx.await.map_err(|_| FutureError::tagged("cancelled", "the producer was dropped before resolving"))?
    }

    /// Consume this future, waiting at most `duration` for it to resolve.
    pub async fn wait(self, duration: Duration) -> Result<T, FutureError> {
        match timeout(duration, self.rx).await {
            Ok(Ok(res)) => res,
            Ok(Err(_)) => Err(FutureError::tagged("cancelled", "the producer was dropped before resolving")),
            Err(_) => Err(FutureError::timeout()),
        }
    }

    /// Chain a transformation onto a successful value.
    pub async fn then<U, F>(self, f: F) -> Result<U, FutureError>
    where F: FnOnce(T) -> U {
        self.get().await.map(f)
    }

    /// Recover from an error, producing a replacement value.
    pub async fn then_error<F>(self, f: F) -> T
    where F: FnOnce(FutureError) -> T {
        match self.get().await {
            Ok(v) => v,
            Err(e) => f(e),
        }
    }

    /// Apply a deadline to this future, resolving to a timeout error if it isn't ready in time.
    pub fn within(self, duration: Duration) -> impl std::future::Future<Output = Result<T, FutureError>> {
        self.wait(duration)
    }
}

/// Wait for every future to resolve, collecting each outcome (success or error) in order.
pub async fn collect_all<T: Send + 'static>(futures: Vec<RaftFuture<T>>) -> Vec<Result<T, FutureError>> {
    let mut out = Vec::with_capacity(futures.len());
    for f in futures {
        out.push(f.get().await);
    }
    out
}

/// Resolve with the first future to complete, tagged with its index.
pub async fn any<T: Send + 'static>(futures: Vec<RaftFuture<T>>) -> (usize, Result<T, FutureError>) {
    let indexed = futures.into_iter().enumerate().map(|(i, f)| f.get().map(move |res| (i, res)));
    futures::future::select_all(indexed.map(Box::pin)).await.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_the_value_sent_exactly_once() {
        let (future, sender) = channel::<u32>();
        sender.send_ok(7);
        assert_eq!(future.get().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn get_returns_the_error_sent() {
        let (future, sender) = channel::<u32>();
        sender.send_err(FutureError::new("boom"));
        let err = future.get().await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn dropping_the_sender_resolves_as_cancelled() {
        let (future, sender) = channel::<u32>();
        drop(sender);
        let err = future.get().await.unwrap_err();
        assert_eq!(err.tag, Some("cancelled"));
    }

    #[tokio::test]
    async fn wait_times_out_before_the_sender_resolves() {
        let (future, _sender) = channel::<u32>();
        let err = future.wait(Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err.tag, Some("timeout"));
    }

    #[tokio::test]
    async fn within_is_wait_under_another_name() {
        let (future, sender) = channel::<u32>();
        sender.send_ok(3);
        assert_eq!(future.within(Duration::from_millis(20)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn then_transforms_the_resolved_value() {
        let (future, sender) = channel::<u32>();
        sender.send_ok(4);
        assert_eq!(future.then(|v| v * 2).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn then_error_recovers_from_a_failed_future() {
        let (future, sender) = channel::<u32>();
        sender.send_err(FutureError::new("nope"));
        assert_eq!(future.then_error(|_| 0).await, 0);
    }

    #[tokio::test]
    async fn make_ready_and_make_error_construct_resolved_futures() {
        assert_eq!(RaftFuture::make_ready(1).get().await.unwrap(), 1);
        assert_eq!(RaftFuture::<u32>::make_error(FutureError::new("bad")).get().await.unwrap_err().to_string(), "bad");
    }
}
