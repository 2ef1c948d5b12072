//! Quorum-aware future aggregation.
//!
//! `LeaderState::handle_client_read_request`'s `FuturesUnordered`-based fan-out-and-count-acks
//! loop (`core/client.rs`) and `CandidateState::run`'s parallel `RequestVote` fan-out
//! (`core/mod.rs`) both do "send to N peers, stop counting once a majority answers" by hand;
//! this module is that pattern pulled out once, built atop [`crate::future::RaftFuture`] and
//! [`crate::membership::Membership`]'s joint-consensus-aware majority size.

use futures::stream::FuturesUnordered;
use futures::stream::StreamExt;
use tokio::time::timeout;
use tokio::time::Duration;

use crate::future::FutureError;
use crate::future::RaftFuture;

/// Poll `futures` until either `needed` of them resolve successfully, or `deadline` elapses,
/// whichever comes first. Returns every outcome gathered by that point, in completion order.
/// Futures still outstanding when this returns are dropped, which cancels their producers'
/// ability to observe interest in the result: cancelling the aggregate future cancels the
/// outstanding member futures too.
///
/// The leader counts itself toward `needed` before calling this, exactly as
/// `handle_client_read_request` increments `c0_confirmed`/`c1_confirmed` for `self.core.id`
/// before spawning a single outbound RPC.
pub async fn collect_majority<T: Send + 'static>(
    futures: Vec<RaftFuture<T>>,
    needed: usize,
    deadline: Duration,
) -> Vec<Result<T, FutureError>> {
    let mut pending: FuturesUnordered<_> = futures.into_iter().map(|f| f.get()).collect();
    let mut gathered = Vec::with_capacity(pending.len());
    let mut successes = 0usize;

    let gather = async {
        while let Some(res) = pending.next().await {
            if res.is_ok() {
                successes += 1;
            }
            gathered.push(res);
            if successes >= needed {
                break;
            }
        }
    };

    let _ = timeout(deadline, gather).await;
    gathered
}

/// Poll `futures` until every one of them resolves, or `deadline` elapses. Unlike
/// [`collect_majority`], this never short-circuits on quorum; it returns whatever outcomes were
/// gathered (all of them, if the deadline allowed it).
pub async fn collect_all<T: Send + 'static>(futures: Vec<RaftFuture<T>>, deadline: Duration) -> Vec<Result<T, FutureError>> {
    let mut pending: FuturesUnordered<_> = futures.into_iter().map(|f| f.get()).collect();
    let mut gathered = Vec::with_capacity(pending.len());

    let gather = async {
        while let Some(res) = pending.next().await {
            gathered.push(res);
        }
    };

    let _ = timeout(deadline, gather).await;
    gathered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::channel;

    #[tokio::test]
    async fn majority_short_circuits_once_quorum_reached() {
        let (f1, s1) = channel::<u32>();
        let (f2, s2) = channel::<u32>();
        let (f3, s3) = channel::<u32>();
        s1.send_ok(1);
        s2.send_ok(2);
        // s3 never resolves; collect_majority should not wait on it once 2/3 succeed.
        drop(s3);

        let results = collect_majority(vec![f1, f2, f3], 2, Duration::from_millis(200)).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    }

    #[tokio::test]
    async fn majority_returns_partial_on_timeout() {
        let (f1, s1) = channel::<u32>();
        let (f2, _s2) = channel::<u32>();
        s1.send_ok(1);

        let results = collect_majority(vec![f1, f2], 2, Duration::from_millis(20)).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[tokio::test]
    async fn collect_all_waits_for_every_future() {
        let (f1, s1) = channel::<u32>();
        let (f2, s2) = channel::<u32>();
        s1.send_ok(1);
        s2.send_err(FutureError::new("nope"));

        let results = collect_all(vec![f1, f2], Duration::from_millis(200)).await;
        assert_eq!(results.len(), 2);
    }
}
