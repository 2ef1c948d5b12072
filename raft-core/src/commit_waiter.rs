//! A per-node registry of client submissions awaiting commit and apply.
//!
//! `LeaderState::awaiting_committed: Vec<ClientRequestEntry<D, R>>` (see `core/client.rs`,
//! `core/replication.rs`) keeps this as an ad hoc vector keyed implicitly by
//! `entry.log_id.index`; this module is the same bookkeeping pulled into a standalone registry:
//! one outstanding registration per index, callbacks invoked exactly once, with an explicit
//! per-entry deadline so a leader that loses its quorum doesn't leave submitters waiting
//! forever.

use std::collections::BTreeMap;

use tokio::time::Duration;
use tokio::time::Instant;

use crate::error::RaftError;

type FulfillCb<R> = Box<dyn FnOnce(R) + Send>;
type RejectCb = Box<dyn FnOnce(RaftError) + Send>;

struct Waiter<R> {
    fulfill: FulfillCb<R>,
    reject: RejectCb,
    deadline: Instant,
}

/// Registry of pending commit waiters, keyed by log index.
///
/// Not `Sync`; a `CommitWaiter` is owned by the single task driving a leader's state, matching
/// the crate's single-logical-thread-per-node discipline.
pub struct CommitWaiter<R> {
    pending: BTreeMap<u64, Waiter<R>>,
}

impl<R> Default for CommitWaiter<R> {
    fn default() -> Self {
        Self {
            pending: BTreeMap::new(),
        }
    }
}

impl<R> CommitWaiter<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `log_index`'s eventual commit. Replaces (and immediately rejects
    /// with `RaftError::ShuttingDown`) any prior registration for the same index: at most one
    /// registration per index is live on the leader at a time.
    pub fn register<F, G>(&mut self, log_index: u64, fulfill_cb: F, reject_cb: G, timeout: Duration)
    where
        F: FnOnce(R) + Send + 'static,
        G: FnOnce(RaftError) + Send + 'static,
    {
        let waiter = Waiter {
            fulfill: Box::new(fulfill_cb),
            reject: Box::new(reject_cb),
            deadline: Instant::now() + timeout,
        };
        if let Some(prev) = self.pending.insert(log_index, waiter) {
            (prev.reject)(RaftError::ShuttingDown);
        }
    }

    /// Fulfill the registration for `log_index`, if any, with `result`. A no-op if nothing is
    /// registered at that index (e.g. a non-leader applying entries it never waited on).
    pub fn fulfill(&mut self, log_index: u64, result: R) {
        if let Some(waiter) = self.pending.remove(&log_index) {
            (waiter.fulfill)(result);
        }
    }

    /// Reject every registration with `index >= from_index` with `err`, and remove them. Used
    /// when a higher-term leader overrules uncommitted entries the local node had appended as
    /// leader and is now truncating.
    pub fn reject_above(&mut self, from_index: u64, err: RaftError) {
        let stale: Vec<u64> = self.pending.range(from_index..).map(|(k, _)| *k).collect();
        for index in stale {
            if let Some(waiter) = self.pending.remove(&index) {
                (waiter.reject)(err.clone());
            }
        }
    }

    /// Reject and remove every registration whose deadline has passed, returning the count
    /// rejected, with `RaftError::Timeout` — distinct from `EntryTruncated`, since the
    /// underlying log entry is not rolled back by this call; it only tells the submitter that
    /// the outcome is no longer known locally and the entry may still commit later.
    pub fn cancel_timed_out(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, w)| w.deadline <= now)
            .map(|(k, _)| *k)
            .collect();
        let count = expired.len();
        for index in expired {
            if let Some(waiter) = self.pending.remove(&index) {
                (waiter.reject)(RaftError::Timeout);
            }
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Reject every outstanding registration, e.g. on node shutdown.
    pub fn reject_all(&mut self, err: RaftError) {
        for (_, waiter) in std::mem::take(&mut self.pending) {
            (waiter.reject)(err.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn fulfill_invokes_callback_exactly_once_and_clears_registration() {
        let mut waiter: CommitWaiter<&'static str> = CommitWaiter::new();
        let (tx, rx) = mpsc::channel();
        waiter.register(1, move |r: &'static str| tx.send(r).unwrap(), |_| panic!("must not reject"), Duration::from_secs(10));
        assert_eq!(waiter.pending_count(), 1);

        waiter.fulfill(1, "applied");
        assert_eq!(rx.try_recv().unwrap(), "applied");
        assert_eq!(waiter.pending_count(), 0);

        // Fulfilling an index with no registration is a no-op, not a panic.
        waiter.fulfill(1, "stale");
    }

    #[test]
    fn reject_above_clears_only_indices_at_or_past_the_cutoff() {
        let mut waiter: CommitWaiter<()> = CommitWaiter::new();
        let (tx, rx) = mpsc::channel();
        for index in [5, 6, 7] {
            let tx = tx.clone();
            waiter.register(index, |_| panic!("must not fulfill"), move |e| tx.send((index, e.to_string())).unwrap(), Duration::from_secs(10));
        }

        waiter.reject_above(6, RaftError::EntryTruncated);

        let mut rejected: Vec<u64> = rx.try_iter().map(|(i, _)| i).collect();
        rejected.sort_unstable();
        assert_eq!(rejected, vec![6, 7]);
        assert_eq!(waiter.pending_count(), 1);
        waiter.fulfill(5, ());
    }

    #[test]
    fn cancel_timed_out_rejects_with_timeout_not_truncation() {
        let mut waiter: CommitWaiter<()> = CommitWaiter::new();
        let (tx, rx) = mpsc::channel();
        waiter.register(1, |_| panic!("must not fulfill"), move |e| tx.send(e.to_string()).unwrap(), Duration::from_millis(0));

        std::thread::sleep(Duration::from_millis(5));
        let count = waiter.cancel_timed_out();

        assert_eq!(count, 1);
        assert_eq!(waiter.pending_count(), 0);
        let message = rx.try_recv().unwrap();
        assert!(message.contains("outcome unknown"), "expected a timeout message, got: {}", message);
        assert!(!message.contains("truncated"), "timeout must not be reported as truncation, got: {}", message);
    }

    #[test]
    fn cancel_timed_out_leaves_unexpired_registrations_pending() {
        let mut waiter: CommitWaiter<()> = CommitWaiter::new();
        waiter.register(1, |_| panic!("must not fulfill"), |_| panic!("must not reject"), Duration::from_secs(10));

        let count = waiter.cancel_timed_out();

        assert_eq!(count, 0);
        assert_eq!(waiter.pending_count(), 1);
    }

    #[test]
    fn re_registering_an_index_rejects_the_prior_registration() {
        let mut waiter = CommitWaiter::new();
        let (tx, rx) = mpsc::channel();
        waiter.register(1, |_: ()| panic!("must not fulfill"), move |e| tx.send(e.to_string()).unwrap(), Duration::from_secs(10));

        waiter.register(1, |_| (), |_| panic!("must not reject"), Duration::from_secs(10));

        assert!(rx.try_recv().is_ok(), "the first registration must be rejected when replaced");
        assert_eq!(waiter.pending_count(), 1);
    }
}
