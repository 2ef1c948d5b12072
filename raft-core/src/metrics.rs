//! A data set of metrics pertaining to the current state of a Raft node, and a small combinator
//! for waiting on that data set to satisfy some condition — used heavily by tests, but equally
//! applicable to an application observing a node's health.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::raft::MembershipConfig;
use crate::replication::ReplicationMetrics;
use crate::LogId;
use crate::NodeId;
use crate::State;

/// A set of metrics describing the current state of a Raft node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RaftMetrics {
    /// This Raft node's ID.
    pub id: NodeId,
    /// The state of the Raft node.
    pub state: State,
    /// The current term of the Raft node.
    pub current_term: u64,
    /// The last log index to be appended to this Raft node's log.
    pub last_log_index: u64,
    /// The last log index to be applied to this Raft node's state machine.
    pub last_applied: u64,
    /// The current cluster leader, if known.
    pub current_leader: Option<NodeId>,
    /// The current membership config of the cluster.
    pub membership_config: MembershipConfig,
    /// The log id of the most recent snapshot, if any.
    pub snapshot: Option<LogId>,
    /// The metrics about the leader's replication, if this node is the current leader.
    pub leader_metrics: Option<LeaderMetrics>,
}

impl RaftMetrics {
    /// Create a new instance representing the initial state of a Raft node which has not yet
    /// begun its election/replication loop.
    pub fn new_initial(id: NodeId) -> Self {
        Self {
            id,
            state: State::NonVoter,
            current_term: 0,
            last_log_index: 0,
            last_applied: 0,
            current_leader: None,
            membership_config: MembershipConfig::new_initial(id),
            snapshot: None,
            leader_metrics: None,
        }
    }
}

/// Replication metrics tracked only by the current cluster leader.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct LeaderMetrics {
    /// The last known log replicated to each follower, keyed by node ID.
    pub replication: HashMap<NodeId, ReplicationMetrics>,
}

/// A handle for awaiting a `RaftMetrics` update which satisfies some condition, bounded by a
/// timeout.
pub struct Wait {
    pub timeout: Duration,
    pub rx: watch::Receiver<RaftMetrics>,
}

impl Wait {
    /// Wait until the given predicate returns true for a metrics payload, or until the timeout
    /// elapses.
    pub async fn metrics<T>(&self, func: T, msg: &str) -> anyhow::Result<RaftMetrics>
    where T: Fn(&RaftMetrics) -> bool + Send {
        let mut rx = self.rx.clone();

        {
            let initial = rx.borrow();
            if func(&initial) {
                return Ok(initial.clone());
            }
        }

        let fut = async {
            loop {
                if rx.changed().await.is_err() {
                    anyhow::bail!("metrics channel closed while waiting for: {}", msg);
                }
                let snapshot = rx.borrow().clone();
                if func(&snapshot) {
                    return Ok(snapshot);
                }
            }
        };

        timeout(self.timeout, fut).await.map_err(|_| anyhow::anyhow!("timed out waiting for metrics condition: {}", msg))?
    }

    /// Wait for `last_log_index` to reach at least `want_log`.
    pub async fn log(&self, want_log: u64, msg: &str) -> anyhow::Result<RaftMetrics> {
        self.metrics(move |m| m.last_log_index >= want_log, msg).await
    }

    /// Wait for `last_applied` to reach at least `want_log`.
    pub async fn applied_index(&self, want_log: u64, msg: &str) -> anyhow::Result<RaftMetrics> {
        self.metrics(move |m| m.last_applied >= want_log, msg).await
    }

    /// Wait for the node's state to become `want_state`.
    pub async fn state(&self, want_state: State, msg: &str) -> anyhow::Result<RaftMetrics> {
        self.metrics(move |m| m.state == want_state, msg).await
    }

    /// Wait for the node's current leader to become `want_leader`.
    pub async fn current_leader(&self, want_leader: NodeId, msg: &str) -> anyhow::Result<RaftMetrics> {
        self.metrics(move |m| m.current_leader == Some(want_leader), msg).await
    }

    /// Wait for the node's most recent snapshot to reach `want`.
    pub async fn snapshot(&self, want: LogId, msg: &str) -> anyhow::Result<RaftMetrics> {
        self.metrics(move |m| m.snapshot == Some(want), msg).await
    }
}
