//! Runtime configuration for a `RaftCore`, and the field-by-field validation invariants that
//! keep the timer and RPC budgets internally consistent.
//!
//! Construction follows a builder idiom: `Config::build(cluster_name)` returns a builder
//! pre-populated with defaults, and `.validate()` consumes it, returning a `ConfigError`
//! describing every violated invariant at once rather than failing on the first one.

use std::sync::Arc;

use rand::thread_rng;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// How a follower's log is compacted into a snapshot.
///
/// `LogsSinceLast` is currently the only policy: once more than the given number
/// of log entries have been applied since the last snapshot, compaction is
/// triggered. Kept as an enum (not a bare `u64`) so new policies can be added
/// without changing the `RaftCore`/`ReplicationStream` call sites that match on it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SnapshotPolicy {
    LogsSinceLast(u64),
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        SnapshotPolicy::LogsSinceLast(5000)
    }
}

/// All configuration errors discovered while validating a `ConfigBuilder`, joined
/// into a single reportable value.
#[derive(Clone, Debug, Error)]
#[error("invalid Raft config: {}", .0.join("; "))]
pub struct ConfigError(pub Vec<String>);

/// Runtime configuration for a Raft node.
///
/// Durations are stored in milliseconds as raw `u64`s, converted to `Duration::from_millis` at
/// each call site rather than threading `std::time::Duration` through every field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Identifies the cluster this node belongs to; surfaced in tracing spans and
    /// used by transports which multiplex several clusters over one socket.
    pub cluster_name: String,

    /// Lower bound, in milliseconds, of the randomized election timeout range.
    pub election_timeout_min: u64,
    /// Upper bound, in milliseconds, of the randomized election timeout range.
    pub election_timeout_max: u64,

    /// Interval, in milliseconds, between leader heartbeats.
    pub heartbeat_interval: u64,

    /// Per-RPC timeout for `AppendEntries`, in milliseconds.
    pub append_entries_timeout: u64,
    /// Per-RPC timeout for `RequestVote`, in milliseconds.
    pub request_vote_timeout: u64,
    /// Per-RPC timeout for `InstallSnapshot`, in milliseconds.
    pub install_snapshot_timeout: u64,
    /// Default RPC timeout used where no operation-specific timeout applies
    /// (e.g. the leadership-confirmation heartbeats sent for a client read).
    pub rpc_timeout: u64,

    /// Maximum number of log entries sent in a single `AppendEntries` payload.
    pub max_payload_entries: u64,
    /// Maximum size, in bytes, of a single `InstallSnapshot` chunk.
    pub snapshot_max_chunk_size: u64,

    /// Policy governing when a node compacts its log into a new snapshot.
    pub snapshot_policy: SnapshotPolicy,

    /// Replication lag, in log entries, beyond which a follower is considered
    /// behind enough to warrant snapshot-based catch-up instead of replaying
    /// individual entries.
    pub replication_lag_threshold: u64,
}

impl Config {
    /// Begin building a new config for the given cluster, pre-populated with sane defaults
    /// (`election_timeout` 150-300ms, heartbeat well under a third of the minimum election
    /// timeout).
    pub fn build(cluster_name: String) -> ConfigBuilder {
        ConfigBuilder {
            cluster_name,
            election_timeout_min: 150,
            election_timeout_max: 300,
            heartbeat_interval: 50,
            append_entries_timeout: 300,
            request_vote_timeout: 200,
            install_snapshot_timeout: 300,
            rpc_timeout: 300,
            max_payload_entries: 300,
            snapshot_max_chunk_size: 3 * 1024 * 1024,
            snapshot_policy: SnapshotPolicy::default(),
            replication_lag_threshold: 1000,
        }
    }

    /// Draw a new randomized election timeout, in milliseconds, uniformly from
    /// `[election_timeout_min, election_timeout_max)`.
    pub fn new_rand_election_timeout(&self) -> u64 {
        thread_rng().gen_range(self.election_timeout_min, self.election_timeout_max)
    }
}

/// Mutable staging area for a [`Config`]; every field mirrors `Config` 1:1 so a
/// caller can override exactly the defaults it cares about before calling
/// [`ConfigBuilder::validate`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    pub cluster_name: String,
    pub election_timeout_min: u64,
    pub election_timeout_max: u64,
    pub heartbeat_interval: u64,
    pub append_entries_timeout: u64,
    pub request_vote_timeout: u64,
    pub install_snapshot_timeout: u64,
    pub rpc_timeout: u64,
    pub max_payload_entries: u64,
    pub snapshot_max_chunk_size: u64,
    pub snapshot_policy: SnapshotPolicy,
    pub replication_lag_threshold: u64,
}

impl ConfigBuilder {
    pub fn election_timeout_min(mut self, v: u64) -> Self {
        self.election_timeout_min = v;
        self
    }

    pub fn election_timeout_max(mut self, v: u64) -> Self {
        self.election_timeout_max = v;
        self
    }

    pub fn heartbeat_interval(mut self, v: u64) -> Self {
        self.heartbeat_interval = v;
        self
    }

    pub fn append_entries_timeout(mut self, v: u64) -> Self {
        self.append_entries_timeout = v;
        self
    }

    pub fn request_vote_timeout(mut self, v: u64) -> Self {
        self.request_vote_timeout = v;
        self
    }

    pub fn install_snapshot_timeout(mut self, v: u64) -> Self {
        self.install_snapshot_timeout = v;
        self
    }

    pub fn rpc_timeout(mut self, v: u64) -> Self {
        self.rpc_timeout = v;
        self
    }

    pub fn max_payload_entries(mut self, v: u64) -> Self {
        self.max_payload_entries = v;
        self
    }

    pub fn snapshot_max_chunk_size(mut self, v: u64) -> Self {
        self.snapshot_max_chunk_size = v;
        self
    }

    pub fn snapshot_policy(mut self, v: SnapshotPolicy) -> Self {
        self.snapshot_policy = v;
        self
    }

    pub fn replication_lag_threshold(mut self, v: u64) -> Self {
        self.replication_lag_threshold = v;
        self
    }

    /// Validate every field's invariants, collecting all violations instead of bailing out on
    /// the first.
    pub fn validate(self) -> Result<Config, ConfigError> {
        let mut errors = Vec::new();

        if self.election_timeout_min == 0 {
            errors.push("election_timeout_min must be > 0".into());
        }
        if self.election_timeout_max <= self.election_timeout_min {
            errors.push("election_timeout_max must be > election_timeout_min".into());
        }
        if self.heartbeat_interval > self.election_timeout_min / 3 {
            errors.push("heartbeat_interval must be <= election_timeout_min / 3".into());
        }
        if self.append_entries_timeout == 0 {
            errors.push("append_entries_timeout must be > 0".into());
        }
        if self.request_vote_timeout == 0 {
            errors.push("request_vote_timeout must be > 0".into());
        }
        if self.install_snapshot_timeout < self.append_entries_timeout {
            errors.push("install_snapshot_timeout must be >= append_entries_timeout".into());
        }
        if self.rpc_timeout == 0 {
            errors.push("rpc_timeout must be > 0".into());
        }
        if self.max_payload_entries == 0 {
            errors.push("max_payload_entries must be > 0".into());
        }
        if self.snapshot_max_chunk_size == 0 {
            errors.push("snapshot_max_chunk_size must be > 0".into());
        }

        if !errors.is_empty() {
            return Err(ConfigError(errors));
        }

        Ok(Config {
            cluster_name: self.cluster_name,
            election_timeout_min: self.election_timeout_min,
            election_timeout_max: self.election_timeout_max,
            heartbeat_interval: self.heartbeat_interval,
            append_entries_timeout: self.append_entries_timeout,
            request_vote_timeout: self.request_vote_timeout,
            install_snapshot_timeout: self.install_snapshot_timeout,
            rpc_timeout: self.rpc_timeout,
            max_payload_entries: self.max_payload_entries,
            snapshot_max_chunk_size: self.snapshot_max_chunk_size,
            snapshot_policy: self.snapshot_policy,
            replication_lag_threshold: self.replication_lag_threshold,
        })
    }
}

/// Convenience alias used at construction sites that build a `Raft` immediately.
pub type SharedConfig = Arc<Config>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::build("test".into()).validate().expect("defaults must be valid");
    }

    #[test]
    fn rejects_heartbeat_too_close_to_election_timeout() {
        let err = Config::build("test".into())
            .heartbeat_interval(200)
            .validate()
            .expect_err("heartbeat_interval > election_timeout_min/3 must be rejected");
        assert!(err.0.iter().any(|m| m.contains("heartbeat_interval")));
    }

    #[test]
    fn rejects_install_snapshot_timeout_below_append_entries_timeout() {
        let err = Config::build("test".into())
            .install_snapshot_timeout(10)
            .validate()
            .expect_err("install_snapshot_timeout < append_entries_timeout must be rejected");
        assert!(err.0.iter().any(|m| m.contains("install_snapshot_timeout")));
    }
}
