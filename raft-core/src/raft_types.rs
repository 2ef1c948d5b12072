//! Primitive identifiers and small shared types used throughout the crate.

use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

/// A Raft node's unique identifier within a cluster.
pub type NodeId = u64;

/// The term/index pair identifying a log entry or a point in the log.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct LogId {
    pub term: u64,
    pub index: u64,
}

impl Display for LogId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.term, self.index)
    }
}

/// Identifies a snapshot across a transfer; distinct snapshots covering the same
/// `last_log_id` still receive distinct ids.
pub type SnapshotId = String;

/// A `(snapshot id, byte offset)` pair used to detect out-of-order `InstallSnapshot` chunks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotSegmentId {
    pub id: SnapshotId,
    pub offset: u64,
}

impl Display for SnapshotSegmentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.offset)
    }
}

/// Marker trait for application-specific data carried by `EntryPayload::Normal`.
pub trait AppData: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Marker trait for the application-specific response to a `ClientWriteRequest`.
pub trait AppDataResponse: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// A terse, single-line, human-readable description of a message, for tracing.
pub trait MessageSummary {
    fn summary(&self) -> String;
}

/// A tri-state update value: either replace with `Update`, or leave as-is with `Ignore`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Update<T> {
    Update(T),
    Ignore,
}

/// Majority-quorum arithmetic shared by election, replication-commit, and the future
/// collector. Kept as free functions since no state is involved — see [`crate::membership`]
/// for the joint-consensus-aware wrapper.
pub mod quorum {
    /// The smallest count that constitutes a majority of `n` voters.
    pub fn majority_of(n: u64) -> u64 {
        (n / 2) + 1
    }

    /// Whether `acks` out of `n` voters constitutes a majority.
    pub fn is_majority(acks: u64, n: u64) -> bool {
        acks >= majority_of(n)
    }
}
