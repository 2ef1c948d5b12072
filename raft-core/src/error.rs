//! Error types crossing component boundaries: storage, network, and the public `Raft` API.

use thiserror::Error;

use crate::raft_types::NodeId;
use crate::raft_types::SnapshotSegmentId;
use crate::AppData;

pub type RaftResult<T> = std::result::Result<T, RaftError>;

/// Errors which can come from a `RaftCore`'s internal processing.
#[derive(Debug, Error)]
pub enum RaftError {
    #[error("this node is shutting down")]
    ShuttingDown,

    #[error("error from storage: {0}")]
    RaftStorage(#[from] anyhow::Error),

    #[error("error from the network layer: {0}")]
    RaftNetwork(anyhow::Error),

    #[error("received mismatched snapshot segment, expected {expect}, got {got}")]
    SnapshotMismatch {
        expect: SnapshotSegmentId,
        got: SnapshotSegmentId,
    },

    #[error("invalid configuration: {0:?}")]
    Configuration(Vec<String>),

    #[error("failed to serialize or deserialize a message: {0}")]
    Serialization(String),

    #[error("this node is not the leader, hint={leader_hint:?}")]
    NotLeader { leader_hint: Option<NodeId> },

    #[error("the entry was truncated from the log before it committed; outcome unknown")]
    EntryTruncated,

    #[error("timed out waiting for the entry to commit; outcome unknown, it may still commit later")]
    Timeout,
}

impl From<std::io::Error> for RaftError {
    fn from(e: std::io::Error) -> Self {
        RaftError::RaftStorage(anyhow::Error::from(e))
    }
}

impl Clone for RaftError {
    /// A lossy clone: the two `anyhow::Error`-backed variants carry their original message
    /// forward as a fresh `anyhow::Error`, since `anyhow::Error` itself isn't `Clone`. Needed so
    /// `CommitWaiter::reject_above` can reject every entry above an index with the same error.
    fn clone(&self) -> Self {
        match self {
            RaftError::ShuttingDown => RaftError::ShuttingDown,
            RaftError::RaftStorage(e) => RaftError::RaftStorage(anyhow::anyhow!(e.to_string())),
            RaftError::RaftNetwork(e) => RaftError::RaftNetwork(anyhow::anyhow!(e.to_string())),
            RaftError::SnapshotMismatch { expect, got } => RaftError::SnapshotMismatch {
                expect: expect.clone(),
                got: got.clone(),
            },
            RaftError::Configuration(v) => RaftError::Configuration(v.clone()),
            RaftError::Serialization(s) => RaftError::Serialization(s.clone()),
            RaftError::NotLeader { leader_hint } => RaftError::NotLeader { leader_hint: *leader_hint },
            RaftError::EntryTruncated => RaftError::EntryTruncated,
            RaftError::Timeout => RaftError::Timeout,
        }
    }
}

/// Errors surfaced from `Raft::initialize`.
#[derive(Debug, Error)]
pub enum InitializeError {
    #[error("the cluster is already formed, or this node is not in a state which allows it")]
    NotAllowed,

    #[error(transparent)]
    RaftError(#[from] RaftError),
}

/// Errors surfaced from `Raft::client_read`.
#[derive(Debug, Error)]
pub enum ClientReadError {
    #[error(transparent)]
    RaftError(#[from] RaftError),

    #[error("this node is not the leader, forward to {0:?}")]
    ForwardToLeader(Option<NodeId>),
}

/// Errors surfaced from `Raft::client_write`.
#[derive(Debug, Error)]
pub enum ClientWriteError<D: AppData> {
    #[error(transparent)]
    RaftError(#[from] RaftError),

    #[error("this node is not the leader, forward to {1:?}")]
    ForwardToLeader(D, Option<NodeId>),

    #[error("the entry was truncated from the log before it committed; outcome unknown")]
    EntryTruncated,

    #[error("timed out waiting for the entry to commit; outcome unknown, it may still commit later")]
    Timeout,
}

/// Errors surfaced from `Raft::add_non_voter`/`Raft::change_membership`.
#[derive(Debug, Error)]
pub enum ChangeConfigError {
    #[error(transparent)]
    RaftError(#[from] RaftError),

    #[error("this node is not the leader, hint={0:?}")]
    NodeNotLeader(Option<NodeId>),

    #[error("the requested change is a no-op; target is already a member or already being synced")]
    Noop,

    #[error("a membership change is already in progress")]
    ConfigChangeInProgress,

    #[error("the proposed membership must not be empty")]
    InoperableConfig,

    #[error("node {0} is not a known non-voter; add it first")]
    NonVoterNotFound(NodeId),

    #[error("refusing to remove the cluster's only node")]
    LastNodeInCluster,
}

/// A generic response error used by the few RPCs whose only failure mode is
/// "not leader" or an underlying `ChangeConfigError`.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error(transparent)]
    RaftError(#[from] RaftError),

    #[error(transparent)]
    ChangeConfigError(#[from] ChangeConfigError),
}

/// Transport-level error classification consumed by [`crate::error_handler`]'s retry policy
/// and partition detector.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportErrorKind {
    NetworkTimeout,
    ConnectionRefused,
    NetworkUnreachable,
    TemporaryFailure,
    SerializationError,
    ProtocolError,
    Unknown,
}

impl TransportErrorKind {
    /// Whether the error handler's retry policy should attempt this RPC again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportErrorKind::SerializationError | TransportErrorKind::ProtocolError)
    }

    /// Whether this classification belongs to the "network family" used by partition
    /// detection: timeout, unreachable, refused.
    pub fn is_network_family(&self) -> bool {
        matches!(
            self,
            TransportErrorKind::NetworkTimeout | TransportErrorKind::NetworkUnreachable | TransportErrorKind::ConnectionRefused
        )
    }
}
