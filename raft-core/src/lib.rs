//! `raft-core` implements the Raft consensus protocol (leader election, log replication,
//! commit advancement, membership changes, and snapshot installation) as a generic state
//! machine abstracted over a transport, a persistence engine, a serializer, and an
//! application state machine.
//!
//! The crate is organized the way the protocol itself is layered:
//!
//! - [`raft_types`] / [`raft`] — the shared data model: node ids, log ids, RPC messages,
//!   membership configuration.
//! - [`network`] / [`storage`] — the capability traits ([`RaftNetwork`], [`RaftStorage`])
//!   that callers implement to plug in a transport and a persistence engine.
//! - [`future`] — the single-producer async result contract used at every RPC boundary.
//! - [`commit_waiter`] / [`collector`] — the per-index promise registry and the
//!   quorum-aware future aggregator used by a leader to resolve client writes.
//! - [`membership`] — joint-consensus-aware quorum arithmetic shared by election,
//!   replication-commit, and the future collector.
//! - [`error_handler`] — transport-error classification, retry policy, and partition
//!   detection, for callers building a production `RaftNetwork` on top of an unreliable
//!   transport.
//! - [`core`] — `RaftCore`, the node's role state machine and RPC handling; this is the
//!   hard center of the crate.
//! - [`config`] / [`error`] / [`metrics`] — runtime configuration, error taxonomy, and the
//!   metrics/observability surface.

pub mod collector;
pub mod commit_waiter;
pub mod config;
pub mod core;
pub mod error;
pub mod error_handler;
pub mod future;
pub mod membership;
pub mod metrics;
pub mod network;
pub mod raft;
mod raft_types;
pub mod replication;
pub mod serde_support;
pub mod storage;

pub use async_trait;
pub use config::Config;
pub use config::SnapshotPolicy;
pub use core::RaftCore;
pub use core::State;
pub use error::RaftError;
pub use error::RaftResult;
pub use metrics::RaftMetrics;
pub use network::RaftNetwork;
pub use raft::Raft;
pub use raft_types::quorum;
pub use raft_types::AppData;
pub use raft_types::AppDataResponse;
pub use raft_types::LogId;
pub use raft_types::MessageSummary;
pub use raft_types::NodeId;
pub use raft_types::SnapshotId;
pub use raft_types::SnapshotSegmentId;
pub use raft_types::Update;
pub use replication::ReplicationMetrics;
pub use storage::RaftStorage;
pub use storage::RaftStorageDebug;
pub use storage::SnapshotMeta;
