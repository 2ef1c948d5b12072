//! The client half of the transport surface: `SimNetwork` implements `raft_core::RaftNetwork`
//! by sending encoded RPC envelopes over a `SimNode` and waiting for the matching reply,
//! carrying a duplicate-suppression token the server side dedups against — the same
//! responsibility a CoAP/HTTP transport would own for suppressing duplicate RPC execution.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::node::SimNode;
use raft_core::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use raft_core::{AppData, NodeId, RaftNetwork};

#[derive(Serialize, Deserialize)]
enum Envelope<D: AppData> {
    AppendEntries { dedup_token: u64, rpc: AppendEntriesRequest<D> },
    Vote { dedup_token: u64, rpc: VoteRequest },
    InstallSnapshot { dedup_token: u64, rpc: InstallSnapshotRequest },
}

#[derive(Serialize, Deserialize)]
enum Reply {
    AppendEntries(AppendEntriesResponse),
    Vote(VoteResponse),
    InstallSnapshot(InstallSnapshotResponse),
    Error(String),
}

/// Maps each peer node id to the fixed port its `NetworkServer` listens on.
pub trait PeerPorts: Send + Sync + 'static {
    fn port_of(&self, target: NodeId) -> u16;
}

/// A `PeerPorts` where every peer listens on the same well-known port.
pub struct FixedPort(pub u16);

impl PeerPorts for FixedPort {
    fn port_of(&self, _target: NodeId) -> u16 {
        self.0
    }
}

/// `raft-core`'s client-side network trait, implemented over the simulator's datagram
/// substrate. Each call allocates a fresh dedup token, sends the encoded request, and awaits a
/// reply addressed back to the ephemeral port it sent from.
pub struct SimNetwork<P: PeerPorts> {
    node: Arc<SimNode>,
    ports: P,
    timeout: Duration,
    next_token: AtomicU64,
}

impl<P: PeerPorts> SimNetwork<P> {
    pub fn new(node: Arc<SimNode>, ports: P, timeout: Duration) -> Self {
        Self { node, ports, timeout, next_token: AtomicU64::new(0) }
    }

    fn alloc_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    async fn call<D: AppData>(&self, target: NodeId, envelope: Envelope<D>) -> anyhow::Result<Reply> {
        let port = self.ports.port_of(target);
        let bytes = serde_json::to_vec(&envelope).context("encoding RPC envelope")?;
        let local_port = self.node.alloc_ephemeral_port().await;
        self.node.send_from(local_port, target, port, bytes).await.map_err(|e| anyhow!(e))?;
        let msg = self
            .node
            .receive_on_port(local_port, self.timeout)
            .await
            .ok_or_else(|| anyhow!("RPC to node {} timed out", target))?;
        serde_json::from_slice(&msg.payload).context("decoding RPC reply")
    }
}

#[async_trait]
impl<D: AppData, P: PeerPorts> RaftNetwork<D> for SimNetwork<P> {
    async fn send_append_entries(
        &self,
        target: NodeId,
        rpc: AppendEntriesRequest<D>,
    ) -> anyhow::Result<AppendEntriesResponse> {
        let envelope = Envelope::AppendEntries { dedup_token: self.alloc_token(), rpc };
        match self.call(target, envelope).await? {
            Reply::AppendEntries(resp) => Ok(resp),
            Reply::Error(msg) => Err(anyhow!(msg)),
            _ => Err(anyhow!("unexpected reply kind for append_entries")),
        }
    }

    async fn send_install_snapshot(
        &self,
        target: NodeId,
        rpc: InstallSnapshotRequest,
    ) -> anyhow::Result<InstallSnapshotResponse> {
        let envelope: Envelope<D> = Envelope::InstallSnapshot { dedup_token: self.alloc_token(), rpc };
        match self.call(target, envelope).await? {
            Reply::InstallSnapshot(resp) => Ok(resp),
            Reply::Error(msg) => Err(anyhow!(msg)),
            _ => Err(anyhow!("unexpected reply kind for install_snapshot")),
        }
    }

    async fn send_vote(&self, target: NodeId, rpc: VoteRequest) -> anyhow::Result<VoteResponse> {
        let envelope: Envelope<D> = Envelope::Vote { dedup_token: self.alloc_token(), rpc };
        match self.call(target, envelope).await? {
            Reply::Vote(resp) => Ok(resp),
            Reply::Error(msg) => Err(anyhow!(msg)),
            _ => Err(anyhow!("unexpected reply kind for vote")),
        }
    }
}
