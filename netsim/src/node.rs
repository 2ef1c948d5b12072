//! A handle to one simulated node: its inbox, its bound ports, and the connections it has open.
//! Returned by [`crate::simulator::NetworkSimulator::create_node`].

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::datagram::Message;
use crate::simulator::{NetworkSimulator, RouteError};
use raft_core::NodeId;

pub struct SimNode {
    id: NodeId,
    sim: NetworkSimulator,
    inbox: Mutex<tokio::sync::mpsc::UnboundedReceiver<Message>>,
    /// Messages pulled off `inbox` by `receive_on_port` for a different port than the caller
    /// asked for, held until someone asks for that port (or for "any port").
    pending: Mutex<VecDeque<Message>>,
    bound_ports: Mutex<HashSet<u16>>,
    next_ephemeral_port: Mutex<u16>,
}

impl SimNode {
    pub(crate) fn new(
        id: NodeId,
        sim: NetworkSimulator,
        inbox: tokio::sync::mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        Self {
            id,
            sim,
            inbox: Mutex::new(inbox),
            pending: Mutex::new(VecDeque::new()),
            bound_ports: Mutex::new(HashSet::new()),
            next_ephemeral_port: Mutex::new(49152),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn simulator(&self) -> &NetworkSimulator {
        &self.sim
    }

    /// Reserves `port` for exclusive use by this node (a listener, typically). Returns `false`
    /// if it's already bound.
    pub async fn bind_port(&self, port: u16) -> bool {
        self.bound_ports.lock().await.insert(port)
    }

    pub async fn release_port(&self, port: u16) {
        self.bound_ports.lock().await.remove(&port);
    }

    pub async fn is_port_bound(&self, port: u16) -> bool {
        self.bound_ports.lock().await.contains(&port)
    }

    /// Hands out a source port for an outbound connection attempt, from the ephemeral range.
    pub async fn alloc_ephemeral_port(&self) -> u16 {
        let mut next = self.next_ephemeral_port.lock().await;
        let port = *next;
        *next = next.checked_add(1).unwrap_or(49152);
        port
    }

    pub async fn send(&self, dst: NodeId, dst_port: u16, payload: Vec<u8>) -> Result<(), RouteError> {
        self.send_from(0, dst, dst_port, payload).await
    }

    pub async fn send_from(
        &self,
        src_port: u16,
        dst: NodeId,
        dst_port: u16,
        payload: Vec<u8>,
    ) -> Result<(), RouteError> {
        self.sim.route(self.id, src_port, dst, dst_port, payload)
    }

    /// Pushes `msg` back onto the front of the pending buffer, for a caller that pulled it off
    /// `receive_on_port` but determined it belongs to someone else sharing the same port (e.g.
    /// a different connection's frame).
    pub async fn requeue(&self, msg: Message) {
        self.pending.lock().await.push_front(msg);
    }

    /// Returns the next message addressed to any port on this node, or `None` on timeout.
    pub async fn receive(&self, timeout: Duration) -> Option<Message> {
        {
            let mut pending = self.pending.lock().await;
            if let Some(msg) = pending.pop_front() {
                return Some(msg);
            }
        }
        let mut inbox = self.inbox.lock().await;
        tokio::time::timeout(timeout, inbox.recv()).await.ok().flatten()
    }

    /// Returns the next message addressed to `port` on this node, buffering (not discarding)
    /// any other-port messages it has to skip past in the meantime.
    pub async fn receive_on_port(&self, port: u16, timeout: Duration) -> Option<Message> {
        {
            let mut pending = self.pending.lock().await;
            if let Some(pos) = pending.iter().position(|m| m.dst_port == port) {
                return pending.remove(pos);
            }
        }
        let deadline = tokio::time::Instant::now() + timeout;
        let mut inbox = self.inbox.lock().await;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, inbox.recv()).await {
                Ok(Some(msg)) if msg.dst_port == port => return Some(msg),
                Ok(Some(msg)) => {
                    self.pending.lock().await.push_back(msg);
                    if remaining.is_zero() {
                        return None;
                    }
                }
                Ok(None) | Err(_) => return None,
            }
        }
    }
}
