//! The wire unit the simulator moves between nodes: an addressed, unordered, best-effort
//! datagram. `connection.rs` builds an ordered, reliable byte stream on top of this.

use raft_core::NodeId;

/// A single simulated datagram.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: u64,
    pub src_addr: NodeId,
    pub src_port: u16,
    pub dst_addr: NodeId,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(
        id: u64,
        src_addr: NodeId,
        src_port: u16,
        dst_addr: NodeId,
        dst_port: u16,
        payload: Vec<u8>,
    ) -> Self {
        Self { id, src_addr, src_port, dst_addr, dst_port, payload }
    }
}
