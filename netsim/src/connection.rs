//! An ordered, reliable, connection-oriented byte stream layered over the unordered,
//! best-effort datagram substrate in `datagram.rs`.
//!
//! Grounded in `examples/connection_oriented.cpp`'s `bind`/`connect`/`accept`/`read`/`write`
//! API shape and its `Connecting`/`Open`/`Closing`/`Closed` lifecycle; the three-way handshake
//! and per-frame acknowledgement are this crate's Rust expression of that same contract over
//! `SimNode` datagrams.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::node::SimNode;
use raft_core::NodeId;

const RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(50);
const MAX_RETRIES: u32 = 5;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("connection attempt timed out")]
    HandshakeTimeout,
    #[error("no route to the remote node")]
    NoRoute,
    #[error("retransmission limit exceeded")]
    RetriesExhausted,
    #[error("the connection is closed")]
    Closed,
}

impl From<crate::simulator::RouteError> for ConnectionError {
    fn from(_: crate::simulator::RouteError) -> Self {
        ConnectionError::NoRoute
    }
}

/// The local or remote address of one end of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Endpoint {
    address: NodeId,
    port: u16,
}

impl Endpoint {
    pub fn new(address: NodeId, port: u16) -> Self {
        Self { address, port }
    }

    pub fn address(&self) -> NodeId {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// The connection's lifecycle. Transitions are monotone: once `Closing`, a connection can
/// never return to `Open`, and `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    Syn,
    SynAck,
    Ack,
    Data,
    Fin,
    FinAck,
}

impl FrameKind {
    fn to_byte(self) -> u8 {
        match self {
            FrameKind::Syn => 0,
            FrameKind::SynAck => 1,
            FrameKind::Ack => 2,
            FrameKind::Data => 3,
            FrameKind::Fin => 4,
            FrameKind::FinAck => 5,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => FrameKind::Syn,
            1 => FrameKind::SynAck,
            2 => FrameKind::Ack,
            3 => FrameKind::Data,
            4 => FrameKind::Fin,
            5 => FrameKind::FinAck,
            _ => return None,
        })
    }
}

struct Frame {
    kind: FrameKind,
    conn_id: u64,
    seq: u64,
    payload: Vec<u8>,
}

impl Frame {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(17 + self.payload.len());
        out.push(self.kind.to_byte());
        out.extend_from_slice(&self.conn_id.to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 17 {
            return None;
        }
        let kind = FrameKind::from_byte(bytes[0])?;
        let conn_id = u64::from_be_bytes(bytes[1..9].try_into().ok()?);
        let seq = u64::from_be_bytes(bytes[9..17].try_into().ok()?);
        Some(Frame { kind, conn_id, seq, payload: bytes[17..].to_vec() })
    }
}

/// An established (or establishing) byte-stream connection between two simulated nodes.
pub struct Connection {
    node: Arc<SimNode>,
    conn_id: u64,
    local: Endpoint,
    remote: Endpoint,
    state: Mutex<ConnState>,
    send_seq: Mutex<u64>,
    recv_seq: Mutex<u64>,
    /// Data frames received out of the caller's read order, held until `read` catches up.
    reorder_buffer: Mutex<VecDeque<(u64, Vec<u8>)>>,
}

impl Connection {
    /// Initiates a three-way handshake to `(remote, remote_port)`. Blocks until the
    /// connection is `Open` or `timeout` elapses.
    pub async fn connect(
        node: Arc<SimNode>,
        remote: NodeId,
        remote_port: u16,
        timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let local_port = node.alloc_ephemeral_port().await;
        let conn_id = node.simulator().next_conn_id();
        let local = Endpoint::new(node.id(), local_port);
        let remote_ep = Endpoint::new(remote, remote_port);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(ConnectionError::HandshakeTimeout);
            }
            let syn = Frame { kind: FrameKind::Syn, conn_id, seq: 0, payload: vec![] };
            node.send_from(local_port, remote, remote_port, syn.encode()).await?;

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let wait = remaining.min(RETRANSMIT_TIMEOUT);
            if let Some(msg) = node.receive_on_port(local_port, wait).await {
                if let Some(frame) = Frame::decode(&msg.payload) {
                    if frame.kind == FrameKind::SynAck && frame.conn_id == conn_id {
                        let ack = Frame { kind: FrameKind::Ack, conn_id, seq: 0, payload: vec![] };
                        node.send_from(local_port, remote, remote_port, ack.encode()).await?;
                        return Ok(Self {
                            node,
                            conn_id,
                            local,
                            remote: remote_ep,
                            state: Mutex::new(ConnState::Open),
                            send_seq: Mutex::new(0),
                            recv_seq: Mutex::new(0),
                            reorder_buffer: Mutex::new(VecDeque::new()),
                        });
                    }
                }
            }
        }
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    pub fn remote_endpoint(&self) -> Endpoint {
        self.remote
    }

    pub async fn state(&self) -> ConnState {
        *self.state.lock().await
    }

    pub async fn is_open(&self) -> bool {
        *self.state.lock().await == ConnState::Open
    }

    async fn set_state(&self, new: ConnState) {
        let mut state = self.state.lock().await;
        if new >= *state {
            *state = new;
        }
    }

    /// Sends `payload` as a single data frame, retransmitting with a fixed timeout up to
    /// `MAX_RETRIES` times until the peer acknowledges it.
    pub async fn write(&self, payload: Vec<u8>) -> Result<(), ConnectionError> {
        if self.state().await != ConnState::Open {
            return Err(ConnectionError::Closed);
        }
        let seq = {
            let mut send_seq = self.send_seq.lock().await;
            let seq = *send_seq;
            *send_seq += 1;
            seq
        };
        let frame = Frame { kind: FrameKind::Data, conn_id: self.conn_id, seq, payload };

        for _ in 0..MAX_RETRIES {
            self.node
                .send_from(self.local.port(), self.remote.address(), self.remote.port(), frame.encode())
                .await?;
            let backoff = self.node.simulator().jitter(RETRANSMIT_TIMEOUT, RETRANSMIT_TIMEOUT * 2);
            if let Some(msg) = self.node.receive_on_port(self.local.port(), backoff).await {
                if let Some(ack) = Frame::decode(&msg.payload) {
                    if ack.kind == FrameKind::Ack && ack.conn_id == self.conn_id && ack.seq == seq {
                        return Ok(());
                    }
                    // Not our ack: a data frame from the peer racing with ours. Hand it to the
                    // reorder buffer so a concurrent `read` doesn't lose it.
                    if ack.kind == FrameKind::Data {
                        self.reorder_buffer.lock().await.push_back((ack.seq, ack.payload));
                    }
                }
            }
        }
        self.set_state(ConnState::Closed).await;
        Err(ConnectionError::RetriesExhausted)
    }

    /// Returns the next in-order data frame's payload, acknowledging it to the sender. `None`
    /// on timeout.
    pub async fn read(&self, timeout: Duration) -> Option<Vec<u8>> {
        let expected = *self.recv_seq.lock().await;
        {
            let mut buf = self.reorder_buffer.lock().await;
            if let Some(pos) = buf.iter().position(|(seq, _)| *seq == expected) {
                let (_, payload) = buf.remove(pos).unwrap();
                *self.recv_seq.lock().await += 1;
                self.ack(expected).await;
                return Some(payload);
            }
        }
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let msg = self.node.receive_on_port(self.local.port(), remaining).await?;
            let frame = match Frame::decode(&msg.payload) {
                Some(f) if f.conn_id == self.conn_id => f,
                _ => continue,
            };
            match frame.kind {
                FrameKind::Data if frame.seq == expected => {
                    *self.recv_seq.lock().await += 1;
                    self.ack(expected).await;
                    return Some(frame.payload);
                }
                FrameKind::Data => {
                    self.reorder_buffer.lock().await.push_back((frame.seq, frame.payload));
                }
                FrameKind::Fin => {
                    self.set_state(ConnState::Closing).await;
                    let finack = Frame { kind: FrameKind::FinAck, conn_id: self.conn_id, seq: 0, payload: vec![] };
                    let _ = self
                        .node
                        .send_from(self.local.port(), self.remote.address(), self.remote.port(), finack.encode())
                        .await;
                    self.set_state(ConnState::Closed).await;
                    return None;
                }
                _ => continue,
            }
        }
    }

    async fn ack(&self, seq: u64) {
        let ack = Frame { kind: FrameKind::Ack, conn_id: self.conn_id, seq, payload: vec![] };
        let _ = self
            .node
            .send_from(self.local.port(), self.remote.address(), self.remote.port(), ack.encode())
            .await;
    }

    /// Sends a FIN and waits briefly for the peer's acknowledgement, then transitions to
    /// `Closed` regardless of whether it arrived.
    pub async fn close(&self) {
        if self.state().await == ConnState::Closed {
            return;
        }
        self.set_state(ConnState::Closing).await;
        let fin = Frame { kind: FrameKind::Fin, conn_id: self.conn_id, seq: 0, payload: vec![] };
        let _ = self
            .node
            .send_from(self.local.port(), self.remote.address(), self.remote.port(), fin.encode())
            .await;
        let _ = self.node.receive_on_port(self.local.port(), RETRANSMIT_TIMEOUT).await;
        self.set_state(ConnState::Closed).await;
    }
}

/// A bound port accepting inbound connection attempts.
pub struct Listener {
    node: Arc<SimNode>,
    port: u16,
}

impl Listener {
    pub async fn bind(node: Arc<SimNode>, port: u16) -> Option<Self> {
        if !node.bind_port(port).await {
            return None;
        }
        Some(Self { node, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn is_listening(&self) -> bool {
        self.node.is_port_bound(self.port).await
    }

    /// Waits for the next inbound SYN, completes the handshake, and returns the resulting
    /// connection. `None` on timeout.
    pub async fn accept(&self, timeout: Duration) -> Option<Connection> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let msg = self.node.receive_on_port(self.port, remaining).await?;
            let frame = match Frame::decode(&msg.payload) {
                Some(f) if f.kind == FrameKind::Syn => f,
                _ => continue,
            };
            let remote = Endpoint::new(msg.src_addr, msg.src_port);
            let conn_id = frame.conn_id;

            for _ in 0..MAX_RETRIES {
                let synack = Frame { kind: FrameKind::SynAck, conn_id, seq: 0, payload: vec![] };
                self.node
                    .send_from(self.port, remote.address(), remote.port(), synack.encode())
                    .await
                    .ok()?;

                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    return None;
                }
                if let Some(ack_msg) =
                    self.node.receive_on_port(self.port, remaining.min(RETRANSMIT_TIMEOUT)).await
                {
                    if let Some(ack) = Frame::decode(&ack_msg.payload) {
                        if ack.kind == FrameKind::Ack && ack.conn_id == conn_id {
                            return Some(Connection {
                                node: self.node.clone(),
                                conn_id,
                                local: Endpoint::new(self.node.id(), self.port),
                                remote,
                                state: Mutex::new(ConnState::Open),
                                send_seq: Mutex::new(0),
                                recv_seq: Mutex::new(0),
                                reorder_buffer: Mutex::new(VecDeque::new()),
                            });
                        }
                    }
                }
            }
            // The initiator gave up on the handshake; wait for the next SYN.
        }
    }

    pub async fn close(&self) {
        self.node.release_port(self.port).await;
    }
}
