//! A deterministic, seeded network simulator and the transport surface built on top of it.
//!
//! `raft-core` depends only on `RaftNetwork`; this crate supplies a concrete, fully
//! reproducible network underneath it for tests, plus a connection-oriented byte-stream
//! abstraction (`connection.rs`) that isn't specific to Raft at all.

pub mod connection;
pub mod datagram;
pub mod node;
pub mod server;
pub mod simulator;
pub mod topology;
pub mod transport;

pub use connection::{ConnState, Connection, ConnectionError, Endpoint, Listener};
pub use datagram::Message;
pub use node::SimNode;
pub use server::NetworkServer;
pub use simulator::{NetworkSimulator, RouteError};
pub use topology::{NetworkEdge, Topology};
pub use transport::{FixedPort, PeerPorts, SimNetwork};
