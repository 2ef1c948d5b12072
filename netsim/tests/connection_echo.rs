//! Scenario 7: a connection-oriented byte stream (handshake, framed read/write, orderly close)
//! layered over the simulator's datagram substrate.

use std::time::Duration;

use netsim::connection::{ConnState, Connection, Listener};
use netsim::{NetworkEdge, NetworkSimulator};

#[tokio::test(start_paused = true)]
async fn handshake_then_echo_then_close() {
    let sim = NetworkSimulator::new_seeded(3);
    let server_node = sim.create_node(1);
    let client_node = sim.create_node(2);
    sim.add_edge(1, 2, NetworkEdge::reliable(Duration::from_millis(1)));
    sim.add_edge(2, 1, NetworkEdge::reliable(Duration::from_millis(1)));
    sim.start();

    let server_node = std::sync::Arc::new(server_node);
    let client_node = std::sync::Arc::new(client_node);
    let listener = Listener::bind(server_node.clone(), 7000).await.expect("port free");
    assert!(listener.is_listening().await);

    let server_fut = async {
        let conn = listener.accept(Duration::from_secs(1)).await.expect("accept");
        assert_eq!(conn.state().await, ConnState::Open);
        let msg = conn.read(Duration::from_secs(1)).await.expect("read request");
        assert_eq!(msg, b"ping");
        conn.write(b"pong".to_vec()).await.expect("write reply");
        conn
    };
    let client_fut = Connection::connect(client_node.clone(), 1, 7000, Duration::from_secs(1));

    let (server_conn, client_conn) = tokio::join!(server_fut, client_fut);
    let client_conn = client_conn.expect("client connected");
    assert!(client_conn.is_open().await);
    assert_eq!(client_conn.local_endpoint().address(), 2);
    assert_eq!(client_conn.remote_endpoint().address(), 1);

    client_conn.write(b"ping".to_vec()).await.expect("write request");
    let reply = client_conn.read(Duration::from_secs(1)).await.expect("read reply");
    assert_eq!(reply, b"pong");

    client_conn.close().await;
    assert_eq!(client_conn.state().await, ConnState::Closed);
    let _ = server_conn;
}

#[tokio::test(start_paused = true)]
async fn connect_with_no_listener_times_out() {
    let sim = NetworkSimulator::new_seeded(4);
    let a = std::sync::Arc::new(sim.create_node(1));
    sim.add_node(2);
    sim.add_edge(1, 2, NetworkEdge::reliable(Duration::from_millis(1)));
    sim.start();

    let result = Connection::connect(a, 2, 9999, Duration::from_millis(500)).await;
    assert!(result.is_err());
}
