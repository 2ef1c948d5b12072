//! Scenario 6: an edge's configured reliability should roughly bound its observed delivery
//! rate over many sends, without being literally all-or-nothing.

use std::time::Duration;

use netsim::{NetworkEdge, NetworkSimulator};

#[tokio::test(start_paused = true)]
async fn delivery_rate_tracks_configured_reliability() {
    let sim = NetworkSimulator::new_seeded(7);
    let sender = sim.create_node(1);
    let receiver = sim.create_node(2);
    sim.add_edge(1, 2, NetworkEdge::new(Duration::from_micros(100), 0.8));
    sim.start();

    const TOTAL: usize = 500;
    for _ in 0..TOTAL {
        sender.send(2, 42, vec![7]).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(1)).await;

    let mut delivered = 0;
    while receiver.receive_on_port(42, Duration::from_millis(0)).await.is_some() {
        delivered += 1;
    }

    let rate = delivered as f64 / TOTAL as f64;
    assert!((rate - 0.8).abs() < 0.1, "observed delivery rate {} far from configured 0.8", rate);
}

#[tokio::test(start_paused = true)]
async fn fully_reliable_edge_never_drops() {
    let sim = NetworkSimulator::new_seeded(11);
    let sender = sim.create_node(1);
    let receiver = sim.create_node(2);
    sim.add_edge(1, 2, NetworkEdge::reliable(Duration::from_micros(50)));
    sim.start();

    for i in 0..50u8 {
        sender.send(2, 9, vec![i]).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(1)).await;

    let mut delivered = 0;
    while receiver.receive_on_port(9, Duration::from_millis(0)).await.is_some() {
        delivered += 1;
    }
    assert_eq!(delivered, 50);
}

#[tokio::test(start_paused = true)]
async fn fully_unreliable_edge_never_delivers() {
    let sim = NetworkSimulator::new_seeded(13);
    let sender = sim.create_node(1);
    let receiver = sim.create_node(2);
    sim.add_edge(1, 2, NetworkEdge::new(Duration::from_micros(50), 0.0));
    sim.start();

    for i in 0..50u8 {
        sender.send(2, 9, vec![i]).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(receiver.receive_on_port(9, Duration::from_millis(0)).await.is_none());
}
