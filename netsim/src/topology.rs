//! Directed-graph network topology: which nodes exist, which edges connect them, and what
//! each edge costs a traversing message.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use raft_core::NodeId;

/// Per-edge cost: a fixed one-way latency plus a delivery probability in `[0.0, 1.0]`.
///
/// `reliability = 1.0` never drops; `reliability = 0.0` always drops.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetworkEdge {
    pub latency: Duration,
    pub reliability: f64,
}

impl NetworkEdge {
    pub fn new(latency: Duration, reliability: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&reliability),
            "reliability must be within [0.0, 1.0], got {}",
            reliability
        );
        Self { latency, reliability }
    }

    /// A perfectly reliable edge with the given latency. Convenient for topology setup in
    /// tests that aren't exercising drop behavior.
    pub fn reliable(latency: Duration) -> Self {
        Self::new(latency, 1.0)
    }
}

/// A directed graph of nodes and the edges between them.
///
/// Edges are one-directional: a bidirectional link is two calls to [`Topology::add_edge`].
#[derive(Default)]
pub struct Topology {
    nodes: BTreeSet<NodeId>,
    edges: HashMap<(NodeId, NodeId), NetworkEdge>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId) {
        self.nodes.insert(id);
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    /// Adds (or replaces) a directed edge. Both endpoints must already be registered nodes.
    pub fn add_edge(&mut self, src: NodeId, dst: NodeId, edge: NetworkEdge) {
        assert!(self.has_node(src), "unknown source node {}", src);
        assert!(self.has_node(dst), "unknown destination node {}", dst);
        self.edges.insert((src, dst), edge);
    }

    pub fn remove_edge(&mut self, src: NodeId, dst: NodeId) -> Option<NetworkEdge> {
        self.edges.remove(&(src, dst))
    }

    pub fn get_edge(&self, src: NodeId, dst: NodeId) -> Option<&NetworkEdge> {
        self.edges.get(&(src, dst))
    }

    pub fn has_edge(&self, src: NodeId, dst: NodeId) -> bool {
        self.edges.contains_key(&(src, dst))
    }

    /// The shortest-hop path from `src` to `dst`, inclusive of both endpoints.
    ///
    /// Breadth-first, exploring each node's outgoing edges in ascending `NodeId` order, so
    /// that among multiple shortest paths the lexicographically-smallest sequence of node ids
    /// wins. Returns `None` if `dst` is unreachable from `src`.
    pub fn shortest_path(&self, src: NodeId, dst: NodeId) -> Option<Vec<NodeId>> {
        if src == dst {
            return Some(vec![src]);
        }
        let mut visited = BTreeSet::new();
        visited.insert(src);
        let mut queue = VecDeque::new();
        queue.push_back(vec![src]);

        while let Some(path) = queue.pop_front() {
            let last = *path.last().expect("path is never empty");
            let mut neighbors: Vec<NodeId> = self
                .edges
                .keys()
                .filter(|(from, _)| *from == last)
                .map(|(_, to)| *to)
                .collect();
            neighbors.sort_unstable();

            for next in neighbors {
                if next == dst {
                    let mut found = path.clone();
                    found.push(next);
                    return Some(found);
                }
                if visited.insert(next) {
                    let mut extended = path.clone();
                    extended.push(next);
                    queue.push_back(extended);
                }
            }
        }
        None
    }

    /// Sums the per-hop latency and multiplies the per-hop reliabilities along `path`.
    /// Panics if `path` has fewer than two nodes or references a missing edge; callers always
    /// derive `path` from [`Topology::shortest_path`].
    pub fn path_cost(&self, path: &[NodeId]) -> (Duration, f64) {
        let mut latency = Duration::from_millis(0);
        let mut reliability = 1.0;
        for edge in self.edges_along(path) {
            latency += edge.latency;
            reliability *= edge.reliability;
        }
        (latency, reliability)
    }

    /// The edges traversed by `path`, in order. Panics if `path` has fewer than two nodes or
    /// references a missing edge; callers always derive `path` from [`Topology::shortest_path`].
    pub fn edges_along(&self, path: &[NodeId]) -> Vec<NetworkEdge> {
        path.windows(2)
            .map(|window| {
                *self
                    .get_edge(window[0], window[1])
                    .expect("path must only traverse existing edges")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topo_with_chain() -> Topology {
        let mut t = Topology::new();
        for n in 1..=4 {
            t.add_node(n);
        }
        t.add_edge(1, 2, NetworkEdge::reliable(Duration::from_millis(10)));
        t.add_edge(2, 3, NetworkEdge::reliable(Duration::from_millis(10)));
        t.add_edge(1, 3, NetworkEdge::reliable(Duration::from_millis(50)));
        t.add_edge(3, 4, NetworkEdge::reliable(Duration::from_millis(10)));
        t
    }

    #[test]
    fn shortest_path_prefers_fewer_hops_over_lower_latency() {
        let t = topo_with_chain();
        // 1->3 direct is one hop but higher latency; 1->2->3 is two hops. Hop count wins.
        assert_eq!(t.shortest_path(1, 3), Some(vec![1, 3]));
        assert_eq!(t.shortest_path(1, 4), Some(vec![1, 3, 4]));
    }

    #[test]
    fn unreachable_node_returns_none() {
        let mut t = Topology::new();
        t.add_node(1);
        t.add_node(2);
        assert_eq!(t.shortest_path(1, 2), None);
    }

    #[test]
    fn same_node_path_is_trivial() {
        let t = topo_with_chain();
        assert_eq!(t.shortest_path(2, 2), Some(vec![2]));
    }

    #[test]
    fn path_cost_sums_latency_and_multiplies_reliability() {
        let mut t = Topology::new();
        t.add_node(1);
        t.add_node(2);
        t.add_node(3);
        t.add_edge(1, 2, NetworkEdge::new(Duration::from_millis(10), 0.9));
        t.add_edge(2, 3, NetworkEdge::new(Duration::from_millis(20), 0.5));
        let (latency, reliability) = t.path_cost(&[1, 2, 3]);
        assert_eq!(latency, Duration::from_millis(30));
        assert!((reliability - 0.45).abs() < 1e-9);
    }
}
