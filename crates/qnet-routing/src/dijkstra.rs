//! Shortest-path routing over quantum channels
//!
//! Routes are computed once per source with Dijkstra's algorithm. The
//! default metric counts hops; any per-channel cost can be supplied
//! instead, such as fiber length.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use qnet_core::{ChannelTable, NodeId, QuantumChannel};
use tracing::debug;

use crate::error::{FibError, FibResult};

/// A computed route: total metric, first hop and full node sequence
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    pub metric: f64,
    pub next_hop: NodeId,
    pub path: Vec<NodeId>,
}

#[derive(Debug, PartialEq)]
struct Frontier {
    cost: f64,
    node: NodeId,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap on cost, ties broken by name for reproducibility
        other.cost.total_cmp(&self.cost).then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-source shortest-path tables
#[derive(Debug, Clone, Default)]
pub struct Dijkstra {
    /// src -> dst -> predecessor of dst and distance
    tables: BTreeMap<NodeId, BTreeMap<NodeId, (Option<NodeId>, f64)>>,
}

impl Dijkstra {
    /// Build routes using hop count
    pub fn build(nodes: &[NodeId], channels: &ChannelTable) -> Self {
        Self::build_with_metric(nodes, channels, |_| 1.0)
    }

    /// Build routes using a custom per-channel metric
    pub fn build_with_metric<F>(nodes: &[NodeId], channels: &ChannelTable, metric: F) -> Self
    where
        F: Fn(&QuantumChannel) -> f64,
    {
        let mut adjacency: BTreeMap<&NodeId, Vec<(&NodeId, f64)>> = BTreeMap::new();
        for ch in channels.quantum_channels() {
            let cost = metric(ch);
            adjacency.entry(&ch.a).or_default().push((&ch.b, cost));
            adjacency.entry(&ch.b).or_default().push((&ch.a, cost));
        }

        let tables = nodes
            .iter()
            .map(|src| (src.clone(), Self::single_source(src, &adjacency)))
            .collect();
        Self { tables }
    }

    fn single_source(
        src: &NodeId,
        adjacency: &BTreeMap<&NodeId, Vec<(&NodeId, f64)>>,
    ) -> BTreeMap<NodeId, (Option<NodeId>, f64)> {
        let mut best: BTreeMap<NodeId, (Option<NodeId>, f64)> = BTreeMap::new();
        let mut heap = BinaryHeap::new();
        best.insert(src.clone(), (None, 0.0));
        heap.push(Frontier { cost: 0.0, node: src.clone() });

        while let Some(Frontier { cost, node }) = heap.pop() {
            if best.get(&node).is_some_and(|(_, d)| cost > *d) {
                continue;
            }
            let Some(edges) = adjacency.get(&node) else {
                continue;
            };
            for (next, weight) in edges {
                let candidate = cost + weight;
                let improves = best.get(*next).is_none_or(|(_, d)| candidate < *d);
                if improves {
                    best.insert((*next).clone(), (Some(node.clone()), candidate));
                    heap.push(Frontier { cost: candidate, node: (*next).clone() });
                }
            }
        }
        best
    }

    /// Routes from `src` to `dst`, best first
    ///
    /// Empty when `src == dst` or when `dst` is unreachable.
    pub fn query(&self, src: &NodeId, dst: &NodeId) -> Vec<RouteEntry> {
        if src == dst {
            return Vec::new();
        }
        let Some(table) = self.tables.get(src) else {
            return Vec::new();
        };
        let Some((_, metric)) = table.get(dst) else {
            return Vec::new();
        };

        let mut path = vec![dst.clone()];
        let mut cursor = dst;
        while let Some((Some(prev), _)) = table.get(cursor) {
            path.push(prev.clone());
            cursor = prev;
        }
        path.reverse();
        debug!(%src, %dst, hops = path.len() - 1, "Route found");
        vec![RouteEntry { metric: *metric, next_hop: path[1].clone(), path }]
    }

    /// Best route from `src` to `dst`
    pub fn route(&self, src: &NodeId, dst: &NodeId) -> FibResult<RouteEntry> {
        self.query(src, dst)
            .into_iter()
            .next()
            .ok_or_else(|| FibError::NoRoute { src: src.clone(), dst: dst.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: &str) -> NodeId {
        NodeId::from(n)
    }

    /// S - A - D with a long direct S - D link
    fn triangle() -> (Vec<NodeId>, ChannelTable) {
        let nodes = vec![node("S"), node("A"), node("D")];
        let mut channels = ChannelTable::new();
        channels.add_quantum(QuantumChannel::new(node("S"), node("A"), 10.0)).unwrap();
        channels.add_quantum(QuantumChannel::new(node("A"), node("D"), 10.0)).unwrap();
        channels.add_quantum(QuantumChannel::new(node("S"), node("D"), 50.0)).unwrap();
        (nodes, channels)
    }

    #[test]
    fn test_hop_count_prefers_direct_link() {
        let (nodes, channels) = triangle();
        let routes = Dijkstra::build(&nodes, &channels);
        let best = routes.route(&node("S"), &node("D")).unwrap();
        assert_eq!(best.path, vec![node("S"), node("D")]);
        assert_eq!(best.metric, 1.0);
        assert_eq!(best.next_hop, node("D"));
    }

    #[test]
    fn test_length_metric_prefers_short_fiber() {
        let (nodes, channels) = triangle();
        let routes = Dijkstra::build_with_metric(&nodes, &channels, |ch| ch.length_km);
        let best = routes.route(&node("S"), &node("D")).unwrap();
        assert_eq!(best.path, vec![node("S"), node("A"), node("D")]);
        assert_eq!(best.metric, 20.0);
        assert_eq!(best.next_hop, node("A"));
    }

    #[test]
    fn test_query_self_and_unreachable() {
        let (mut nodes, channels) = triangle();
        nodes.push(node("X"));
        let routes = Dijkstra::build(&nodes, &channels);
        assert!(routes.query(&node("S"), &node("S")).is_empty());
        assert!(routes.query(&node("S"), &node("X")).is_empty());
        assert_eq!(
            routes.route(&node("X"), &node("S")).unwrap_err(),
            FibError::NoRoute { src: node("X"), dst: node("S") }
        );
    }

    #[test]
    fn test_linear_chain() {
        let nodes: Vec<NodeId> = ["n0", "n1", "n2", "n3"].into_iter().map(node).collect();
        let mut channels = ChannelTable::new();
        for w in nodes.windows(2) {
            channels.add_quantum(QuantumChannel::new(w[0].clone(), w[1].clone(), 5.0)).unwrap();
        }
        let routes = Dijkstra::build(&nodes, &channels);
        let best = routes.route(&node("n3"), &node("n0")).unwrap();
        assert_eq!(best.path, vec![node("n3"), node("n2"), node("n1"), node("n0")]);
        assert_eq!(best.metric, 3.0);
    }
}
