//! Network topology definitions
//!
//! Provides builders for the topologies used by the scenarios:
//! - Linear chain: `S - R1 - ... - Rk - D`
//! - Custom: explicit node and channel lists
//!
//! Quantum channels only join neighbors. Classical channels join every pair
//! of nodes, with a length equal to the shortest quantum route between them,
//! so swap updates and purification messages reach distant endpoints
//! directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use qnet_core::{ChannelId, ChannelTable, ClassicChannel, LinkArch, NodeId, QuantumChannel};
use qnet_memory::QuantumMemory;
use qnet_routing::Dijkstra;

use crate::error::{SimError, SimResult};

/// One node and its memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    /// Memory qubits; defaults to the sum of its channel allocations
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Memory coherence time in seconds; `None` never decoheres
    #[serde(default)]
    pub t_coherence: Option<f64>,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), capacity: None, t_coherence: None }
    }

    pub fn with_coherence(mut self, t_coherence: f64) -> Self {
        self.t_coherence = Some(t_coherence);
        self
    }

    fn decoherence_rate(&self) -> f64 {
        self.t_coherence.filter(|t| *t > 0.0).map_or(0.0, |t| 1.0 / t)
    }
}

/// One quantum channel between neighbors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub a: String,
    pub b: String,
    pub length_km: f64,
    #[serde(default)]
    pub link_arch: LinkArch,
    /// Memory qubits assigned to this channel at `a` and at `b`
    pub qubits: (usize, usize),
}

impl ChannelConfig {
    pub fn new(a: impl Into<String>, b: impl Into<String>, length_km: f64, qubits: (usize, usize)) -> Self {
        Self { a: a.into(), b: b.into(), length_km, link_arch: LinkArch::default(), qubits }
    }

    pub fn with_link_arch(mut self, link_arch: LinkArch) -> Self {
        self.link_arch = link_arch;
        self
    }
}

/// Nodes, channels and memory layout of a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub nodes: Vec<NodeConfig>,
    pub channels: Vec<ChannelConfig>,
}

impl TopologyConfig {
    /// A chain of `n` nodes named `S`, `R1`..`R(n-2)`, `D`
    ///
    /// Every channel gets `qubits` memory qubits at each end.
    pub fn linear(n: usize, length_km: f64, qubits: usize, t_coherence: Option<f64>) -> Self {
        let names = chain_names(n);
        let nodes = names
            .iter()
            .map(|name| NodeConfig { name: name.clone(), capacity: None, t_coherence })
            .collect();
        let channels =
            names.windows(2).map(|w| ChannelConfig::new(w[0].clone(), w[1].clone(), length_km, (qubits, qubits))).collect();
        Self { nodes, channels }
    }

    /// Build from an edge list; node names are taken from the edges
    pub fn from_edges(edges: &[(&str, &str)], length_km: f64, qubits: usize) -> Self {
        let mut nodes: Vec<NodeConfig> = Vec::new();
        for name in edges.iter().flat_map(|(a, b)| [*a, *b]) {
            if !nodes.iter().any(|n| n.name == name) {
                nodes.push(NodeConfig::new(name));
            }
        }
        let channels = edges.iter().map(|(a, b)| ChannelConfig::new(*a, *b, length_km, (qubits, qubits))).collect();
        Self { nodes, channels }
    }

    pub fn with_coherence(mut self, t_coherence: f64) -> Self {
        for node in &mut self.nodes {
            node.t_coherence = Some(t_coherence);
        }
        self
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| NodeId::from(n.name.as_str())).collect()
    }
}

/// Names of a linear chain of `n` nodes
pub fn chain_names(n: usize) -> Vec<String> {
    match n {
        0 => Vec::new(),
        1 => vec!["S".to_string()],
        _ => std::iter::once("S".to_string())
            .chain((1..n - 1).map(|i| format!("R{i}")))
            .chain(std::iter::once("D".to_string()))
            .collect(),
    }
}

/// A topology ready to be populated with nodes
#[derive(Debug)]
pub struct Topology {
    pub nodes: Vec<NodeId>,
    pub channels: ChannelTable,
    pub memories: BTreeMap<NodeId, QuantumMemory>,
}

impl Topology {
    pub fn build(config: &TopologyConfig) -> SimResult<Self> {
        let nodes = config.node_ids();
        let mut channels = ChannelTable::new();
        let mut per_channel: BTreeMap<&str, Vec<(ChannelId, usize)>> = BTreeMap::new();

        for ch in &config.channels {
            for end in [&ch.a, &ch.b] {
                if !config.nodes.iter().any(|n| n.name == *end) {
                    return Err(SimError::InvalidTopology(format!("channel endpoint {end} is not a node")));
                }
            }
            if ch.length_km < 0.0 || !ch.length_km.is_finite() {
                return Err(SimError::InvalidTopology(format!("channel {}-{} has length {}", ch.a, ch.b, ch.length_km)));
            }
            let qchannel = QuantumChannel::new(NodeId::from(ch.a.as_str()), NodeId::from(ch.b.as_str()), ch.length_km)
                .with_link_arch(ch.link_arch);
            let name = qchannel.name.clone();
            channels.add_quantum(qchannel)?;
            per_channel.entry(ch.a.as_str()).or_default().push((name.clone(), ch.qubits.0));
            per_channel.entry(ch.b.as_str()).or_default().push((name, ch.qubits.1));
        }

        let mut memories = BTreeMap::new();
        for node in &config.nodes {
            let allocations = per_channel.remove(node.name.as_str()).unwrap_or_default();
            let needed: usize = allocations.iter().map(|(_, n)| n).sum();
            let capacity = node.capacity.unwrap_or(needed);
            if capacity < needed {
                return Err(SimError::InvalidTopology(format!(
                    "node {} has {capacity} qubits but its channels need {needed}",
                    node.name
                )));
            }
            let mut memory: QuantumMemory = QuantumMemory::new(node.name.as_str(), capacity, node.decoherence_rate());
            for (channel, n) in &allocations {
                memory.assign(channel, *n);
            }
            memories.insert(NodeId::from(node.name.as_str()), memory);
        }

        add_classic_mesh(&nodes, &mut channels);
        Ok(Self { nodes, channels, memories })
    }
}

/// Join every pair of nodes reachable over quantum channels
fn add_classic_mesh(nodes: &[NodeId], channels: &mut ChannelTable) {
    let distances = Dijkstra::build_with_metric(nodes, channels, |ch| ch.length_km);
    for (i, a) in nodes.iter().enumerate() {
        for b in &nodes[i + 1..] {
            if let Some(route) = distances.query(a, b).into_iter().next() {
                channels.add_classic(ClassicChannel::new(a.clone(), b.clone(), route.metric));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_names() {
        assert_eq!(chain_names(2), vec!["S", "D"]);
        assert_eq!(chain_names(4), vec!["S", "R1", "R2", "D"]);
    }

    #[test]
    fn test_linear_build() {
        let topo = Topology::build(&TopologyConfig::linear(3, 20.0, 2, Some(0.01))).unwrap();
        assert_eq!(topo.nodes.len(), 3);
        let (s, r, d) = (NodeId::from("S"), NodeId::from("R1"), NodeId::from("D"));
        assert_eq!(topo.memories[&r].capacity(), 4);
        assert_eq!(topo.memories[&s].capacity(), 2);
        assert!((topo.memories[&s].decoherence_rate() - 100.0).abs() < 1e-9);

        assert!(topo.channels.quantum_between(&s, &d).is_err());
        let far = topo.channels.classic_between(&s, &d).unwrap();
        assert!((far.length_km - 40.0).abs() < 1e-9);
        assert!(topo.channels.classic_between(&r, &d).is_ok());
    }

    #[test]
    fn test_asymmetric_allocation() {
        let mut config = TopologyConfig::linear(3, 20.0, 0, None);
        config.channels[0].qubits = (6, 1);
        config.channels[1].qubits = (5, 6);
        config.nodes[1].capacity = Some(6);
        let topo = Topology::build(&config).unwrap();
        let r = &topo.memories[&NodeId::from("R1")];
        assert_eq!(r.get_channel_qubits(&ChannelId::new("q-S-R1")).len(), 1);
        assert_eq!(r.get_channel_qubits(&ChannelId::new("q-R1-D")).len(), 5);
    }

    #[test]
    fn test_rejects_bad_topologies() {
        let mut config = TopologyConfig::linear(3, 20.0, 2, None);
        config.nodes[1].capacity = Some(3);
        assert!(matches!(Topology::build(&config), Err(SimError::InvalidTopology(_))));

        let edges = TopologyConfig::from_edges(&[("A", "B"), ("A", "B")], 1.0, 1);
        assert!(matches!(Topology::build(&edges), Err(SimError::Core(_))));
    }
}
