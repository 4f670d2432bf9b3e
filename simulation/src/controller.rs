//! Routing controller
//!
//! Turns entanglement requests into path instructions. Routes are the
//! shortest paths by hop count over the quantum channels; swap ranks come
//! from the request's [`SwapPolicy`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use qnet_core::{ChannelTable, NodeId, PathId, PathInstructions};
use qnet_routing::{Dijkstra, SwapPolicy, validate_path_instructions};

use crate::error::{SimError, SimResult};

/// An end-to-end entanglement request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    pub src: String,
    pub dst: String,
    #[serde(default)]
    pub swap: SwapPolicy,
    /// Purification rounds per segment, keyed `"A-B"`
    #[serde(default)]
    pub purif: BTreeMap<String, u32>,
    /// Qubits per channel of the route, for buffer-space multiplexing
    #[serde(default)]
    pub m_v: Option<Vec<(usize, usize)>>,
}

impl RequestConfig {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self { src: src.into(), dst: dst.into(), swap: SwapPolicy::default(), purif: BTreeMap::new(), m_v: None }
    }

    pub fn with_swap(mut self, swap: SwapPolicy) -> Self {
        self.swap = swap;
        self
    }

    pub fn with_purif(mut self, segment: impl Into<String>, rounds: u32) -> Self {
        self.purif.insert(segment.into(), rounds);
        self
    }

    pub fn with_m_v(mut self, m_v: Vec<(usize, usize)>) -> Self {
        self.m_v = Some(m_v);
        self
    }
}

/// Computes and remembers the paths installed in a network
#[derive(Debug)]
pub struct RoutingController {
    nodes: Vec<NodeId>,
    routes: Dijkstra,
    paths: BTreeMap<PathId, PathInstructions>,
    next_path_id: PathId,
    next_req_id: u32,
}

impl RoutingController {
    pub fn new(nodes: &[NodeId], channels: &ChannelTable) -> Self {
        Self {
            nodes: nodes.to_vec(),
            routes: Dijkstra::build(nodes, channels),
            paths: BTreeMap::new(),
            next_path_id: 0,
            next_req_id: 0,
        }
    }

    /// Route a request and assign it a fresh path id
    pub fn compute(&mut self, request: &RequestConfig) -> SimResult<(PathId, PathInstructions)> {
        let src = self.known(&request.src)?;
        let dst = self.known(&request.dst)?;
        let route = self.routes.route(&src, &dst)?.path;

        let swap = request.swap.ranks(route.len());
        let mut instructions = PathInstructions::new(self.next_req_id, route, swap);
        instructions.purif = request.purif.clone();
        instructions.m_v = request.m_v.clone();
        validate_path_instructions(&instructions)?;

        let path_id = self.next_path_id;
        self.next_path_id += 1;
        self.next_req_id += 1;
        info!(
            path_id,
            route = ?instructions.route.iter().map(NodeId::as_str).collect::<Vec<_>>(),
            swap = ?instructions.swap,
            "path computed"
        );
        self.paths.insert(path_id, instructions.clone());
        Ok((path_id, instructions))
    }

    /// Forget a path; returns its instructions
    pub fn remove(&mut self, path_id: PathId) -> SimResult<PathInstructions> {
        self.paths
            .remove(&path_id)
            .ok_or_else(|| SimError::InvalidScenario(format!("path {path_id} is not installed")))
    }

    pub fn get(&self, path_id: PathId) -> Option<&PathInstructions> {
        self.paths.get(&path_id)
    }

    pub fn paths(&self) -> impl Iterator<Item = (PathId, &PathInstructions)> {
        self.paths.iter().map(|(id, p)| (*id, p))
    }

    fn known(&self, name: &str) -> SimResult<NodeId> {
        let id = NodeId::from(name);
        if self.nodes.contains(&id) { Ok(id) } else { Err(SimError::UnknownNode(id)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Topology, TopologyConfig};

    fn chain(n: usize) -> Topology {
        Topology::build(&TopologyConfig::linear(n, 10.0, 2, None)).unwrap()
    }

    #[test]
    fn test_compute_assigns_ids() {
        let topo = chain(4);
        let mut controller = RoutingController::new(&topo.nodes, &topo.channels);

        let (id0, p0) = controller.compute(&RequestConfig::new("S", "D")).unwrap();
        assert_eq!(id0, 0);
        assert_eq!(p0.route, vec![NodeId::from("S"), "R1".into(), "R2".into(), "D".into()]);
        assert_eq!(p0.swap, vec![1, 0, 0, 1]);

        let request = RequestConfig::new("S", "R2").with_swap(SwapPolicy::LeftToRight);
        let (id1, p1) = controller.compute(&request).unwrap();
        assert_eq!(id1, 1);
        assert_eq!(p1.req_id, 1);
        assert_eq!(p1.swap, vec![1, 0, 1]);
        assert_eq!(controller.paths().count(), 2);
    }

    #[test]
    fn test_rejects_unknown_and_malformed() {
        let topo = chain(3);
        let mut controller = RoutingController::new(&topo.nodes, &topo.channels);
        assert!(matches!(controller.compute(&RequestConfig::new("S", "X")), Err(SimError::UnknownNode(_))));

        let bad = RequestConfig::new("S", "D").with_purif("S-X", 1);
        assert!(matches!(controller.compute(&bad), Err(SimError::Fib(_))));
        assert_eq!(controller.paths().count(), 0);
    }

    #[test]
    fn test_remove() {
        let topo = chain(3);
        let mut controller = RoutingController::new(&topo.nodes, &topo.channels);
        let (id, _) = controller.compute(&RequestConfig::new("S", "D").with_purif("S-R1", 1)).unwrap();
        assert_eq!(controller.get(id).unwrap().purif["S-R1"], 1);
        assert!(controller.remove(id).is_ok());
        assert!(controller.remove(id).is_err());
    }
}
