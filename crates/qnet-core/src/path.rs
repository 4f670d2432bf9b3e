//! Path instructions distributed by the routing controller

use std::collections::BTreeMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::identity::NodeId;

/// Which neighbor along a path a memory slot faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum PathDirection {
    #[display("LEFT")]
    Left,
    #[display("RIGHT")]
    Right,
}

impl PathDirection {
    pub fn opposite(self) -> Self {
        match self {
            PathDirection::Left => PathDirection::Right,
            PathDirection::Right => PathDirection::Left,
        }
    }
}

/// Name of the path segment between two nodes, as used in purification schedules
pub fn segment_name(a: &NodeId, b: &NodeId) -> String {
    format!("{a}-{b}")
}

/// Instructions sent to every node on a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathInstructions {
    /// Request this path serves
    pub req_id: u32,
    /// Nodes from source to destination
    pub route: Vec<NodeId>,
    /// Swap rank of each node on the route
    pub swap: Vec<u32>,
    /// Purification rounds required per segment (`"A-B"`)
    #[serde(default)]
    pub purif: BTreeMap<String, u32>,
    /// Qubits per channel of the route, as (left end, right end)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m_v: Option<Vec<(usize, usize)>>,
}

impl PathInstructions {
    pub fn new(req_id: u32, route: Vec<NodeId>, swap: Vec<u32>) -> Self {
        Self { req_id, route, swap, purif: BTreeMap::new(), m_v: None }
    }

    pub fn with_purif(mut self, segment: impl Into<String>, rounds: u32) -> Self {
        self.purif.insert(segment.into(), rounds);
        self
    }

    pub fn with_m_v(mut self, m_v: Vec<(usize, usize)>) -> Self {
        self.m_v = Some(m_v);
        self
    }

    pub fn src(&self) -> Option<&NodeId> {
        self.route.first()
    }

    pub fn dst(&self) -> Option<&NodeId> {
        self.route.last()
    }
}
