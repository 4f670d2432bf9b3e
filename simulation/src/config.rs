//! Scenario files
//!
//! A scenario bundles network parameters, a topology and the requests to
//! serve. It can be written by hand as JSON:
//!
//! ```json
//! {
//!   "network": { "seed": 7, "end_time_secs": 0.5, "mux": { "scheme": "statistical" } },
//!   "topology": {
//!     "nodes": [{ "name": "S" }, { "name": "R" }, { "name": "D" }],
//!     "channels": [
//!       { "a": "S", "b": "R", "length_km": 20.0, "qubits": [4, 4] },
//!       { "a": "R", "b": "D", "length_km": 20.0, "qubits": [4, 4], "link_arch": "sr" }
//!     ]
//!   },
//!   "requests": [{ "src": "S", "dst": "D" }]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use tracing::info;

use crate::controller::RequestConfig;
use crate::error::{SimError, SimResult};
use crate::network::{NetworkConfig, NetworkReport, QuantumNetwork};
use crate::topology::{Topology, TopologyConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    pub topology: TopologyConfig,
    pub requests: Vec<RequestConfig>,
}

impl ScenarioConfig {
    pub fn new(network: NetworkConfig, topology: TopologyConfig) -> Self {
        Self { network, topology, requests: Vec::new() }
    }

    pub fn with_request(mut self, request: RequestConfig) -> Self {
        self.requests.push(request);
        self
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> SimResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> SimResult<Self> {
        let scenario: Self = serde_json::from_str(text).map_err(|err| match err.classify() {
            Category::Data => SimError::InvalidScenario(err.to_string()),
            _ => SimError::Json(err),
        })?;
        if scenario.requests.is_empty() {
            return Err(SimError::InvalidScenario("no requests".to_string()));
        }
        Ok(scenario)
    }

    /// Build the network and install every request at time zero
    pub fn build(&self) -> SimResult<QuantumNetwork> {
        let topology = Topology::build(&self.topology)?;
        let mut network = QuantumNetwork::new(self.network.clone(), topology)?;
        for request in &self.requests {
            network.request(request)?;
        }
        Ok(network)
    }

    pub fn run(&self) -> SimResult<NetworkReport> {
        info!(nodes = self.topology.nodes.len(), requests = self.requests.len(), "running scenario");
        self.build()?.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::LinkArch;
    use qnet_proactive::MuxKind;

    const SCENARIO: &str = r#"{
        "network": { "seed": 7, "end_time_secs": 0.5, "mux": { "scheme": "statistical" } },
        "topology": {
            "nodes": [{ "name": "S" }, { "name": "R" }, { "name": "D", "t_coherence": 0.1 }],
            "channels": [
                { "a": "S", "b": "R", "length_km": 20.0, "qubits": [4, 4] },
                { "a": "R", "b": "D", "length_km": 20.0, "qubits": [4, 4], "link_arch": "sr" }
            ]
        },
        "requests": [{ "src": "S", "dst": "D", "swap": "asap" }]
    }"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = ScenarioConfig::from_json(SCENARIO).unwrap();
        assert_eq!(scenario.network.seed, 7);
        assert_eq!(scenario.network.mux, MuxKind::Statistical { coordinated_decisions: false });
        assert_eq!(scenario.network.forwarder.ps, 1.0);
        assert_eq!(scenario.topology.channels[1].link_arch, LinkArch::Sr);
        assert_eq!(scenario.topology.nodes[2].t_coherence, Some(0.1));
        assert_eq!(scenario.requests[0].dst, "D");
    }

    #[test]
    fn test_build_installs_requests() {
        let scenario = ScenarioConfig::from_json(SCENARIO).unwrap();
        let network = scenario.build().unwrap();
        assert_eq!(network.controller().paths().count(), 1);
    }

    #[test]
    fn test_rejects_empty_and_missing() {
        let empty = r#"{ "topology": { "nodes": [], "channels": [] }, "requests": [] }"#;
        assert!(matches!(ScenarioConfig::from_json(empty), Err(SimError::InvalidScenario(_))));
        assert!(matches!(ScenarioConfig::from_json_file("/nonexistent/scenario.json"), Err(SimError::Io(_))));
        assert!(matches!(ScenarioConfig::from_json("{"), Err(SimError::Json(_))));

        let zero_cycle = SCENARIO.replace(
            r#""seed": 7,"#,
            r#""seed": 7, "timing": { "mode": "sync", "t_ext": 0, "t_int": 0 },"#,
        );
        match ScenarioConfig::from_json(&zero_cycle) {
            Err(SimError::InvalidScenario(msg)) => assert!(msg.contains("phase lengths"), "{msg}"),
            other => panic!("expected invalid scenario, got {other:?}"),
        }
    }
}
