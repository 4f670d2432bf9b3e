//! Pre-defined simulation scenarios
//!
//! - 3-node throughput versus memory coherence time
//! - 3-node asymmetric channels with different memory splits and link
//!   architectures
//! - linear chains of any length under a chosen multiplexing scheme

use serde::Serialize;
use tracing::info;

use qnet_core::LinkArch;
use qnet_proactive::MuxKind;

use crate::config::ScenarioConfig;
use crate::controller::RequestConfig;
use crate::error::{SimError, SimResult};
use crate::network::{NetworkConfig, NetworkReport};
use crate::topology::{ChannelConfig, NodeConfig, TopologyConfig};

/// Simulated seconds of the 3-node scenarios
pub const THREE_NODE_DURATION_SECS: f64 = 3.0;

/// Coherence times swept by the throughput scenario
pub const COHERENCE_SWEEP: [f64; 8] = [0.002, 0.005, 0.01, 0.015, 0.02, 0.025, 0.05, 0.1];

/// Memory splits (left, right) at the repeater of the asymmetric scenario
pub const MEMORY_SPLITS: [(usize, usize); 5] = [(1, 5), (2, 4), (3, 3), (4, 2), (5, 1)];

/// `S - R - D` over two 32 km channels with one qubit per channel end
pub fn three_node_throughput(t_coherence: f64, seed: u64) -> ScenarioConfig {
    let network = NetworkConfig::default().with_seed(seed).with_end_time(THREE_NODE_DURATION_SECS);
    let topology = TopologyConfig::linear(3, 32.0, 1, Some(t_coherence));
    ScenarioConfig::new(network, topology).with_request(RequestConfig::new("S", "D"))
}

/// `S - R - D` over two 20 km channels
///
/// The repeater splits `left + right` qubits between its channels as given
/// by `split`; the endpoints give their channel every qubit.
pub fn asymmetric_three_node(split: (usize, usize), archs: [LinkArch; 2], t_coherence: f64, seed: u64) -> ScenarioConfig {
    let (left, right) = split;
    let total = left + right;
    let network = NetworkConfig::default().with_seed(seed).with_end_time(THREE_NODE_DURATION_SECS);
    let nodes = ["S", "R", "D"]
        .map(|name| NodeConfig { capacity: Some(total), ..NodeConfig::new(name) }.with_coherence(t_coherence));
    let topology = TopologyConfig {
        nodes: nodes.to_vec(),
        channels: vec![
            ChannelConfig::new("S", "R", 20.0, (total, left)).with_link_arch(archs[0]),
            ChannelConfig::new("R", "D", 20.0, (right, total)).with_link_arch(archs[1]),
        ],
    };
    ScenarioConfig::new(network, topology).with_request(RequestConfig::new("S", "D"))
}

/// Link architecture pairs by label, e.g. `"SIM-DIM"`
pub fn arch_pair(label: &str) -> SimResult<[LinkArch; 2]> {
    let arch = |name: &str| match name {
        "SR" => Ok(LinkArch::Sr),
        "SIM" => Ok(LinkArch::Sim),
        "DIM" | "DIM-BK" => Ok(LinkArch::DimBk),
        other => Err(SimError::InvalidScenario(format!("unknown link architecture {other}"))),
    };
    let (a, b) = label
        .split_once('-')
        .ok_or_else(|| SimError::InvalidScenario(format!("expected two architectures, got {label}")))?;
    Ok([arch(a)?, arch(b)?])
}

/// A chain of `n` nodes, 10 km apart, serving one `S`-`D` request
pub fn linear_chain(n: usize, mux: MuxKind, seed: u64) -> ScenarioConfig {
    let network = NetworkConfig { mux, ..NetworkConfig::default() }.with_seed(seed);
    let topology = TopologyConfig::linear(n, 10.0, 2, Some(0.1));
    ScenarioConfig::new(network, topology).with_request(RequestConfig::new("S", "D"))
}

/// Mean and spread of the `S`-`D` rate over several seeds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatePoint {
    pub t_coherence: f64,
    pub mean_rate: f64,
    pub std_rate: f64,
    pub mean_fidelity: f64,
}

/// Run `runs` seeds of the throughput scenario for each coherence time
pub fn coherence_sweep(values: &[f64], runs: usize, seed_base: u64) -> SimResult<Vec<RatePoint>> {
    values
        .iter()
        .map(|&t_coherence| {
            let reports = (0..runs as u64)
                .map(|i| three_node_throughput(t_coherence, seed_base + i).run())
                .collect::<SimResult<Vec<_>>>()?;
            let point = rate_point(t_coherence, &reports);
            info!(t_coherence, mean_rate = point.mean_rate, std_rate = point.std_rate, "coherence point");
            Ok(point)
        })
        .collect()
}

fn rate_point(t_coherence: f64, reports: &[NetworkReport]) -> RatePoint {
    let first_path = |r: &NetworkReport| r.paths.first().map_or((0.0, 0.0), |p| (p.throughput, p.mean_fidelity));
    let samples: Vec<(f64, f64)> = reports.iter().map(first_path).collect();
    let n = samples.len().max(1) as f64;
    let mean_rate = samples.iter().map(|(r, _)| r).sum::<f64>() / n;
    let variance = samples.iter().map(|(r, _)| (r - mean_rate).powi(2)).sum::<f64>() / n;
    let mean_fidelity = samples.iter().map(|(_, f)| f).sum::<f64>() / n;
    RatePoint { t_coherence, mean_rate, std_rate: variance.sqrt(), mean_fidelity }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::NodeId;

    use crate::topology::Topology;

    #[test]
    fn test_asymmetric_layout() {
        let scenario = asymmetric_three_node((2, 4), [LinkArch::Sim, LinkArch::DimBk], 0.01, 42);
        let topo = Topology::build(&scenario.topology).unwrap();
        let r = &topo.memories[&NodeId::from("R")];
        assert_eq!(r.capacity(), 6);
        assert_eq!(r.get_channel_qubits(&"q-S-R".into()).len(), 2);
        assert_eq!(r.get_channel_qubits(&"q-R-D".into()).len(), 4);
        assert_eq!(topo.channels.quantum(&"q-S-R".into()).unwrap().link_arch, LinkArch::Sim);
    }

    #[test]
    fn test_arch_labels() {
        assert_eq!(arch_pair("SIM-DIM").unwrap(), [LinkArch::Sim, LinkArch::DimBk]);
        assert_eq!(arch_pair("SR-SR").unwrap(), [LinkArch::Sr, LinkArch::Sr]);
        assert!(arch_pair("SR").is_err());
        assert!(arch_pair("SR-XX").is_err());
    }

    #[test]
    fn test_rate_point_statistics() {
        let report = |throughput| NetworkReport {
            run_id: uuid::Uuid::nil(),
            seed: 0,
            mux: "buffer-space".into(),
            duration_secs: 1.0,
            events: 0,
            paths: vec![crate::network::PathReport {
                path_id: 0,
                route: Vec::new(),
                e2e_pairs: 0,
                throughput,
                mean_fidelity: 0.9,
            }],
            nodes: Default::default(),
            totals: Default::default(),
        };
        let point = rate_point(0.01, &[report(10.0), report(20.0)]);
        assert!((point.mean_rate - 15.0).abs() < 1e-12);
        assert!((point.std_rate - 5.0).abs() < 1e-12);
        assert!((point.mean_fidelity - 0.9).abs() < 1e-12);
    }
}
