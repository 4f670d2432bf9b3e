//! Forwarder counters

use std::collections::BTreeMap;

use serde::Serialize;

use qnet_core::NodeId;

/// Per-node forwarding statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForwarderStats {
    /// Elementary pairs handed to the forwarder
    pub n_entg: u64,
    /// Purification rounds started
    pub n_purif: u64,
    pub n_purif_failed: u64,
    /// Pairs that reached ELIGIBLE
    pub n_eligible: u64,
    /// Successful swaps
    pub n_swapped: u64,
    pub n_swap_failed: u64,
    /// Updates dropped because a parallel swap chose another path
    pub n_parallel_conflicts: u64,
    /// End-to-end pairs consumed at this node
    pub n_consumed: u64,
    pub n_decohered: u64,
    /// Mean fidelity of consumed pairs
    pub mean_fidelity: f64,
    /// Consumed pairs by the node holding the other half
    pub consumed_with: BTreeMap<NodeId, u64>,
}

impl ForwarderStats {
    pub fn record_consumed(&mut self, partner: &NodeId, fidelity: f64) {
        *self.consumed_with.entry(partner.clone()).or_default() += 1;
        self.n_consumed += 1;
        self.mean_fidelity += (fidelity - self.mean_fidelity) / self.n_consumed as f64;
    }

    /// Add another node's counters; means are weighted by consumption
    pub fn merge(&mut self, other: &ForwarderStats) {
        let total = self.n_consumed + other.n_consumed;
        if total > 0 {
            self.mean_fidelity = (self.mean_fidelity * self.n_consumed as f64
                + other.mean_fidelity * other.n_consumed as f64)
                / total as f64;
        }
        self.n_entg += other.n_entg;
        self.n_purif += other.n_purif;
        self.n_purif_failed += other.n_purif_failed;
        self.n_eligible += other.n_eligible;
        self.n_swapped += other.n_swapped;
        self.n_swap_failed += other.n_swap_failed;
        self.n_parallel_conflicts += other.n_parallel_conflicts;
        self.n_consumed = total;
        self.n_decohered += other.n_decohered;
        for (partner, n) in &other.consumed_with {
            *self.consumed_with.entry(partner.clone()).or_default() += n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean() {
        let mut stats = ForwarderStats::default();
        for f in [0.9, 0.8, 0.7] {
            stats.record_consumed(&NodeId::from("D"), f);
        }
        assert_eq!(stats.n_consumed, 3);
        assert_eq!(stats.consumed_with[&NodeId::from("D")], 3);
        assert!((stats.mean_fidelity - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_merge_weights_means() {
        let mut a = ForwarderStats::default();
        a.record_consumed(&NodeId::from("D"), 0.9);
        let mut b = ForwarderStats { n_swapped: 4, ..Default::default() };
        for _ in 0..3 {
            b.record_consumed(&NodeId::from("E"), 0.5);
        }
        a.merge(&b);
        assert_eq!(a.n_consumed, 4);
        assert_eq!(a.n_swapped, 4);
        assert!((a.mean_fidelity - 0.6).abs() < 1e-12);
        assert_eq!(a.consumed_with.len(), 2);
    }

    #[test]
    fn test_serializes_counters() {
        let json = serde_json::to_value(ForwarderStats::default()).unwrap();
        assert_eq!(json["n_consumed"], 0);
    }
}
