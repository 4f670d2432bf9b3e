//! Per-pair path binding
//!
//! Each new elementary pair is bound to exactly one of the paths using its
//! channel as soon as it is stored. Both endpoints draw the choice from a
//! generator seeded with the pair's name, so they agree without talking.

use std::collections::BTreeSet;

use rand::SeedableRng;
use rand::rngs::StdRng;

use qnet_core::{Addr, ChannelId, NodeId, PathDirection, PathInstructions, WernerEpr, name_digest};
use qnet_memory::{MemoryError, QuantumMemory, QubitState};
use qnet_routing::{FibEntry, FibError};
use tracing::debug;

use super::{Admission, ChannelPathMap, MuxContext, MuxScheme, SwapCandidate, channel_candidates, rank_admission};
use crate::error::{ForwarderError, ForwarderResult};
use crate::select::{PathSelector, QubitSelector};

#[derive(Debug, Clone, Default)]
pub struct DynamicEprMux {
    channels: ChannelPathMap,
    selector: PathSelector,
}

impl DynamicEprMux {
    pub fn new(selector: PathSelector) -> Self {
        Self { channels: ChannelPathMap::default(), selector }
    }
}

impl MuxScheme for DynamicEprMux {
    fn name(&self) -> &'static str {
        "dynamic-epr"
    }

    fn validate_path_instructions(&self, instructions: &PathInstructions) -> ForwarderResult<()> {
        qnet_routing::validate_path_instructions(instructions)?;
        if instructions.m_v.is_some() {
            return Err(FibError::InvalidInstructions("dynamic EPR multiplexing does not use m_v".into()).into());
        }
        Ok(())
    }

    fn install_path_neighbor(
        &mut self,
        _instructions: &PathInstructions,
        entry: &FibEntry,
        direction: PathDirection,
        neighbor: &NodeId,
        channel: &ChannelId,
        _memory: &mut QuantumMemory,
    ) -> ForwarderResult<()> {
        self.channels.add(channel, entry.path_id);
        debug!(path_id = entry.path_id, %direction, %neighbor, %channel, "channel shared with path");
        Ok(())
    }

    fn uninstall_path_neighbor(
        &mut self,
        entry: &FibEntry,
        _direction: PathDirection,
        _neighbor: &NodeId,
        channel: &ChannelId,
        _memory: &mut QuantumMemory,
    ) -> ForwarderResult<()> {
        self.channels.remove(channel, entry.path_id);
        Ok(())
    }

    fn qubit_has_path_id(&self) -> bool {
        false
    }

    fn qubit_is_entangled(
        &mut self,
        addr: Addr,
        neighbor: &NodeId,
        ctx: &mut MuxContext<'_>,
    ) -> ForwarderResult<Admission> {
        let channel_paths = channel_candidates(&self.channels, ctx.memory, addr)?;
        let entries: Vec<&FibEntry> = channel_paths.iter().filter_map(|&id| ctx.fib.get(id).ok()).collect();

        let (_, epr) = ctx.memory.get_mut(addr).ok_or(MemoryError::EmptySlot(addr))?;
        let mut pair_rng = StdRng::seed_from_u64(name_digest(&epr.name));
        let Some(chosen) = self.selector.select(&entries, &mut pair_rng) else {
            return Ok(Admission::Release);
        };
        let candidates = BTreeSet::from([chosen.path_id]);
        debug!(pair = %epr.name, path_id = chosen.path_id, "pair bound to path");
        epr.tmp_path_ids = Some(candidates.clone());
        rank_admission(ctx.own, epr, neighbor, ctx.fib, &candidates)
    }

    fn find_swap_candidate(
        &mut self,
        addr: Addr,
        epr: &WernerEpr,
        selector: &QubitSelector,
        ctx: &mut MuxContext<'_>,
    ) -> ForwarderResult<Option<SwapCandidate>> {
        let own_paths =
            self.path_candidates(epr).ok_or_else(|| ForwarderError::NoPathCandidates(epr.name.clone()))?;
        let Some(&path_id) = own_paths.first() else {
            return Err(ForwarderError::NoPathCandidates(epr.name.clone()));
        };
        let channel =
            ctx.memory.qubit(addr)?.qchannel.clone().ok_or(ForwarderError::UnassignedQubit(addr))?;

        let found = selector.select(
            ctx.memory.find_occupied(|q, other| {
                q.state() == QubitState::Eligible
                    && q.qchannel.as_ref().is_some_and(|c| *c != channel)
                    && other.tmp_path_ids.as_ref() == Some(&own_paths)
            }),
            ctx.rng,
        );
        Ok(found.map(|addr| SwapCandidate { addr, path_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    /// Paths 0 (S-R-D) and 1 (S-R-E) sharing the S-R channel at R
    fn setup(mux: &mut DynamicEprMux) -> (qnet_routing::Fib, QuantumMemory) {
        let p0 = PathInstructions::new(0, route(&["S", "R", "D"]), vec![1, 0, 1]);
        let p1 = PathInstructions::new(1, route(&["S", "R", "E"]), vec![1, 0, 1]);
        let fib = fib_for("R", &[(0, p0.clone()), (1, p1.clone())]);
        let mut memory = QuantumMemory::new("R", 8, 0.0);
        memory.assign(&channel("S", "R"), 4);
        memory.assign(&channel("R", "D"), 2);
        memory.assign(&channel("R", "E"), 2);
        for (instr, id, far) in [(&p0, 0, "D"), (&p1, 1, "E")] {
            let entry = fib.get(id).unwrap();
            mux.install_path_neighbor(instr, entry, PathDirection::Left, &node("S"), &channel("S", "R"), &mut memory)
                .unwrap();
            mux.install_path_neighbor(instr, entry, PathDirection::Right, &node(far), &channel("R", far), &mut memory)
                .unwrap();
        }
        (fib, memory)
    }

    #[test]
    fn test_rejects_m_v() {
        let mux = DynamicEprMux::new(PathSelector::Random);
        let p = PathInstructions::new(0, route(&["S", "R", "D"]), vec![1, 0, 1]);
        assert!(mux.validate_path_instructions(&p).is_ok());
        assert!(mux.validate_path_instructions(&p.with_m_v(vec![(1, 1), (1, 1)])).is_err());
    }

    #[test]
    fn test_both_endpoints_bind_same_path() {
        let mut at_r = DynamicEprMux::new(PathSelector::Random);
        let (fib_r, mut memory_r) = setup(&mut at_r);

        // S has both paths on its single channel towards R
        let p0 = PathInstructions::new(0, route(&["S", "R", "D"]), vec![1, 0, 1]);
        let p1 = PathInstructions::new(1, route(&["S", "R", "E"]), vec![1, 0, 1]);
        let fib_s = fib_for("S", &[(0, p0.clone()), (1, p1.clone())]);
        let mut at_s = DynamicEprMux::new(PathSelector::Random);
        let mut memory_s = QuantumMemory::new("S", 4, 0.0);
        memory_s.assign(&channel("S", "R"), 4);
        for (instr, id) in [(&p0, 0), (&p1, 1)] {
            let entry = fib_s.get(id).unwrap();
            at_s.install_path_neighbor(instr, entry, PathDirection::Right, &node("R"), &channel("S", "R"), &mut memory_s)
                .unwrap();
        }

        let mut rng = StdRng::seed_from_u64(0);
        for name in ["p", "q", "r", "s"] {
            let addr_r = store(&mut memory_r, pair(name, "S", "R"), &channel("S", "R"));
            let addr_s = store(&mut memory_s, pair(name, "S", "R"), &channel("S", "R"));

            let (own_r, own_s) = (node("R"), node("S"));
            let mut ctx = MuxContext { own: &own_r, fib: &fib_r, memory: &mut memory_r, rng: &mut rng };
            at_r.qubit_is_entangled(addr_r, &node("S"), &mut ctx).unwrap();
            let mut ctx = MuxContext { own: &own_s, fib: &fib_s, memory: &mut memory_s, rng: &mut rng };
            assert_eq!(at_s.qubit_is_entangled(addr_s, &node("R"), &mut ctx).unwrap(), Admission::Hold);

            let bound_r = memory_r.get(addr_r).unwrap().1.tmp_path_ids.clone().unwrap();
            let bound_s = memory_s.get(addr_s).unwrap().1.tmp_path_ids.clone().unwrap();
            assert_eq!(bound_r.len(), 1);
            assert_eq!(bound_r, bound_s);
        }
    }

    #[test]
    fn test_swap_candidate_requires_same_binding() {
        let mut mux = DynamicEprMux::new(PathSelector::Random);
        let (fib, mut memory) = setup(&mut mux);
        let mut rng = StdRng::seed_from_u64(0);
        let own = node("R");

        let left = store(&mut memory, pair("l", "S", "R"), &channel("S", "R"));
        let to_d = store(&mut memory, pair("d", "R", "D"), &channel("R", "D"));
        let to_e = store(&mut memory, pair("e", "R", "E"), &channel("R", "E"));
        let mut ctx = MuxContext { own: &own, fib: &fib, memory: &mut memory, rng: &mut rng };
        for (addr, neighbor) in [(left, "S"), (to_d, "D"), (to_e, "E")] {
            mux.qubit_is_entangled(addr, &node(neighbor), &mut ctx).unwrap();
            make_eligible(ctx.memory, addr);
        }

        let epr = ctx.memory.get(left).unwrap().1.clone();
        let bound = *epr.tmp_path_ids.as_ref().unwrap().first().unwrap();
        let expected = if bound == 0 { to_d } else { to_e };
        let found = mux.find_swap_candidate(left, &epr, &QubitSelector::First, &mut ctx).unwrap();
        assert_eq!(found, Some(SwapCandidate { addr: expected, path_id: bound }));
    }
}
