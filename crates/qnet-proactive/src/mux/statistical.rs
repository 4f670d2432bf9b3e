//! Statistical multiplexing
//!
//! Memory is not split between paths. A fresh pair may serve every path
//! using its channel, and each swap narrows the candidate set of the result
//! to the paths its two inputs have in common. Only plain end-to-end
//! swapping (`swap = [1, 0, .., 0, 1]`) without purification is supported.
//!
//! With coordinated decisions, the path picked at swap time is published on
//! a board shared by every node, so the far endpoints see the narrowed
//! candidate set before the swap update reaches them. An entry lives until
//! the update retiring its pair is processed or the holder drops the pair.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use rand::seq::IndexedRandom;

use qnet_core::{Addr, ChannelId, NodeId, PathDirection, PathId, PathInstructions, WernerEpr};
use qnet_memory::{MemoryError, QuantumMemory, QubitState};
use qnet_routing::{FibEntry, FibError};
use tracing::debug;

use super::{
    Admission, ChannelPathMap, MuxContext, MuxScheme, SwapCandidate, channel_candidates, has_common_path,
    rank_admission,
};
use crate::error::{ForwarderError, ForwarderResult};
use crate::select::QubitSelector;

/// Path decisions shared by every node of one network
#[derive(Debug, Clone, Default)]
pub struct SharedDecisions(Rc<RefCell<BTreeMap<String, PathId>>>);

impl SharedDecisions {
    pub fn get(&self, name: &str) -> Option<PathId> {
        self.0.borrow().get(name).copied()
    }

    pub fn commit(&self, name: &str, path_id: PathId) {
        self.0.borrow_mut().insert(name.to_string(), path_id);
    }

    /// Drop the decision about `name`; returns whether one was published
    pub fn forget(&self, name: &str) -> bool {
        self.0.borrow_mut().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatisticalMux {
    channels: ChannelPathMap,
    decisions: Option<SharedDecisions>,
}

impl StatisticalMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish swap-time path choices on `decisions`
    pub fn coordinated(decisions: SharedDecisions) -> Self {
        Self { channels: ChannelPathMap::default(), decisions: Some(decisions) }
    }

    pub fn is_coordinated(&self) -> bool {
        self.decisions.is_some()
    }
}

impl MuxScheme for StatisticalMux {
    fn name(&self) -> &'static str {
        "statistical"
    }

    fn validate_path_instructions(&self, instructions: &PathInstructions) -> ForwarderResult<()> {
        qnet_routing::validate_path_instructions(instructions)?;
        let last = instructions.swap.len() - 1;
        let asap = instructions
            .swap
            .iter()
            .enumerate()
            .all(|(i, &rank)| rank == if i == 0 || i == last { 1 } else { 0 });
        let reason = if !asap {
            "statistical multiplexing requires swap = [1, 0, .., 0, 1]"
        } else if instructions.purif.values().any(|&rounds| rounds > 0) {
            "statistical multiplexing does not support purification"
        } else if instructions.m_v.is_some() {
            "statistical multiplexing does not use m_v"
        } else {
            return Ok(());
        };
        Err(FibError::InvalidInstructions(reason.to_string()).into())
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

    fn pair_retired(&mut self, name: &str) {
        if let Some(decisions) = &self.decisions {
            if decisions.forget(name) {
                debug!(pair = name, remaining = decisions.len(), "path decision retired");
            }
        }
    }

    fn reset_cycle(&mut self) {
        if let Some(decisions) = &self.decisions {
            decisions.clear();
        }
    }

    fn path_candidates(&self, epr: &WernerEpr) -> Option<BTreeSet<PathId>> {
        match self.decisions.as_ref().and_then(|d| d.get(&epr.name)) {
            Some(decided) => Some(BTreeSet::from([decided])),
            None => epr.tmp_path_ids.clone(),
        }
    }

    fn qubit_is_entangled(
        &mut self,
        addr: Addr,
        neighbor: &NodeId,
        ctx: &mut MuxContext<'_>,
    ) -> ForwarderResult<Admission> {
        let channel_paths = channel_candidates(&self.channels, ctx.memory, addr)?;
        if channel_paths.is_empty() {
            return Ok(Admission::Release);
        }
        let (_, epr) = ctx.memory.get_mut(addr).ok_or(MemoryError::EmptySlot(addr))?;
        let candidates = match &epr.tmp_path_ids {
            None => channel_paths,
            Some(carried) => {
                let live: BTreeSet<PathId> = carried.iter().copied().filter(|&p| ctx.fib.contains(p)).collect();
                if live.is_empty() {
                    debug!(addr, pair = %epr.name, "candidate paths no longer installed");
                    return Ok(Admission::Release);
                }
                // a coordinated decision may narrow the set, nothing else may change it
                let consistent = if self.is_coordinated() {
                    live.is_subset(&channel_paths)
                } else {
                    live == channel_paths
                };
                if !consistent {
                    return Err(ForwarderError::CandidateMismatch {
                        name: epr.name.clone(),
                        carried: carried.clone(),
                        channel: channel_paths,
                    });
                }
                live
            }
        };
        epr.tmp_path_ids = Some(candidates);

        let candidates =
            self.path_candidates(epr).ok_or_else(|| ForwarderError::NoPathCandidates(epr.name.clone()))?;
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
        let channel =
            ctx.memory.qubit(addr)?.qchannel.clone().ok_or(ForwarderError::UnassignedQubit(addr))?;
        let matched = self.channels.matching_channels(&channel, &own_paths);
        if matched.is_empty() {
            return Ok(None);
        }

        let this = &*self;
        let found = selector.select(
            ctx.memory.find_occupied(|q, other| {
                q.addr != addr
                    && q.state() == QubitState::Eligible
                    && q.qchannel.as_ref().is_some_and(|c| matched.contains(c))
                    && has_common_path(Some(&own_paths), this.path_candidates(other).as_ref())
            }),
            ctx.rng,
        );
        let Some(partner) = found else {
            return Ok(None);
        };

        let (_, other) = ctx.memory.get_must(partner)?;
        let other_name = other.name.clone();
        let common: Vec<PathId> = match self.path_candidates(other) {
            Some(other_paths) => own_paths.intersection(&other_paths).copied().collect(),
            None => Vec::new(),
        };
        let Some(&path_id) = common.choose(ctx.rng) else {
            return Ok(None);
        };

        if let Some(decisions) = &self.decisions {
            decisions.commit(&epr.name, path_id);
            decisions.commit(&other_name, path_id);
            for key in [addr, partner] {
                if let Some((_, local)) = ctx.memory.get_mut(key) {
                    local.tmp_path_ids = Some(BTreeSet::from([path_id]));
                }
            }
            debug!(left = %epr.name, right = %other_name, path_id, "path decision published");
        }
        Ok(Some(SwapCandidate { addr: partner, path_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Two paths S-R-D and S-R-E sharing the S-R channel at R
    fn setup(mux: &mut StatisticalMux) -> (qnet_routing::Fib, QuantumMemory) {
        let p0 = PathInstructions::new(0, route(&["S", "R", "D"]), vec![1, 0, 1]);
        let p1 = PathInstructions::new(1, route(&["S", "R", "E"]), vec![1, 0, 1]);
        let fib = fib_for("R", &[(0, p0.clone()), (1, p1.clone())]);
        let mut memory = QuantumMemory::new("R", 6, 0.0);
        memory.assign(&channel("S", "R"), 2);
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
    fn test_rejects_unsupported_instructions() {
        let mux = StatisticalMux::new();
        let ok = PathInstructions::new(0, route(&["S", "R", "D"]), vec![1, 0, 1]);
        assert!(mux.validate_path_instructions(&ok).is_ok());

        let ranked = PathInstructions::new(0, route(&["S", "R1", "R2", "D"]), vec![2, 0, 1, 2]);
        assert!(matches!(
            mux.validate_path_instructions(&ranked),
            Err(ForwarderError::Fib(FibError::InvalidInstructions(_)))
        ));
        assert!(mux.validate_path_instructions(&ok.clone().with_purif("S-R", 1)).is_err());
        assert!(mux.validate_path_instructions(&ok.with_m_v(vec![(1, 1), (1, 1)])).is_err());
    }

    #[test]
    fn test_new_pair_may_serve_every_path_on_channel() {
        let mut mux = StatisticalMux::new();
        let (fib, mut memory) = setup(&mut mux);
        let addr = store(&mut memory, pair("l", "S", "R"), &channel("S", "R"));
        let mut rng = StdRng::seed_from_u64(1);
        let own = node("R");
        let mut ctx = MuxContext { own: &own, fib: &fib, memory: &mut memory, rng: &mut rng };

        let admission = mux.qubit_is_entangled(addr, &node("S"), &mut ctx).unwrap();
        assert_eq!(admission, Admission::Purif { initiator: true });
        assert_eq!(ctx.memory.get(addr).unwrap().1.tmp_path_ids, Some(BTreeSet::from([0, 1])));
    }

    #[test]
    fn test_uninstalled_channel_releases() {
        let mut mux = StatisticalMux::new();
        let (fib, mut memory) = setup(&mut mux);
        let entry = fib.get(1).unwrap();
        mux.uninstall_path_neighbor(entry, PathDirection::Right, &node("E"), &channel("R", "E"), &mut memory)
            .unwrap();
        let addr = store(&mut memory, pair("r", "R", "E"), &channel("R", "E"));
        let mut rng = StdRng::seed_from_u64(1);
        let own = node("R");
        let mut ctx = MuxContext { own: &own, fib: &fib, memory: &mut memory, rng: &mut rng };
        assert_eq!(mux.qubit_is_entangled(addr, &node("E"), &mut ctx).unwrap(), Admission::Release);
    }

    /// S classifies its half of a pair knowing only path 0 on the S-R channel
    fn classified_at_s() -> WernerEpr {
        let p0 = PathInstructions::new(0, route(&["S", "R", "D"]), vec![1, 0, 1]);
        let fib = fib_for("S", &[(0, p0.clone())]);
        let mut memory = QuantumMemory::new("S", 2, 0.0);
        memory.assign(&channel("S", "R"), 2);
        let mut mux = StatisticalMux::new();
        let entry = fib.get(0).unwrap();
        mux.install_path_neighbor(&p0, entry, PathDirection::Right, &node("R"), &channel("S", "R"), &mut memory)
            .unwrap();
        let addr = store(&mut memory, pair("l", "S", "R"), &channel("S", "R"));
        let mut rng = StdRng::seed_from_u64(1);
        let own = node("S");
        let mut ctx = MuxContext { own: &own, fib: &fib, memory: &mut memory, rng: &mut rng };
        mux.qubit_is_entangled(addr, &node("R"), &mut ctx).unwrap();
        ctx.memory.get(addr).unwrap().1.clone()
    }

    #[test]
    fn test_peer_candidates_must_match_channel() {
        let at_s = classified_at_s();
        assert_eq!(at_s.tmp_path_ids, Some(BTreeSet::from([0])));
        let own = node("R");

        // R shares S-R with paths 0 and 1, so S's view disagrees
        let mut mux = StatisticalMux::new();
        let (fib, mut memory) = setup(&mut mux);
        let addr = store(&mut memory, at_s.clone(), &channel("S", "R"));
        let mut rng = StdRng::seed_from_u64(1);
        let mut ctx = MuxContext { own: &own, fib: &fib, memory: &mut memory, rng: &mut rng };
        let err = mux.qubit_is_entangled(addr, &node("S"), &mut ctx).unwrap_err();
        assert_eq!(
            err,
            ForwarderError::CandidateMismatch {
                name: "l".into(),
                carried: BTreeSet::from([0]),
                channel: BTreeSet::from([0, 1]),
            }
        );

        // a published decision may narrow the set
        let mut coordinated = StatisticalMux::coordinated(SharedDecisions::default());
        let (fib, mut memory) = setup(&mut coordinated);
        let addr = store(&mut memory, at_s.clone(), &channel("S", "R"));
        let mut ctx = MuxContext { own: &own, fib: &fib, memory: &mut memory, rng: &mut rng };
        coordinated.qubit_is_entangled(addr, &node("S"), &mut ctx).unwrap();
        assert_eq!(ctx.memory.get(addr).unwrap().1.tmp_path_ids, Some(BTreeSet::from([0])));

        // matching sets pass unchanged
        let mut mux = StatisticalMux::new();
        let (fib, mut memory) = setup(&mut mux);
        let mut agreed = at_s.clone();
        agreed.tmp_path_ids = Some(BTreeSet::from([0, 1]));
        let addr = store(&mut memory, agreed, &channel("S", "R"));
        let mut ctx = MuxContext { own: &own, fib: &fib, memory: &mut memory, rng: &mut rng };
        mux.qubit_is_entangled(addr, &node("S"), &mut ctx).unwrap();
        assert_eq!(ctx.memory.get(addr).unwrap().1.tmp_path_ids, Some(BTreeSet::from([0, 1])));
    }

    #[test]
    fn test_carried_paths_uninstalled_here_release() {
        let mut stale = classified_at_s();
        stale.tmp_path_ids = Some(BTreeSet::from([7]));
        let mut mux = StatisticalMux::new();
        let (fib, mut memory) = setup(&mut mux);
        let addr = store(&mut memory, stale, &channel("S", "R"));
        let mut rng = StdRng::seed_from_u64(1);
        let own = node("R");
        let mut ctx = MuxContext { own: &own, fib: &fib, memory: &mut memory, rng: &mut rng };
        assert_eq!(mux.qubit_is_entangled(addr, &node("S"), &mut ctx).unwrap(), Admission::Release);
    }

    #[test]
    fn test_swap_candidate_on_common_path() {
        let mut mux = StatisticalMux::new();
        let (fib, mut memory) = setup(&mut mux);
        let left = store(&mut memory, pair("l", "S", "R"), &channel("S", "R"));
        let right = store(&mut memory, pair("r", "R", "E"), &channel("R", "E"));
        let mut rng = StdRng::seed_from_u64(1);
        let own = node("R");
        let mut ctx = MuxContext { own: &own, fib: &fib, memory: &mut memory, rng: &mut rng };
        mux.qubit_is_entangled(left, &node("S"), &mut ctx).unwrap();
        mux.qubit_is_entangled(right, &node("E"), &mut ctx).unwrap();
        make_eligible(ctx.memory, left);
        make_eligible(ctx.memory, right);

        let epr = ctx.memory.get(left).unwrap().1.clone();
        let found = mux.find_swap_candidate(left, &epr, &QubitSelector::First, &mut ctx).unwrap();
        assert_eq!(found, Some(SwapCandidate { addr: right, path_id: 1 }));
        // uncoordinated choices stay local and leave the sets untouched
        assert_eq!(ctx.memory.get(left).unwrap().1.tmp_path_ids, Some(BTreeSet::from([0, 1])));
    }

    #[test]
    fn test_coordinated_choice_is_published() {
        let decisions = SharedDecisions::default();
        let mut mux = StatisticalMux::coordinated(decisions.clone());
        let (fib, mut memory) = setup(&mut mux);
        let left = store(&mut memory, pair("l", "S", "R"), &channel("S", "R"));
        let right = store(&mut memory, pair("r", "R", "D"), &channel("R", "D"));
        let mut rng = StdRng::seed_from_u64(5);
        let own = node("R");
        let mut ctx = MuxContext { own: &own, fib: &fib, memory: &mut memory, rng: &mut rng };
        mux.qubit_is_entangled(left, &node("S"), &mut ctx).unwrap();
        mux.qubit_is_entangled(right, &node("D"), &mut ctx).unwrap();
        make_eligible(ctx.memory, left);
        make_eligible(ctx.memory, right);

        let epr = ctx.memory.get(left).unwrap().1.clone();
        let found = mux.find_swap_candidate(left, &epr, &QubitSelector::First, &mut ctx).unwrap().unwrap();
        assert_eq!(found.path_id, 0);
        assert_eq!(decisions.get("l"), Some(0));
        assert_eq!(decisions.get("r"), Some(0));
        assert_eq!(decisions.len(), 2);

        // the S endpoint sees the decision through its own scheme instance
        let far = StatisticalMux::coordinated(decisions);
        let mut copy = pair("l", "S", "R");
        copy.tmp_path_ids = Some(BTreeSet::from([0, 1]));
        assert_eq!(far.path_candidates(&copy), Some(BTreeSet::from([0])));
    }

    #[test]
    fn test_decisions_are_retired() {
        let decisions = SharedDecisions::default();
        let mut at_s = StatisticalMux::coordinated(decisions.clone());
        let mut at_d = StatisticalMux::coordinated(decisions.clone());
        for i in 0..100 {
            decisions.commit(&format!("l{i}"), 0);
            decisions.commit(&format!("r{i}"), 0);
            // the updates for both inputs reach the far endpoints
            at_s.pair_retired(&format!("l{i}"));
            at_d.pair_retired(&format!("r{i}"));
            assert!(decisions.is_empty());
        }

        decisions.commit("x", 1);
        StatisticalMux::new().pair_retired("x");
        assert_eq!(decisions.get("x"), Some(1));
        at_s.reset_cycle();
        assert!(decisions.is_empty());
        assert!(!decisions.forget("x"));
    }
}
