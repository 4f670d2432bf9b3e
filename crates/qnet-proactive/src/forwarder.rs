//! Proactive forwarder
//!
//! One [`ProactiveForwarder`] runs on every node. It owns the node's FIB and
//! multiplexing scheme and drives each stored pair through
//!
//! ```text
//! ENTANGLED0 --admit--> PURIF --rounds done--> ELIGIBLE --> swap | consume
//!      ^                 |  ^
//!      |                 v  |
//!  swap update          PENDING (purification round in flight)
//! ```
//!
//! Pairs whose partner is ahead in swap order stay in ENTANGLED0 until a
//! swap update replaces them.

use rand::Rng;
use tracing::{debug, info, instrument, trace};

use qnet_core::{
    Addr, EventKind, Message, NodeContext, NodeId, PathDirection, PathId, PathInstructions, SimTime,
    SwapUpdate, TimingPhase, WernerEpr,
};
use qnet_memory::{MemoryError, QuantumMemory, QubitState};
use qnet_routing::{Fib, FibEntry};

use crate::config::ForwarderConfig;
use crate::error::{ForwarderError, ForwarderResult};
use crate::mux::{Admission, MuxContext, MuxScheme, SwapCandidate};
use crate::parallel::ParallelSwapTable;
use crate::select::QubitSelector;
use crate::stats::ForwarderStats;

/// A pair stored during EXTERNAL, admitted when INTERNAL starts
#[derive(Debug, Clone)]
struct Deferred {
    addr: Addr,
    neighbor: NodeId,
    name: String,
}

#[derive(Debug)]
pub struct ProactiveForwarder {
    config: ForwarderConfig,
    mux: Box<dyn MuxScheme>,
    fib: Fib,
    swap_selector: QubitSelector,
    purif_selector: QubitSelector,
    parallel: ParallelSwapTable,
    deferred: Vec<Deferred>,
    stats: ForwarderStats,
}

impl ProactiveForwarder {
    pub fn new(config: ForwarderConfig, mux: Box<dyn MuxScheme>) -> Self {
        Self {
            swap_selector: config.swap_selection.into(),
            purif_selector: config.purif_selection.into(),
            config,
            mux,
            fib: Fib::new(),
            parallel: ParallelSwapTable::new(),
            deferred: Vec::new(),
            stats: ForwarderStats::default(),
        }
    }

    pub fn with_swap_selector(mut self, selector: QubitSelector) -> Self {
        self.swap_selector = selector;
        self
    }

    pub fn with_purif_selector(mut self, selector: QubitSelector) -> Self {
        self.purif_selector = selector;
        self
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn fib(&self) -> &Fib {
        &self.fib
    }

    pub fn mux(&self) -> &dyn MuxScheme {
        self.mux.as_ref()
    }

    pub fn stats(&self) -> &ForwarderStats {
        &self.stats
    }

    pub fn parallel_swaps(&self) -> &ParallelSwapTable {
        &self.parallel
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Install a path and start generation towards the right-hand neighbor
    pub fn handle_install_path(
        &mut self,
        path_id: PathId,
        instructions: &PathInstructions,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        self.mux.validate_path_instructions(instructions)?;
        let entry = FibEntry::from_instructions(path_id, instructions, &ctx.own)?;
        if self.fib.contains(path_id) {
            return Err(qnet_routing::FibError::DuplicatePath(path_id).into());
        }

        for (direction, neighbor) in neighbors(&entry) {
            let channel = ctx.channels.quantum_between(&ctx.own, &neighbor)?.name.clone();
            self.mux.install_path_neighbor(instructions, &entry, direction, &neighbor, &channel, memory)?;
            if direction == PathDirection::Right {
                let path_id = self.mux.qubit_has_path_id().then_some(path_id);
                ctx.schedule_local(
                    SimTime::ZERO,
                    EventKind::ManageActiveChannels { start: true, channel, path_id, neighbor },
                );
            }
        }
        info!(node = %ctx.own, path_id, route = ?entry.route, swap = ?entry.swap, mux = self.mux.name(), "path installed");
        self.fib.insert(entry)?;
        Ok(())
    }

    pub fn handle_uninstall_path(
        &mut self,
        path_id: PathId,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        let entry = self.fib.remove(path_id)?;
        let held: Vec<Addr> =
            memory.find_occupied(|q, _| q.path_id == Some(path_id)).map(|(q, _)| q.addr).collect();
        for addr in held {
            self.release_qubit(addr, memory, ctx)?;
        }
        for (direction, neighbor) in neighbors(&entry) {
            let channel = ctx.channels.quantum_between(&ctx.own, &neighbor)?.name.clone();
            self.mux.uninstall_path_neighbor(&entry, direction, &neighbor, &channel, memory)?;
            if direction == PathDirection::Right {
                let path_id = self.mux.qubit_has_path_id().then_some(path_id);
                ctx.schedule_local(
                    SimTime::ZERO,
                    EventKind::ManageActiveChannels { start: false, channel, path_id, neighbor },
                );
            }
        }
        info!(node = %ctx.own, path_id, "path uninstalled");
        Ok(())
    }

    /// Timing phase boundary
    ///
    /// EXTERNAL forgets all transient state; INTERNAL admits the pairs
    /// stored during the preceding EXTERNAL phase.
    pub fn handle_phase(
        &mut self,
        phase: TimingPhase,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        match phase {
            TimingPhase::External => {
                self.deferred.clear();
                self.parallel.clear();
                self.mux.reset_cycle();
                Ok(())
            }
            TimingPhase::Internal => {
                let deferred = std::mem::take(&mut self.deferred);
                debug!(node = %ctx.own, count = deferred.len(), "admitting deferred pairs");
                for d in deferred {
                    let still_stored = memory
                        .get(d.addr)
                        .is_some_and(|(q, e)| e.name == d.name && q.state() == QubitState::Entangled0);
                    if still_stored {
                        self.process_entangled(d.addr, &d.neighbor, memory, ctx)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// The link layer stored a new elementary pair at `addr`
    pub fn handle_qubit_entangled(
        &mut self,
        neighbor: &NodeId,
        addr: Addr,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        if !ctx.timing.is_async() && ctx.phase() == TimingPhase::External {
            let (_, epr) = memory.get_must(addr)?;
            trace!(node = %ctx.own, addr, name = %epr.name, "deferred until INTERNAL");
            self.deferred.push(Deferred { addr, neighbor: neighbor.clone(), name: epr.name.clone() });
            return Ok(());
        }
        self.process_entangled(addr, neighbor, memory, ctx)
    }

    /// The pair `name` at `addr` expired in memory
    pub fn handle_qubit_decohered(&mut self, addr: Addr, name: &str, ctx: &NodeContext<'_>) {
        self.stats.n_decohered += 1;
        self.deferred.retain(|d| d.addr != addr);
        self.mux.pair_retired(name);
        debug!(node = %ctx.own, addr, name, "pair decohered");
    }

    /// Forwarding messages; link-layer messages are ignored
    pub fn handle_message(
        &mut self,
        from: &NodeId,
        msg: &Message,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        match msg {
            Message::SwapUpdate(su) => self.handle_swap_update(from, su, memory, ctx),
            Message::PurifSolicit { path_id, kept, measured } => {
                self.handle_purif_solicit(from, *path_id, kept, measured, memory, ctx)
            }
            Message::PurifResponse { kept, measured, outcome, .. } => {
                self.handle_purif_response(kept, measured, outcome.as_ref(), memory, ctx)
            }
            Message::ReserveQubit { .. } | Message::ReserveQubitOk { .. } => Ok(()),
        }
    }

    fn process_entangled(
        &mut self,
        addr: Addr,
        neighbor: &NodeId,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        self.stats.n_entg += 1;
        let admission = {
            let mut mctx = MuxContext { own: &ctx.own, fib: &self.fib, memory: &mut *memory, rng: &mut *ctx.rng };
            self.mux.qubit_is_entangled(addr, neighbor, &mut mctx)?
        };
        debug!(node = %ctx.own, addr, %neighbor, ?admission, "qubit entangled");
        self.admit(addr, admission, memory, ctx)
    }

    fn admit(
        &mut self,
        addr: Addr,
        admission: Admission,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        match admission {
            Admission::Release => self.release_qubit(addr, memory, ctx),
            Admission::Hold => Ok(()),
            Admission::Purif { initiator } => {
                let qubit = memory.qubit_mut(addr)?;
                if qubit.state() != QubitState::Purif {
                    qubit.set_state(QubitState::Purif)?;
                }
                self.enter_purif(addr, initiator, memory, ctx)
            }
        }
    }

    /// Run purification rounds until the segment's schedule is met
    fn enter_purif(
        &mut self,
        addr: Addr,
        initiator: bool,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        let (_, epr) = memory.get_must(addr)?;
        let partner = epr.partner_of(&ctx.own)?.clone();
        let candidates =
            self.mux.path_candidates(epr).ok_or_else(|| ForwarderError::NoPathCandidates(epr.name.clone()))?;
        let required = candidates
            .iter()
            .filter_map(|&id| self.fib.get(id).ok())
            .map(|entry| entry.purif_rounds(&ctx.own, &partner))
            .max()
            .unwrap_or(0);
        let rounds = epr.purif_rounds;

        if rounds >= required {
            memory.qubit_mut(addr)?.set_state(QubitState::Eligible)?;
            self.stats.n_eligible += 1;
            return self.handle_eligible(addr, memory, ctx);
        }
        if !initiator {
            trace!(node = %ctx.own, addr, rounds, required, "waiting for partner to purify");
            return Ok(());
        }

        let kept_name = epr.name.clone();
        let own = ctx.own.clone();
        let mux = self.mux.as_ref();
        let measured = self.purif_selector.select(
            memory.find_occupied(|q, other| {
                q.addr != addr
                    && q.state() == QubitState::Purif
                    && other.purif_rounds == rounds
                    && other.partner_of(&own).is_ok_and(|p| *p == partner)
                    && mux.path_candidates(other).as_ref() == Some(&candidates)
            }),
            &mut *ctx.rng,
        );
        let Some(measured) = measured else {
            trace!(node = %ctx.own, addr, rounds, required, "no purification partner yet");
            return Ok(());
        };

        memory.qubit_mut(addr)?.set_state(QubitState::Pending)?;
        memory.qubit_mut(measured)?.set_state(QubitState::Pending)?;
        let measured_name = memory.get_must(measured)?.1.name.clone();
        self.stats.n_purif += 1;
        debug!(node = %ctx.own, kept = %kept_name, measured = %measured_name, %partner, round = rounds + 1, "purification solicit");
        let path_id = candidates.first().copied();
        ctx.send(&partner, Message::PurifSolicit { path_id, kept: kept_name, measured: measured_name })?;
        Ok(())
    }

    fn handle_purif_solicit(
        &mut self,
        from: &NodeId,
        path_id: Option<PathId>,
        kept: &str,
        measured: &str,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        let kept_addr = memory.get(kept).map(|(q, _)| q.addr);
        let measured_addr = memory.get(measured).map(|(q, _)| q.addr);

        let outcome = match (kept_addr, measured_addr) {
            (Some(kept_addr), Some(measured_addr)) => {
                let rate = memory.decoherence_rate();
                let (_, mut sacrificed) = memory.read_must(measured_addr)?;
                self.release_slot(measured_addr, memory, ctx)?;
                sacrificed.decay_to(ctx.now, rate);

                let (_, target) = memory.get_mut(kept_addr).ok_or(MemoryError::EmptySlot(kept_addr))?;
                target.decay_to(ctx.now, rate);
                if target.purify(&sacrificed, &mut *ctx.rng) {
                    debug!(node = %ctx.own, kept, fidelity = target.fidelity, rounds = target.purif_rounds, "purification succeeded");
                    Some((kept_addr, target.clone()))
                } else {
                    debug!(node = %ctx.own, kept, "purification failed");
                    self.release_qubit(kept_addr, memory, ctx)?;
                    None
                }
            }
            (kept_addr, measured_addr) => {
                debug!(node = %ctx.own, kept, measured, "purification pair gone");
                for addr in [kept_addr, measured_addr].into_iter().flatten() {
                    self.release_qubit(addr, memory, ctx)?;
                }
                None
            }
        };

        let response = Message::PurifResponse {
            path_id,
            kept: kept.to_string(),
            measured: measured.to_string(),
            outcome: outcome.as_ref().map(|(_, epr)| epr.clone()),
        };
        ctx.send(from, response)?;

        if let Some((addr, _)) = outcome {
            if memory.qubit(addr)?.state() == QubitState::Purif {
                self.enter_purif(addr, false, memory, ctx)?;
            }
        }
        Ok(())
    }

    fn handle_purif_response(
        &mut self,
        kept: &str,
        measured: &str,
        outcome: Option<&WernerEpr>,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        if let Some(addr) = memory.get(measured).map(|(q, _)| q.addr) {
            self.release_qubit(addr, memory, ctx)?;
        }
        let Some((qubit, _)) = memory.get(kept) else {
            debug!(node = %ctx.own, kept, "purified pair already gone");
            return Ok(());
        };
        if qubit.state() != QubitState::Pending {
            debug!(node = %ctx.own, kept, state = %qubit.state(), "stale purification response");
            return Ok(());
        }
        let addr = qubit.addr;

        match outcome {
            Some(result) => {
                let (qubit, epr) = memory.get_mut(addr).ok_or(MemoryError::EmptySlot(addr))?;
                epr.fidelity = result.fidelity;
                epr.fidelity_time = result.fidelity_time;
                epr.purif_rounds = result.purif_rounds;
                qubit.set_state(QubitState::Purif)?;
                self.enter_purif(addr, true, memory, ctx)
            }
            None => {
                self.stats.n_purif_failed += 1;
                self.release_qubit(addr, memory, ctx)
            }
        }
    }

    /// Consume, hold or swap an ELIGIBLE pair
    fn handle_eligible(
        &mut self,
        addr: Addr,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        let epr = memory.get_must(addr)?.1.clone();
        let partner = epr.partner_of(&ctx.own)?.clone();
        let candidates =
            self.mux.path_candidates(&epr).ok_or_else(|| ForwarderError::NoPathCandidates(epr.name.clone()))?;
        let entries: Vec<&FibEntry> = candidates.iter().filter_map(|&id| self.fib.get(id).ok()).collect();

        if entries.is_empty() {
            debug!(node = %ctx.own, name = %epr.name, "no installed path left for pair");
            return self.release_qubit(addr, memory, ctx);
        }
        if entries.iter().any(|e| e.is_endpoint_pair(&ctx.own, &partner)) {
            return self.consume(addr, memory, ctx);
        }
        if entries.iter().all(|e| e.is_endpoint(&ctx.own)) {
            trace!(node = %ctx.own, name = %epr.name, "endpoint holds partial pair");
            return Ok(());
        }

        let candidate = {
            let mut mctx = MuxContext { own: &ctx.own, fib: &self.fib, memory: &mut *memory, rng: &mut *ctx.rng };
            self.mux.find_swap_candidate(addr, &epr, &self.swap_selector, &mut mctx)?
        };
        match candidate {
            Some(candidate) => self.do_swap(addr, candidate, memory, ctx),
            None => {
                trace!(node = %ctx.own, name = %epr.name, "no swap partner yet");
                Ok(())
            }
        }
    }

    #[instrument(level = "debug", skip_all, fields(node = %ctx.own, path_id = candidate.path_id))]
    fn do_swap(
        &mut self,
        addr: Addr,
        candidate: SwapCandidate,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        self.prune_parallel(ctx);
        let rate = memory.decoherence_rate();
        let (_, mut a) = memory.read_must(addr)?;
        let (_, mut b) = memory.read_must(candidate.addr)?;
        a.decay_to(ctx.now, rate);
        b.decay_to(ctx.now, rate);
        let (prev, next) = WernerEpr::orient(&ctx.own, &a, &b)?;

        let new = if ctx.rng.random_bool(self.config.ps.clamp(0.0, 1.0)) {
            let mut new = prev.swap_with(next, ctx.now);
            self.mux.swapping_succeeded(prev, next, &mut new)?;
            self.stats.n_swapped += 1;
            debug!(prev = %prev.name, next = %next.name, new = %new.name, fidelity = new.fidelity, "swapped");
            Some(new)
        } else {
            self.stats.n_swap_failed += 1;
            debug!(prev = %prev.name, next = %next.name, "swap failed");
            None
        };

        self.release_slot(addr, memory, ctx)?;
        self.release_slot(candidate.addr, memory, ctx)?;

        for (to, old) in [(&prev.src, &prev.name), (&next.dst, &next.name)] {
            let su = SwapUpdate {
                path_id: candidate.path_id,
                swapping_node: ctx.own.clone(),
                old: old.clone(),
                new: new.clone(),
            };
            ctx.send(to, Message::SwapUpdate(su))?;
        }
        if let Some(new) = new {
            let hold = hold_until(ctx, &[&prev.src, &next.dst]);
            self.parallel.record(candidate.path_id, prev.clone(), next.clone(), new, hold);
        }
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(node = %ctx.own, %from, old = %su.old))]
    fn handle_swap_update(
        &mut self,
        from: &NodeId,
        su: &SwapUpdate,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        self.prune_parallel(ctx);
        self.mux.pair_retired(&su.old);
        if let Some(addr) = memory.get(su.old.as_str()).map(|(q, _)| q.addr) {
            let Some(new) = su.new.clone() else {
                debug!("swap failed upstream, releasing");
                return self.release_qubit(addr, memory, ctx);
            };
            memory.replace(addr, new)?;
            memory.qubit_mut(addr)?.set_state(QubitState::Entangled0)?;
            let (_, epr) = memory.get_must(addr)?;
            let partner = epr.partner_of(&ctx.own)?.clone();
            let admission = self.mux.can_enter_purif(&ctx.own, epr, &partner, &self.fib)?;
            debug!(new = %epr.name, %partner, ?admission, "pair extended");
            return self.admit(addr, admission, memory, ctx);
        }

        let Some((id, side)) = self.parallel.lookup(&su.old) else {
            debug!("update for unknown pair dropped");
            return Ok(());
        };
        self.handle_parallel_update(id, side, su, ctx)
    }

    fn prune_parallel(&mut self, ctx: &NodeContext<'_>) {
        let pruned = self.parallel.prune_expired(ctx.now);
        if pruned > 0 {
            trace!(node = %ctx.own, pruned, remaining = self.parallel.len(), "expired parallel swaps pruned");
        }
    }

    /// Merge an update for a pair this node already swapped away
    fn handle_parallel_update(
        &mut self,
        id: u64,
        side: crate::parallel::SwapSide,
        su: &SwapUpdate,
        ctx: &mut NodeContext<'_>,
    ) -> ForwarderResult<()> {
        let Some(record) = self.parallel.get(id) else {
            return Ok(());
        };
        let other = side.other();
        let far = record.far(other).clone();
        let last_sent = record.last_sent(other).to_string();

        let Some(new) = &su.new else {
            debug!(%far, "parallel swap failed, notifying far end");
            let notify = SwapUpdate { path_id: record.path_id, swapping_node: ctx.own.clone(), old: last_sent, new: None };
            self.parallel.remove(id);
            ctx.send(&far, Message::SwapUpdate(notify))?;
            return Ok(());
        };
        if self.mux.su_parallel_has_conflict(&record.output, su.path_id) {
            self.stats.n_parallel_conflicts += 1;
            self.parallel.remove(id);
            return Ok(());
        }

        let orig = record.orig(other).clone();
        let (prev, next) = WernerEpr::orient(&ctx.own, &orig, new)?;
        let mut merged = prev.swap_with(next, ctx.now);
        self.mux.su_parallel_succeeded(&mut merged, new, &orig)?;
        debug!(%far, replaces = %last_sent, merged = %merged.name, fidelity = merged.fidelity, "parallel swap merged");

        let hold = hold_until(ctx, &[record.far(side), &far, new.partner_of(&ctx.own)?]);
        self.parallel.alias(&new.name, id, side);
        let forward =
            SwapUpdate { path_id: su.path_id, swapping_node: ctx.own.clone(), old: last_sent, new: Some(merged.clone()) };
        ctx.send(&far, Message::SwapUpdate(forward))?;
        self.parallel.forwarded(id, other, merged, hold);
        Ok(())
    }

    fn consume(&mut self, addr: Addr, memory: &mut QuantumMemory, ctx: &mut NodeContext<'_>) -> ForwarderResult<()> {
        let rate = memory.decoherence_rate();
        let (_, mut epr) = memory.read_must(addr)?;
        epr.decay_to(ctx.now, rate);
        self.stats.record_consumed(epr.partner_of(&ctx.own)?, epr.fidelity);
        self.mux.pair_retired(&epr.name);
        debug!(node = %ctx.own, name = %epr.name, fidelity = epr.fidelity, consumed = self.stats.n_consumed, "end-to-end pair consumed");
        self.release_slot(addr, memory, ctx)
    }

    /// Drop the occupant of `addr`, if any, and free the slot
    fn release_qubit(&mut self, addr: Addr, memory: &mut QuantumMemory, ctx: &mut NodeContext<'_>) -> ForwarderResult<()> {
        if let Some((_, epr)) = memory.read(addr) {
            trace!(node = %ctx.own, addr, name = %epr.name, "released");
            self.mux.pair_retired(&epr.name);
        }
        self.release_slot(addr, memory, ctx)
    }

    fn release_slot(&self, addr: Addr, memory: &mut QuantumMemory, ctx: &mut NodeContext<'_>) -> ForwarderResult<()> {
        memory.qubit_mut(addr)?.set_state(QubitState::Release)?;
        ctx.schedule_local(SimTime::ZERO, EventKind::QubitReleased { addr });
        Ok(())
    }
}

/// Latest time an update about a pair shared with `peers` can still arrive
fn hold_until(ctx: &NodeContext<'_>, peers: &[&NodeId]) -> SimTime {
    peers
        .iter()
        .filter_map(|peer| ctx.channels.classic_between(&ctx.own, peer).ok())
        .fold(ctx.now, |at, channel| at + channel.one_way_delay() * 2)
}

/// Route neighbors of the owning node, left first
fn neighbors(entry: &FibEntry) -> Vec<(PathDirection, NodeId)> {
    [(PathDirection::Left, entry.left_neighbor()), (PathDirection::Right, entry.right_neighbor())]
        .into_iter()
        .filter_map(|(direction, neighbor)| neighbor.map(|n| (direction, n.clone())))
        .collect()
}
