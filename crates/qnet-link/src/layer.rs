//! Link layer state machine
//!
//! A node is the *initiator* of a channel when the forwarder activated it
//! towards its right-hand neighbor, and the *responder* otherwise. Only the
//! initiator reserves qubits; the responder accepts reservations when it has
//! a matching free qubit and queues them otherwise.

use std::collections::{BTreeMap, HashMap, VecDeque};

use rand::Rng;
use rand_distr::{Distribution, Geometric};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};
use uuid::Builder;

use qnet_core::{
    Addr, ChannelId, EventKind, Message, NodeContext, NodeId, PathId, ReservationKey, SimTime,
    TimingPhase, WernerEpr,
};
use qnet_memory::{QuantumMemory, QubitState};

use crate::config::LinkConfig;
use crate::error::{LinkError, LinkResult};

/// A reservation this node initiated and the neighbor has not yet confirmed
#[derive(Debug, Clone)]
struct PendingReservation {
    channel: ChannelId,
    neighbor: NodeId,
    addr: Addr,
}

/// A reservation request from a neighbor waiting for a free qubit
#[derive(Debug, Clone)]
struct ReservationRequest {
    key: ReservationKey,
    path_id: Option<PathId>,
    from: NodeId,
    channel: ChannelId,
}

/// Link layer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Elementary pairs generated with this node as primary
    pub etg_count: u64,
    /// Qubits that decohered before being swapped or consumed
    pub decoh_count: u64,
}

/// Per-node elementary entanglement generator
#[derive(Debug)]
pub struct LinkLayer {
    config: LinkConfig,
    /// (channel, path) -> (neighbor, activation count)
    active_channels: BTreeMap<(ChannelId, Option<PathId>), (NodeId, usize)>,
    pending: HashMap<ReservationKey, PendingReservation>,
    fifo: VecDeque<ReservationRequest>,
    stats: LinkStats,
}

fn random_key<R: Rng + ?Sized>(rng: &mut R) -> ReservationKey {
    Builder::from_random_bytes(rng.random()).into_uuid()
}

impl LinkLayer {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            active_channels: BTreeMap::new(),
            pending: HashMap::new(),
            fifo: VecDeque::new(),
            stats: LinkStats::default(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn is_active(&self, channel: &ChannelId, path_id: Option<PathId>) -> bool {
        self.active_channels.contains_key(&(channel.clone(), path_id))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn queued_requests(&self) -> usize {
        self.fifo.len()
    }

    /// Timing phase boundary
    ///
    /// Entering EXTERNAL wipes memory and restarts every active channel.
    pub fn handle_phase(
        &mut self,
        phase: TimingPhase,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> LinkResult<()> {
        if phase != TimingPhase::External {
            return Ok(());
        }
        memory.clear();
        self.pending.clear();
        self.fifo.clear();
        let channels: Vec<(ChannelId, Option<PathId>, NodeId)> = self
            .active_channels
            .iter()
            .map(|((channel, path_id), (neighbor, _))| (channel.clone(), *path_id, neighbor.clone()))
            .collect();
        for (channel, path_id, neighbor) in channels {
            self.run_active_channel(&channel, path_id, &neighbor, memory, ctx)?;
        }
        Ok(())
    }

    /// Start or stop generation on a channel on behalf of the forwarder
    pub fn handle_manage_active_channels(
        &mut self,
        start: bool,
        channel: &ChannelId,
        path_id: Option<PathId>,
        neighbor: &NodeId,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> LinkResult<()> {
        if start {
            self.add_active_channel(channel, path_id, neighbor, memory, ctx)
        } else {
            self.remove_active_channel(channel, path_id)
        }
    }

    /// Activation is reference counted; only deferred (`None`) paths may
    /// share a channel activation.
    pub fn add_active_channel(
        &mut self,
        channel: &ChannelId,
        path_id: Option<PathId>,
        neighbor: &NodeId,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> LinkResult<()> {
        let entry = self
            .active_channels
            .entry((channel.clone(), path_id))
            .or_insert_with(|| (neighbor.clone(), 0));
        if entry.1 > 0 {
            if let Some(path_id) = path_id {
                return Err(LinkError::DuplicateActivation { channel: channel.clone(), path_id });
            }
            entry.1 += 1;
            return Ok(());
        }
        entry.1 = 1;

        let qchannel = ctx.channels.quantum(channel)?;
        debug!(node = %ctx.own, %channel, %neighbor, ?path_id, link_arch = %qchannel.link_arch, "add active channel");
        if ctx.timing.is_async() {
            self.run_active_channel(channel, path_id, neighbor, memory, ctx)?;
        }
        Ok(())
    }

    pub fn remove_active_channel(&mut self, channel: &ChannelId, path_id: Option<PathId>) -> LinkResult<()> {
        let key = (channel.clone(), path_id);
        let Some((neighbor, count)) = self.active_channels.get_mut(&key) else {
            return Err(LinkError::InactiveChannel { channel: channel.clone(), path_id });
        };
        *count -= 1;
        if *count == 0 {
            debug!(%channel, %neighbor, ?path_id, "remove active channel");
            self.active_channels.remove(&key);
        }
        Ok(())
    }

    /// Reserve every idle qubit of `channel` allocated to `path_id`
    fn run_active_channel(
        &mut self,
        channel: &ChannelId,
        path_id: Option<PathId>,
        neighbor: &NodeId,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> LinkResult<()> {
        let idle: Vec<Addr> = memory
            .get_channel_qubits(channel)
            .into_iter()
            .filter(|(q, v)| q.path_id == path_id && q.state() == QubitState::Raw && v.is_none())
            .map(|(q, _)| q.addr)
            .collect();
        trace!(node = %ctx.own, %channel, ?idle, "run active channel");
        for addr in idle {
            self.start_reservation(channel, neighbor, addr, memory, ctx)?;
        }
        Ok(())
    }

    fn start_reservation(
        &mut self,
        channel: &ChannelId,
        neighbor: &NodeId,
        addr: Addr,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> LinkResult<()> {
        let key = random_key(ctx.rng);
        if self.pending.contains_key(&key) {
            return Err(LinkError::DuplicateReservation(key));
        }
        let qubit = memory.qubit_mut(addr)?;
        qubit.set_state(QubitState::Active)?;
        qubit.active = Some(key);
        let path_id = qubit.path_id;

        self.pending.insert(
            key,
            PendingReservation { channel: channel.clone(), neighbor: neighbor.clone(), addr },
        );
        debug!(node = %ctx.own, %key, dst = %neighbor, addr, ?path_id, "start reservation");
        ctx.send(neighbor, Message::ReserveQubit { path_id, key })?;
        Ok(())
    }

    /// Handle a reservation message; other messages are ignored
    pub fn handle_message(
        &mut self,
        from: &NodeId,
        msg: &Message,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> LinkResult<()> {
        match msg {
            Message::ReserveQubit { path_id, key } => self.handle_reserve_req(from, *path_id, *key, memory, ctx),
            Message::ReserveQubitOk { key, .. } => self.handle_reserve_res(*key, memory, ctx),
            _ => Ok(()),
        }
    }

    #[instrument(level = "debug", skip_all, fields(node = %ctx.own, %from, %key))]
    fn handle_reserve_req(
        &mut self,
        from: &NodeId,
        path_id: Option<PathId>,
        key: ReservationKey,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> LinkResult<()> {
        let channel = ctx.channels.quantum_between(&ctx.own, from)?.name.clone();
        let req = ReservationRequest { key, path_id, from: from.clone(), channel };
        if !self.try_accept_reservation(&req, memory, ctx)? {
            debug!(queued = self.fifo.len() + 1, "no free qubit, request queued");
            self.fifo.push_back(req);
        }
        Ok(())
    }

    fn try_accept_reservation(
        &mut self,
        req: &ReservationRequest,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> LinkResult<bool> {
        let found = memory
            .find(|q, v| {
                v.is_none()
                    && q.active.is_none()
                    && q.state() == QubitState::Raw
                    && q.qchannel.as_ref() == Some(&req.channel)
                    && q.path_id == req.path_id
            })
            .map(|(q, _)| q.addr)
            .next();
        let Some(addr) = found else {
            return Ok(false);
        };

        let qubit = memory.qubit_mut(addr)?;
        qubit.set_state(QubitState::Active)?;
        qubit.set_state(QubitState::Reserved)?;
        qubit.active = Some(req.key);
        debug!(node = %ctx.own, key = %req.key, src = %req.from, addr, path_id = ?req.path_id, "accept reservation");
        ctx.send(&req.from, Message::ReserveQubitOk { path_id: req.path_id, key: req.key })?;
        Ok(true)
    }

    fn handle_reserve_res(
        &mut self,
        key: ReservationKey,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> LinkResult<()> {
        let Some(pending) = self.pending.remove(&key) else {
            debug!(node = %ctx.own, %key, "stale reservation confirmation ignored");
            return Ok(());
        };
        let qubit = memory.qubit_mut(pending.addr)?;
        if qubit.active != Some(key) {
            debug!(node = %ctx.own, %key, addr = pending.addr, "reserved qubit was reused, confirmation ignored");
            return Ok(());
        }
        qubit.set_state(QubitState::Reserved)?;
        self.generate_entanglement(&pending.channel, &pending.neighbor, key, ctx)
    }

    /// Sample the successful attempt and schedule both notifications
    fn generate_entanglement(
        &self,
        channel: &ChannelId,
        neighbor: &NodeId,
        key: ReservationKey,
        ctx: &mut NodeContext<'_>,
    ) -> LinkResult<()> {
        let channels = ctx.channels;
        let qchannel = channels.quantum(channel)?;
        let p = qchannel.link_arch.success_prob(
            qchannel.length_km,
            self.config.alpha_db_per_km,
            self.config.eta_s,
            self.config.eta_d,
        );
        if !(p > 0.0 && p <= 1.0) {
            return Err(LinkError::InvalidSuccessProbability(p));
        }
        let geometric = Geometric::new(p).map_err(|_| LinkError::InvalidSuccessProbability(p))?;
        // Geometric counts failures before the first success
        let attempts = geometric.sample(ctx.rng) + 1;

        let delays = qchannel.link_arch.delays(
            attempts,
            self.config.reset_time(),
            qchannel.tau_l(),
            self.config.tau_0_time(),
        );
        let t_creation = ctx.now + delays.creation;
        let t_notify_a = t_creation + delays.notify_a;
        let t_notify_b = t_creation + delays.notify_b;

        let name = random_key(ctx.rng).simple().to_string();
        let mut epr =
            WernerEpr::elementary(name, self.config.init_fidelity, ctx.own.clone(), neighbor.clone(), t_creation);
        epr.attempts = attempts;
        epr.key = Some(key);

        if !ctx.timing.fits_external(ctx.now, t_notify_a.max(t_notify_b)) {
            debug!(
                node = %ctx.own, name = %epr.name, %key, dst = %neighbor, attempts,
                creation = %t_creation, notify_a = %t_notify_a, notify_b = %t_notify_b,
                "skip pair beyond external phase"
            );
            return Ok(());
        }
        debug!(
            node = %ctx.own, name = %epr.name, %key, dst = %neighbor, attempts,
            creation = %t_creation, notify_a = %t_notify_a, notify_b = %t_notify_b,
            "prepare pair"
        );
        let own = ctx.own.clone();
        ctx.schedule(t_notify_a, own, EventKind::LinkArchSuccess { epr: epr.clone() });
        ctx.schedule(t_notify_b, neighbor.clone(), EventKind::LinkArchSuccess { epr });
        Ok(())
    }

    /// Store the arriving half of an elementary pair
    pub fn handle_success(
        &mut self,
        epr: WernerEpr,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> LinkResult<()> {
        let is_primary = epr.is_primary(&ctx.own);
        let neighbor = epr.partner_of(&ctx.own)?.clone();
        if is_primary {
            self.stats.etg_count += 1;
        }
        debug!(node = %ctx.own, name = %epr.name, key = ?epr.key, %neighbor, is_primary, "got half pair");

        let name = epr.name.clone();
        let key = epr.key;
        let qubit = memory.write(epr, None, key).ok_or(LinkError::StoreFailed { name })?;
        qubit.set_state(QubitState::Entangled0)?;
        let addr = qubit.addr;
        ctx.schedule_local(SimTime::ZERO, EventKind::QubitEntangled { neighbor, addr });
        Ok(())
    }

    /// Return a decohered or released qubit to RAW and reuse it
    ///
    /// On the initiator side the qubit is reserved again straight away in
    /// asynchronous mode. On the responder side the oldest queued request
    /// gets a chance to take it.
    pub fn handle_decoh_rel(
        &mut self,
        addr: Addr,
        decohered: bool,
        memory: &mut QuantumMemory,
        ctx: &mut NodeContext<'_>,
    ) -> LinkResult<()> {
        if decohered {
            self.stats.decoh_count += 1;
        }
        let qubit = memory.qubit_mut(addr)?;
        debug!(node = %ctx.own, addr, decohered, old_key = ?qubit.active, "qubit returned");
        if qubit.state() == QubitState::Raw {
            return Ok(());
        }
        qubit.set_state(QubitState::Release)?;
        qubit.set_state(QubitState::Raw)?;
        qubit.active = None;
        let channel = qubit.qchannel.clone().ok_or(LinkError::UnassignedQubit(addr))?;
        let path_id = qubit.path_id;

        match self.active_channels.get(&(channel.clone(), path_id)) {
            None => {
                if let Some(req) = self.fifo.front().cloned() {
                    if self.try_accept_reservation(&req, memory, ctx)? {
                        self.fifo.pop_front();
                    }
                }
                Ok(())
            }
            Some((neighbor, _)) => {
                if ctx.timing.is_async() {
                    let neighbor = neighbor.clone();
                    self.start_reservation(&channel, &neighbor, addr, memory, ctx)
                } else if decohered {
                    Err(LinkError::SyncDecoherence(addr))
                } else {
                    Ok(())
                }
            }
        }
    }
}
