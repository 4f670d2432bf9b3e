//! Multiplexing schemes
//!
//! A [`MuxScheme`] arbitrates how channel capacity is shared between paths.
//! It binds memory or records channel usage when a path is installed,
//! decides which paths a freshly entangled pair may serve, gates its entry
//! into purification according to the swap ranks of those paths, and picks
//! swap partners.

mod buffer_space;
mod dynamic_epr;
mod statistical;

pub use buffer_space::BufferSpaceMux;
pub use dynamic_epr::DynamicEprMux;
pub use statistical::{SharedDecisions, StatisticalMux};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rand::rngs::StdRng;

use qnet_core::{Addr, ChannelId, NodeId, PathDirection, PathId, PathInstructions, WernerEpr};
use qnet_memory::QuantumMemory;
use qnet_routing::{Fib, FibEntry};
use tracing::debug;

use crate::error::{ForwarderError, ForwarderResult};
use crate::select::QubitSelector;

/// What to do with a newly entangled or updated pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No installed path uses the channel any more
    Release,
    /// The partner is ahead in swap order; wait for a swap update
    Hold,
    /// Enter purification; `initiator` tells whether this node drives the
    /// purification rounds of the segment
    Purif { initiator: bool },
}

/// A swap partner found by the scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapCandidate {
    pub addr: Addr,
    /// Path the swap is performed for
    pub path_id: PathId,
}

/// Everything a scheme may consult when classifying a qubit
pub struct MuxContext<'a> {
    pub own: &'a NodeId,
    pub fib: &'a Fib,
    pub memory: &'a mut QuantumMemory,
    pub rng: &'a mut StdRng,
}

/// Per-node multiplexing policy
pub trait MuxScheme: fmt::Debug {
    fn name(&self) -> &'static str;

    /// Reject instructions this scheme cannot serve
    fn validate_path_instructions(&self, instructions: &PathInstructions) -> ForwarderResult<()> {
        qnet_routing::validate_path_instructions(instructions)?;
        Ok(())
    }

    /// Register a path's use of the channel towards `neighbor`
    fn install_path_neighbor(
        &mut self,
        instructions: &PathInstructions,
        entry: &FibEntry,
        direction: PathDirection,
        neighbor: &NodeId,
        channel: &ChannelId,
        memory: &mut QuantumMemory,
    ) -> ForwarderResult<()>;

    fn uninstall_path_neighbor(
        &mut self,
        entry: &FibEntry,
        direction: PathDirection,
        neighbor: &NodeId,
        channel: &ChannelId,
        memory: &mut QuantumMemory,
    ) -> ForwarderResult<()>;

    /// Whether link-layer reservations are made per path
    fn qubit_has_path_id(&self) -> bool;

    /// Paths a pair may still serve
    fn path_candidates(&self, epr: &WernerEpr) -> Option<BTreeSet<PathId>> {
        epr.tmp_path_ids.clone()
    }

    /// Assign candidate paths to the pair at `addr` and decide its admission
    fn qubit_is_entangled(
        &mut self,
        addr: Addr,
        neighbor: &NodeId,
        ctx: &mut MuxContext<'_>,
    ) -> ForwarderResult<Admission>;

    /// Admission of a pair whose partner is `partner`
    fn can_enter_purif(
        &self,
        own: &NodeId,
        epr: &WernerEpr,
        partner: &NodeId,
        fib: &Fib,
    ) -> ForwarderResult<Admission> {
        let candidates =
            self.path_candidates(epr).ok_or_else(|| ForwarderError::NoPathCandidates(epr.name.clone()))?;
        rank_admission(own, epr, partner, fib, &candidates)
    }

    /// Find an ELIGIBLE qubit to swap with the one at `addr`
    fn find_swap_candidate(
        &mut self,
        addr: Addr,
        epr: &WernerEpr,
        selector: &QubitSelector,
        ctx: &mut MuxContext<'_>,
    ) -> ForwarderResult<Option<SwapCandidate>>;

    /// Set the candidate paths of a swap result
    fn swapping_succeeded(
        &self,
        prev: &WernerEpr,
        next: &WernerEpr,
        new: &mut WernerEpr,
    ) -> ForwarderResult<()> {
        new.tmp_path_ids = Some(intersect_candidates(self, prev, next)?);
        Ok(())
    }

    /// Whether an update for path `su_path_id` conflicts with the swap this
    /// node already made
    fn su_parallel_has_conflict(&self, my_new: &WernerEpr, su_path_id: PathId) -> bool {
        let conflict = self.path_candidates(my_new).is_some_and(|c| !c.contains(&su_path_id));
        if conflict {
            debug!(pair = %my_new.name, su_path_id, "conflicting parallel swap");
        }
        conflict
    }

    /// The pair named `name` is gone from this node, or an update about it
    /// has arrived here
    fn pair_retired(&mut self, _name: &str) {}

    /// Forget state scoped to one timing cycle
    fn reset_cycle(&mut self) {}

    /// Set the candidate paths of a pair merged from a parallel swap
    fn su_parallel_succeeded(
        &self,
        merged: &mut WernerEpr,
        new: &WernerEpr,
        other: &WernerEpr,
    ) -> ForwarderResult<()> {
        merged.tmp_path_ids = Some(intersect_candidates(self, new, other)?);
        Ok(())
    }
}

/// Candidate paths shared by two pairs; empty is a protocol error
pub fn intersect_candidates<M: MuxScheme + ?Sized>(
    mux: &M,
    a: &WernerEpr,
    b: &WernerEpr,
) -> ForwarderResult<BTreeSet<PathId>> {
    let empty = || ForwarderError::EmptyPathIntersection { left: a.name.clone(), right: b.name.clone() };
    let (Some(ca), Some(cb)) = (mux.path_candidates(a), mux.path_candidates(b)) else {
        return Err(empty());
    };
    let common: BTreeSet<PathId> = ca.intersection(&cb).copied().collect();
    if common.is_empty() {
        return Err(empty());
    }
    Ok(common)
}

/// Whether two optional candidate sets overlap
pub fn has_common_path(a: Option<&BTreeSet<PathId>>, b: Option<&BTreeSet<PathId>>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if !a.is_disjoint(b))
}

/// Apply the swap-rank rule over every candidate path
///
/// The rank difference between this node and `partner` must be the same on
/// every candidate path. A positive difference means the partner swaps
/// first, so the pair is held.
pub fn rank_admission(
    own: &NodeId,
    epr: &WernerEpr,
    partner: &NodeId,
    fib: &Fib,
    candidates: &BTreeSet<PathId>,
) -> ForwarderResult<Admission> {
    let mut diffs = Vec::with_capacity(candidates.len());
    for &path_id in candidates {
        let entry = fib.get(path_id)?;
        let (_, partner_rank) = entry.find_index_and_swap_rank(partner)?;
        diffs.push(i64::from(entry.own_swap_rank) - i64::from(partner_rank));
    }
    let Some(&diff) = diffs.first() else {
        return Err(ForwarderError::NoPathCandidates(epr.name.clone()));
    };
    if diffs.iter().any(|d| *d != diff) {
        return Err(ForwarderError::RankMismatch(candidates.iter().copied().collect()));
    }
    if diff > 0 {
        return Ok(Admission::Hold);
    }
    Ok(Admission::Purif { initiator: diff < 0 || epr.is_primary(own) })
}

/// Channel to installed paths, for schemes that defer path binding
#[derive(Debug, Clone, Default)]
pub struct ChannelPathMap {
    paths: BTreeMap<ChannelId, BTreeSet<PathId>>,
}

impl ChannelPathMap {
    pub fn add(&mut self, channel: &ChannelId, path_id: PathId) {
        self.paths.entry(channel.clone()).or_default().insert(path_id);
    }

    pub fn remove(&mut self, channel: &ChannelId, path_id: PathId) {
        if let Some(paths) = self.paths.get_mut(channel) {
            paths.remove(&path_id);
            if paths.is_empty() {
                self.paths.remove(channel);
            }
        }
    }

    /// Paths using `channel`, empty when none
    pub fn paths(&self, channel: &ChannelId) -> BTreeSet<PathId> {
        self.paths.get(channel).cloned().unwrap_or_default()
    }

    /// Channels other than `exclude` used by at least one path in `candidates`
    pub fn matching_channels(&self, exclude: &ChannelId, candidates: &BTreeSet<PathId>) -> BTreeSet<ChannelId> {
        self.paths
            .iter()
            .filter(|(channel, paths)| *channel != exclude && !paths.is_disjoint(candidates))
            .map(|(channel, _)| channel.clone())
            .collect()
    }
}

/// Candidate paths of a newly entangled dynamic-scheme qubit
///
/// Empty when every path using the qubit's channel has been uninstalled.
fn channel_candidates(map: &ChannelPathMap, memory: &QuantumMemory, addr: Addr) -> ForwarderResult<BTreeSet<PathId>> {
    let qubit = memory.qubit(addr)?;
    let channel = qubit.qchannel.as_ref().ok_or(ForwarderError::UnassignedQubit(addr))?;
    let paths = map.paths(channel);
    if paths.is_empty() {
        debug!(addr, %channel, "no installed path uses the channel");
    }
    Ok(paths)
}
