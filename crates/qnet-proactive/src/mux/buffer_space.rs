//! Buffer-space multiplexing
//!
//! Every path owns a fixed share of the memory qubits on each of its
//! channels. The share comes from the path's `m_v` vector, or is every
//! qubit of the channel not yet taken by another path.

use std::collections::BTreeSet;

use qnet_core::{Addr, ChannelId, NodeId, PathDirection, PathInstructions, WernerEpr};
use qnet_memory::{MemoryError, QuantumMemory, QubitState};
use qnet_routing::FibEntry;
use tracing::debug;

use super::{Admission, MuxContext, MuxScheme, SwapCandidate, rank_admission};
use crate::error::{ForwarderError, ForwarderResult};
use crate::select::QubitSelector;

#[derive(Debug, Clone, Default)]
pub struct BufferSpaceMux;

impl BufferSpaceMux {
    pub fn new() -> Self {
        Self
    }
}

impl MuxScheme for BufferSpaceMux {
    fn name(&self) -> &'static str {
        "buffer-space"
    }

    fn install_path_neighbor(
        &mut self,
        instructions: &PathInstructions,
        entry: &FibEntry,
        direction: PathDirection,
        neighbor: &NodeId,
        channel: &ChannelId,
        memory: &mut QuantumMemory,
    ) -> ForwarderResult<()> {
        let requested = match &instructions.m_v {
            Some(m_v) => {
                // the left channel ends here, the right channel starts here
                let (idx, pick_right_end) = match direction {
                    PathDirection::Left => (entry.own_index.checked_sub(1), true),
                    PathDirection::Right => (Some(entry.own_index), false),
                };
                let counts = idx.and_then(|i| m_v.get(i)).ok_or_else(|| ForwarderError::MissingAllocation {
                    path_id: entry.path_id,
                    channel: channel.to_string(),
                })?;
                if pick_right_end { counts.1 } else { counts.0 }
            }
            None => memory.find(|q, _| q.qchannel.as_ref() == Some(channel) && q.path_id.is_none()).count(),
        };
        let addrs = memory.allocate(entry.path_id, direction, channel, requested)?;
        debug!(path_id = entry.path_id, %direction, %neighbor, %channel, ?addrs, "buffer space allocated");
        Ok(())
    }

    fn uninstall_path_neighbor(
        &mut self,
        entry: &FibEntry,
        direction: PathDirection,
        neighbor: &NodeId,
        channel: &ChannelId,
        memory: &mut QuantumMemory,
    ) -> ForwarderResult<()> {
        let addrs: Vec<Addr> = memory
            .find(|q, _| q.path_id == Some(entry.path_id) && q.path_direction == Some(direction))
            .map(|(q, _)| q.addr)
            .collect();
        for &addr in &addrs {
            memory.deallocate(addr)?;
        }
        debug!(path_id = entry.path_id, %direction, %neighbor, %channel, ?addrs, "buffer space freed");
        Ok(())
    }

    fn qubit_has_path_id(&self) -> bool {
        true
    }

    fn qubit_is_entangled(
        &mut self,
        addr: Addr,
        neighbor: &NodeId,
        ctx: &mut MuxContext<'_>,
    ) -> ForwarderResult<Admission> {
        let Some(path_id) = ctx.memory.qubit(addr)?.path_id else {
            debug!(addr, "slot no longer allocated, releasing");
            return Ok(Admission::Release);
        };
        if !ctx.fib.contains(path_id) {
            debug!(addr, path_id, "path uninstalled, releasing");
            return Ok(Admission::Release);
        }
        let candidates = BTreeSet::from([path_id]);
        let (_, epr) = ctx.memory.get_mut(addr).ok_or(MemoryError::EmptySlot(addr))?;
        epr.tmp_path_ids = Some(candidates.clone());
        rank_admission(ctx.own, epr, neighbor, ctx.fib, &candidates)
    }

    fn find_swap_candidate(
        &mut self,
        addr: Addr,
        _epr: &WernerEpr,
        selector: &QubitSelector,
        ctx: &mut MuxContext<'_>,
    ) -> ForwarderResult<Option<SwapCandidate>> {
        let qubit = ctx.memory.qubit(addr)?;
        let path_id = qubit.path_id.ok_or(ForwarderError::UnallocatedQubit(addr))?;
        let direction = qubit.path_direction.ok_or(ForwarderError::UnallocatedQubit(addr))?;
        let wanted = direction.opposite();

        let found = selector.select(
            ctx.memory.find_occupied(move |q, _| {
                q.state() == QubitState::Eligible
                    && q.path_id == Some(path_id)
                    && q.path_direction == Some(wanted)
            }),
            ctx.rng,
        );
        Ok(found.map(|addr| SwapCandidate { addr, path_id }))
    }
}
