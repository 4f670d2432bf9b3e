//! A simulated quantum node
//!
//! Each [`QNode`] owns its memory, link layer and forwarder. Events are
//! routed to the component that owns them; memory decoherence timers armed
//! while handling an event are turned into events for this node.

use tracing::{debug, trace, warn};

use qnet_core::{EventKind, NodeContext, NodeId};
use qnet_link::{LinkConfig, LinkLayer};
use qnet_memory::QuantumMemory;
use qnet_proactive::ProactiveForwarder;

use crate::error::SimResult;

#[derive(Debug)]
pub struct QNode {
    id: NodeId,
    memory: QuantumMemory,
    link: LinkLayer,
    forwarder: ProactiveForwarder,
}

impl QNode {
    pub fn new(id: NodeId, memory: QuantumMemory, link: LinkConfig, forwarder: ProactiveForwarder) -> Self {
        Self { id, memory, link: LinkLayer::new(link), forwarder }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn memory(&self) -> &QuantumMemory {
        &self.memory
    }

    pub fn link(&self) -> &LinkLayer {
        &self.link
    }

    pub fn forwarder(&self) -> &ProactiveForwarder {
        &self.forwarder
    }

    /// Handle one event addressed to this node
    pub fn handle(&mut self, kind: EventKind, ctx: &mut NodeContext<'_>) -> SimResult<()> {
        trace!(node = %self.id, at = %ctx.now, event = kind.name(), "dispatch");
        let memory = &mut self.memory;
        match kind {
            EventKind::Phase(phase) => {
                self.link.handle_phase(phase, memory, ctx)?;
                self.forwarder.handle_phase(phase, memory, ctx)?;
            }
            EventKind::InstallPath { path_id, instructions } => {
                self.forwarder.handle_install_path(path_id, &instructions, memory, ctx)?;
            }
            EventKind::UninstallPath { path_id } => {
                self.forwarder.handle_uninstall_path(path_id, memory, ctx)?;
            }
            EventKind::RecvClassic { from, msg } => {
                if msg.is_link_layer() {
                    self.link.handle_message(&from, &msg, memory, ctx)?;
                } else {
                    self.forwarder.handle_message(&from, &msg, memory, ctx)?;
                }
            }
            EventKind::ManageActiveChannels { start, channel, path_id, neighbor } => {
                self.link.handle_manage_active_channels(start, &channel, path_id, &neighbor, memory, ctx)?;
            }
            EventKind::LinkArchSuccess { epr } => {
                self.link.handle_success(epr, memory, ctx)?;
            }
            EventKind::QubitEntangled { neighbor, addr } => {
                self.forwarder.handle_qubit_entangled(&neighbor, addr, memory, ctx)?;
            }
            EventKind::MemoryDecoherence { addr, name } => {
                if memory.decohere(addr, &name)? {
                    debug!(node = %self.id, addr, %name, "memory decoherence");
                    ctx.schedule_local(qnet_core::SimTime::ZERO, EventKind::QubitDecohered { addr, name });
                }
            }
            EventKind::QubitDecohered { addr, name } => {
                self.forwarder.handle_qubit_decohered(addr, &name, ctx);
                self.link.handle_decoh_rel(addr, true, memory, ctx)?;
            }
            EventKind::QubitReleased { addr } => {
                self.link.handle_decoh_rel(addr, false, memory, ctx)?;
            }
        }

        for timer in memory.drain_timers() {
            if timer.at < ctx.now {
                warn!(node = %self.id, addr = timer.addr, name = %timer.name, at = %timer.at, "pair expired before it was stored");
            }
            ctx.schedule(timer.at, self.id.clone(), EventKind::MemoryDecoherence { addr: timer.addr, name: timer.name });
        }
        Ok(())
    }
}
