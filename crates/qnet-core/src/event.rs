//! Events delivered to nodes by the simulator

use crate::epr::WernerEpr;
use crate::identity::{Addr, ChannelId, NodeId, PathId};
use crate::message::Message;
use crate::path::PathInstructions;
use crate::time::{SimTime, TimingPhase};

/// An event addressed to one node
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub target: NodeId,
    pub kind: EventKind,
}

impl Event {
    pub fn new(target: NodeId, kind: EventKind) -> Self {
        Self { target, kind }
    }
}

/// What a node is asked to handle
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A timing phase boundary (synchronized mode only)
    Phase(TimingPhase),
    /// The controller installs a path on this node
    InstallPath {
        path_id: PathId,
        instructions: PathInstructions,
    },
    /// The controller removes a path from this node
    UninstallPath { path_id: PathId },
    /// A classical packet arrived
    RecvClassic { from: NodeId, msg: Message },
    /// The forwarder starts or stops elementary generation on a channel
    ManageActiveChannels {
        start: bool,
        channel: ChannelId,
        path_id: Option<PathId>,
        neighbor: NodeId,
    },
    /// A heralded attempt succeeded and this node learns of its half
    LinkArchSuccess { epr: WernerEpr },
    /// A half-pair was stored in the given slot
    QubitEntangled { neighbor: NodeId, addr: Addr },
    /// Decoherence timer of a stored pair expired
    MemoryDecoherence { addr: Addr, name: String },
    /// A slot was freed because its occupant decohered
    QubitDecohered { addr: Addr, name: String },
    /// A slot was freed by the forwarder
    QubitReleased { addr: Addr },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Phase(_) => "phase",
            EventKind::InstallPath { .. } => "install_path",
            EventKind::UninstallPath { .. } => "uninstall_path",
            EventKind::RecvClassic { .. } => "recv_classic",
            EventKind::ManageActiveChannels { .. } => "manage_active_channels",
            EventKind::LinkArchSuccess { .. } => "link_arch_success",
            EventKind::QubitEntangled { .. } => "qubit_entangled",
            EventKind::MemoryDecoherence { .. } => "memory_decoherence",
            EventKind::QubitDecohered { .. } => "qubit_decohered",
            EventKind::QubitReleased { .. } => "qubit_released",
        }
    }
}

/// An event together with its delivery time
#[derive(Debug, Clone, PartialEq)]
pub struct Scheduled {
    pub at: SimTime,
    pub event: Event,
}
