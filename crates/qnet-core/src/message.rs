//! Classical control messages exchanged between neighboring nodes

use serde::{Deserialize, Serialize};

use crate::epr::WernerEpr;
use crate::identity::{NodeId, PathId, ReservationKey};

/// Result of a swap, sent by the swapping node to both partners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapUpdate {
    pub path_id: PathId,
    pub swapping_node: NodeId,
    /// Name of the pair the receiver held with the swapping node
    pub old: String,
    /// The merged pair, or `None` if the swap failed
    pub new: Option<WernerEpr>,
}

/// Payload of a classical packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    ReserveQubit {
        path_id: Option<PathId>,
        key: ReservationKey,
    },
    ReserveQubitOk {
        path_id: Option<PathId>,
        key: ReservationKey,
    },
    SwapUpdate(SwapUpdate),
    PurifSolicit {
        path_id: Option<PathId>,
        kept: String,
        measured: String,
    },
    PurifResponse {
        path_id: Option<PathId>,
        kept: String,
        measured: String,
        /// Updated kept pair when the round succeeded
        outcome: Option<WernerEpr>,
    },
}

impl Message {
    /// Command name, as it appears in logs
    pub fn cmd(&self) -> &'static str {
        match self {
            Message::ReserveQubit { .. } => "RESERVE_QUBIT",
            Message::ReserveQubitOk { .. } => "RESERVE_QUBIT_OK",
            Message::SwapUpdate(_) => "SWAP_UPDATE",
            Message::PurifSolicit { .. } => "PURIF_SOLICIT",
            Message::PurifResponse { .. } => "PURIF_RESPONSE",
        }
    }

    /// Whether the link layer (rather than the forwarder) handles this message
    pub fn is_link_layer(&self) -> bool {
        matches!(self, Message::ReserveQubit { .. } | Message::ReserveQubitOk { .. })
    }
}
