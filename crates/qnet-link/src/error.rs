//! Link layer error types

use thiserror::Error;

use qnet_core::{Addr, ChannelId, CoreError, PathId, ReservationKey};
use qnet_memory::MemoryError;

/// Protocol violations detected by the link layer
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    #[error("Reservation {0} already pending")]
    DuplicateReservation(ReservationKey),

    #[error("Channel {channel} is not active for path {path_id:?}")]
    InactiveChannel { channel: ChannelId, path_id: Option<PathId> },

    #[error("Channel {channel} activated twice for path {path_id}")]
    DuplicateActivation { channel: ChannelId, path_id: PathId },

    #[error("Qubit {0} is not assigned to a quantum channel")]
    UnassignedQubit(Addr),

    #[error("No reserved qubit to store pair {name}")]
    StoreFailed { name: String },

    #[error("Invalid attempt success probability {0}")]
    InvalidSuccessProbability(f64),

    #[error("Initiator qubit {0} decohered in synchronous mode; the timing cycle is too short")]
    SyncDecoherence(Addr),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for link layer operations
pub type LinkResult<T> = Result<T, LinkError>;
