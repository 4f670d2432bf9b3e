//! Memory error types

use thiserror::Error;

use qnet_core::{Addr, ChannelId};

use crate::qubit::QubitState;

/// Errors raised by quantum memory operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MemoryError {
    #[error("Address {addr} out of bounds (capacity {capacity})")]
    OutOfBounds { addr: Addr, capacity: usize },

    #[error("Qubit not found: {0}")]
    NotFound(String),

    #[error("Slot {0} is empty")]
    EmptySlot(Addr),

    #[error("Slot {0} is occupied")]
    OccupiedSlot(Addr),

    #[error("Not enough free qubits on {channel}: requested {requested}, available {available}")]
    InsufficientQubits {
        channel: ChannelId,
        requested: usize,
        available: usize,
    },

    #[error("Illegal state transition at slot {addr}: {from} -> {to}")]
    IllegalTransition {
        addr: Addr,
        from: QubitState,
        to: QubitState,
    },
}

/// Result type for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;
