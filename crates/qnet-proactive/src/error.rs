//! Forwarder error types

use std::collections::BTreeSet;

use thiserror::Error;

use qnet_core::{Addr, CoreError, PathId};
use qnet_memory::MemoryError;
use qnet_routing::FibError;

/// Protocol violations detected by the forwarder or its multiplexing scheme
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForwarderError {
    #[error("No common path between {left} and {right}")]
    EmptyPathIntersection { left: String, right: String },

    #[error("Swap rank difference differs across candidate paths {0:?}")]
    RankMismatch(Vec<PathId>),

    #[error("Pair {0} has no candidate paths")]
    NoPathCandidates(String),

    #[error("Pair {name} carries candidate paths {carried:?} but its channel serves {channel:?}")]
    CandidateMismatch { name: String, carried: BTreeSet<PathId>, channel: BTreeSet<PathId> },

    #[error("Qubit {0} is not allocated to a path")]
    UnallocatedQubit(Addr),

    #[error("Qubit {0} is not assigned to a quantum channel")]
    UnassignedQubit(Addr),

    #[error("Path {path_id} has no m_v entry for {channel}")]
    MissingAllocation { path_id: PathId, channel: String },

    #[error(transparent)]
    Fib(#[from] FibError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for forwarder operations
pub type ForwarderResult<T> = Result<T, ForwarderError>;
