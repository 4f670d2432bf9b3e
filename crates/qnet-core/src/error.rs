//! Error types for the simulator core

use thiserror::Error;

use crate::identity::{ChannelId, NodeId};

/// Errors raised by channel lookups and timing configuration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("No quantum channel between {a} and {b}")]
    NoQuantumChannel { a: NodeId, b: NodeId },

    #[error("No classical channel between {a} and {b}")]
    NoClassicChannel { a: NodeId, b: NodeId },

    #[error("Duplicate channel: {0}")]
    DuplicateChannel(ChannelId),

    #[error("Unknown channel: {0}")]
    UnknownChannel(ChannelId),

    #[error("Invalid timing configuration: {0}")]
    InvalidTiming(String),

    #[error("Pair {name} has no endpoint at {node}")]
    NotAnEndpoint { name: String, node: NodeId },
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
