//! Simulation error types

use thiserror::Error;

use qnet_core::{CoreError, NodeId};
use qnet_link::LinkError;
use qnet_memory::MemoryError;
use qnet_proactive::ForwarderError;
use qnet_routing::FibError;

/// Errors that abort a simulation run
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("At node {node}: {source}")]
    Node {
        node: NodeId,
        #[source]
        source: Box<SimError>,
    },

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Forwarder(#[from] ForwarderError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Fib(#[from] FibError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse scenario: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for simulation operations
pub type SimResult<T> = Result<T, SimError>;
