//! Routing error types

use thiserror::Error;

use qnet_core::{NodeId, PathId};

/// Errors raised by the FIB, path validation and route queries
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FibError {
    #[error("Path {0} not found in FIB")]
    UnknownPath(PathId),

    #[error("Path {0} already installed")]
    DuplicatePath(PathId),

    #[error("Node {node} is not on path {path_id}")]
    NotOnRoute { node: NodeId, path_id: PathId },

    #[error("Invalid path instructions: {0}")]
    InvalidInstructions(String),

    #[error("No route from {src} to {dst}")]
    NoRoute { src: NodeId, dst: NodeId },
}

/// Result type for routing operations
pub type FibResult<T> = Result<T, FibError>;
