//! Identifiers for nodes, channels, paths and memory slots

use std::borrow::Borrow;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of a quantum node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for NodeId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Name of a quantum channel
///
/// Channels built by the topology helpers are named `q-<a>-<b>` after
/// their endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Conventional name of the quantum channel between two nodes
    pub fn between(a: &NodeId, b: &NodeId) -> Self {
        Self(format!("q-{a}-{b}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identifier of an installed forwarding path
pub type PathId = u32;

/// Slot index inside a quantum memory
pub type Addr = usize;

/// Random key correlating the two halves of a link-layer reservation
pub type ReservationKey = Uuid;
