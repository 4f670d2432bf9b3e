//! # QNet Proactive
//!
//! Proactive forwarding: every installed path continuously generates
//! elementary pairs on its channels, and intermediate nodes swap (and
//! optionally purify) them as soon as the path's swap schedule allows,
//! until end-to-end pairs reach the path's endpoints and are consumed.
//!
//! ## Multiplexing
//!
//! When several paths share a channel, a [`MuxScheme`] decides which path a
//! pair serves:
//!
//! - [`BufferSpaceMux`]: memory qubits are statically split between paths
//! - [`StatisticalMux`]: pairs keep a set of candidate paths, narrowed at
//!   each swap
//! - [`DynamicEprMux`]: each pair picks one path as soon as it exists
//!
//! ## Example
//!
//! ```ignore
//! let mux = MuxKind::Statistical { coordinated_decisions: false }.build(SharedDecisions::default());
//! let forwarder = ProactiveForwarder::new(ForwarderConfig::default(), mux);
//! ```

pub mod config;
pub mod error;
pub mod forwarder;
pub mod mux;
pub mod parallel;
pub mod select;
pub mod stats;

pub use config::{ForwarderConfig, MuxKind, PathSelection, Selection};
pub use error::{ForwarderError, ForwarderResult};
pub use forwarder::ProactiveForwarder;
pub use mux::{
    Admission, BufferSpaceMux, ChannelPathMap, DynamicEprMux, MuxScheme, SharedDecisions, StatisticalMux,
    SwapCandidate,
};
pub use parallel::{ParallelSwapTable, SwapSide};
pub use select::{PathSelector, QubitSelector};
pub use stats::ForwarderStats;
