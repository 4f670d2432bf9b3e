//! # QNet Simulation
//!
//! Discrete-event simulation of proactive entanglement distribution.
//!
//! ## Overview
//!
//! A network is a set of [`QNode`]s joined by quantum channels between
//! neighbors and classical channels between every pair of nodes. Each node
//! owns a quantum memory, a link layer that turns channel access into
//! elementary pairs, and a proactive forwarder that swaps and purifies those
//! pairs along the paths installed by the [`RoutingController`].
//!
//! ## Architecture
//!
//! - **Queue** (`queue.rs`): time-ordered event queue with a simulated clock
//! - **Node** (`node.rs`): routes each event to the memory, link layer or forwarder
//! - **Topology** (`topology.rs`): linear chains and explicit channel lists
//! - **Controller** (`controller.rs`): routes requests into path instructions
//! - **Network** (`network.rs`): owns the nodes and runs the event loop
//! - **Scenarios** (`scenarios.rs`): pre-built experiments
//!
//! ## Example: 4-node chain
//!
//! ```rust,ignore
//! use qnet_simulation::*;
//!
//! let scenario = scenarios::linear_chain(4, MuxKind::Statistical { coordinated_decisions: false }, 7);
//! let report = scenario.run()?;
//! println!("{} pairs/s", report.paths[0].throughput);
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod network;
pub mod node;
pub mod queue;
pub mod scenarios;
pub mod topology;

pub use config::ScenarioConfig;
pub use controller::{RequestConfig, RoutingController};
pub use error::{SimError, SimResult};
pub use network::{NetworkConfig, NetworkReport, NodeReport, PathReport, QuantumNetwork};
pub use node::QNode;
pub use queue::Simulator;
pub use topology::{ChannelConfig, NodeConfig, Topology, TopologyConfig};

pub use qnet_core::{LinkArch, SimTime, TimingMode};
pub use qnet_link::LinkConfig;
pub use qnet_proactive::{ForwarderConfig, MuxKind};
pub use qnet_routing::SwapPolicy;
