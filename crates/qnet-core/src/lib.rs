//! # QNet Core
//!
//! Core types, events, and errors shared by every layer of the quantum
//! network simulator.
//!
//! Nodes never touch each other's state directly. Every interaction is an
//! [`Event`] addressed to a node and scheduled on the global clock, and every
//! handler receives a [`NodeContext`] through which it reads the current time
//! and emits new events.
//!
//! ## Key Types
//!
//! - [`SimTime`]: Simulated time in integer picoseconds
//! - [`TimingMode`]: Asynchronous or phase-synchronized operation
//! - [`WernerEpr`]: Werner-state entangled pair with swap/purify composition
//! - [`QuantumChannel`] / [`LinkArch`]: Physical links and their heralding architecture
//! - [`Message`]: Classical control messages exchanged between neighbors
//! - [`EventKind`]: Everything a node can be asked to handle

pub mod channel;
pub mod context;
pub mod epr;
pub mod error;
pub mod event;
pub mod identity;
pub mod message;
pub mod path;
pub mod time;

pub use channel::*;
pub use context::*;
pub use epr::*;
pub use error::*;
pub use event::*;
pub use identity::*;
pub use message::*;
pub use path::*;
pub use time::*;
