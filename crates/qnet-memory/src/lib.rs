//! # QNet Memory
//!
//! Per-node quantum memory: a fixed array of slots, each holding at most one
//! qubit or half of an entangled pair.
//!
//! ## Features
//!
//! - **Channel assignment**: slots are bound to the quantum channel they serve
//! - **Path allocation**: static multiplexing pins slots to one path and direction
//! - **State machine**: every slot walks the [`QubitState`] transition table
//! - **Decoherence**: each write arms a timer that frees the slot when it expires
//!
//! Timers are not scheduled by the memory itself. They accumulate in an
//! outbox drained with [`QuantumMemory::drain_timers`] by whoever owns the
//! clock.

pub mod error;
pub mod memory;
pub mod qubit;
pub mod storable;

pub use error::{MemoryError, MemoryResult};
pub use memory::{DecoherenceTimer, MemoryKey, QuantumMemory};
pub use qubit::{MemoryQubit, QubitState};
pub use storable::{Qubit, Storable};
