//! # QNet Link
//!
//! Elementary entanglement generation between neighboring nodes.
//!
//! The [`LinkLayer`] of each node reserves memory qubits with its neighbor
//! over classical messages, samples how many heralding attempts a channel
//! needs before it succeeds, and delivers one half of the resulting pair to
//! each endpoint. Channels are activated and deactivated by the forwarder.
//!
//! ## Reservation handshake
//!
//! ```text
//! initiator                         responder
//!   RAW -> ACTIVE   RESERVE_QUBIT ->
//!                                   RAW -> RESERVED (or queue request)
//!   ACTIVE -> RESERVED  <- RESERVE_QUBIT_OK
//!   sample attempts, schedule both notifications
//!   RESERVED -> ENTANGLED0          RESERVED -> ENTANGLED0
//! ```

pub mod config;
pub mod error;
pub mod layer;

pub use config::LinkConfig;
pub use error::{LinkError, LinkResult};
pub use layer::{LinkLayer, LinkStats};
