//! # QNet Routing
//!
//! Path-level routing state for proactive forwarding.
//!
//! ## Components
//!
//! - [`Fib`] / [`FibEntry`]: per-node forwarding information base, one entry
//!   per installed path, with the node's position and swap rank on it
//! - [`validate_path_instructions`]: structural checks on controller output
//! - [`SwapPolicy`]: generators for common swap-rank schedules
//! - [`Dijkstra`]: shortest-path route computation over quantum channels

pub mod dijkstra;
pub mod error;
pub mod fib;
pub mod policy;

pub use dijkstra::{Dijkstra, RouteEntry};
pub use error::{FibError, FibResult};
pub use fib::{Fib, FibEntry, validate_path_instructions};
pub use policy::SwapPolicy;
