//! Node context injection for simulation logging
//!
//! The simulator handles one node's event at a time. A [`NodeContextGuard`]
//! records which node and which simulated instant is being processed in a
//! thread-local, so spans opened by protocol code can be tagged with them
//! by [`NodeContextLayer`](crate::layers::NodeContextLayer).

use std::cell::RefCell;

use qnet_core::{NodeId, SimTime};
use uuid::Uuid;

/// Context of the event currently being handled
#[derive(Debug, Clone, PartialEq)]
pub struct NodeContextData {
    pub node: String,
    pub sim_time: SimTime,
    /// Identifies the simulation run
    pub run_id: Uuid,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// Sets the context for the current thread and restores the previous one
/// when dropped.
///
/// ```ignore
/// let _guard = NodeContextGuard::new(&node, now, run_id);
/// tracing::debug!("swapped");
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    pub fn new(node: &NodeId, sim_time: SimTime, run_id: Uuid) -> Self {
        let data = NodeContextData { node: node.to_string(), sim_time, run_id };
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// The current node context (if any)
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    pub fn current_node() -> Option<String> {
        Self::current().map(|ctx| ctx.node)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run `$body` with the node context set
///
/// ```ignore
/// with_node_context!(&node, now, run_id, {
///     tracing::info!("installing path");
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($node:expr, $time:expr, $run:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($node, $time, $run);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_context_guard() {
        assert!(NodeContextGuard::current().is_none());
        let run = Uuid::new_v4();
        {
            let _guard = NodeContextGuard::new(&NodeId::from("R1"), SimTime::from_ps(7), run);
            let ctx = NodeContextGuard::current().unwrap();
            assert_eq!(ctx.node, "R1");
            assert_eq!(ctx.sim_time, SimTime::from_ps(7));
            assert_eq!(ctx.run_id, run);
        }
        assert!(NodeContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        let run = Uuid::new_v4();
        let _a = NodeContextGuard::new(&NodeId::from("A"), SimTime::ZERO, run);
        {
            let _b = NodeContextGuard::new(&NodeId::from("B"), SimTime::from_ps(1), run);
            assert_eq!(NodeContextGuard::current_node().as_deref(), Some("B"));
        }
        assert_eq!(NodeContextGuard::current_node().as_deref(), Some("A"));
    }

    #[test]
    fn test_macro_scopes_context() {
        let node = NodeId::from("D");
        let seen = crate::with_node_context!(&node, SimTime::ZERO, Uuid::nil(), { NodeContextGuard::current_node() });
        assert_eq!(seen.as_deref(), Some("D"));
        assert!(NodeContextGuard::current().is_none());
    }
}
