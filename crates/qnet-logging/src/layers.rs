//! Custom tracing layers

use tracing::{Subscriber, span};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::context::{NodeContextData, NodeContextGuard};

/// Attaches the active node context to every new span
///
/// Formatters and other layers can read it back as a
/// [`NodeContextExtension`] on the span.
#[derive(Debug, Default)]
pub struct NodeContextLayer;

impl NodeContextLayer {
    pub fn new() -> Self {
        Self
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct NodeContextExtension {
    pub data: NodeContextData,
}

impl<S> Layer<S> for NodeContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let (Some(span), Some(data)) = (ctx.span(id), NodeContextGuard::current()) {
            span.extensions_mut().insert(NodeContextExtension { data });
        }
    }
}
