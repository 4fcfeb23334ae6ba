//! Collaborators the editor talks to but does not implement.
//!
//! The metamodel owns the DSL: it knows the node/link catalog, converts
//! between text and graph, and validates a graph/text pair. The editor only
//! schedules those calls.

use async_trait::async_trait;
use flow_core::{Catalog, Endpoint, FlowError, FlowGraph, MarkerMap};
use tokio::sync::broadcast;

#[async_trait]
pub trait Metamodel: Send + Sync {
    /// Fetch the full catalog. Called at startup and on every change
    /// notification; there are no deltas.
    async fn load(&self) -> Result<Catalog, FlowError>;

    /// Build the graph described by `text`. `current` is the graph on the
    /// canvas, so layout can be carried over for cells that survive.
    async fn text_to_graph(&self, text: &str, current: &FlowGraph) -> Result<FlowGraph, FlowError>;

    /// Serialize the semantic cells of `graph`.
    async fn graph_to_text(&self, graph: &FlowGraph) -> Result<String, FlowError>;

    /// Markers per node/link for the current graph/text pair.
    async fn validate(&self, _graph: &FlowGraph, _text: &str) -> Result<MarkerMap, FlowError> {
        Ok(MarkerMap::new())
    }

    /// Out-of-band catalog change notifications. Dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> Option<broadcast::Receiver<()>> {
        None
    }
}

/// Editor-side policy hooks.
pub trait EditorCapabilities: Send + Sync {
    /// Whether a link may be drawn from `source` to `target`.
    fn validate_link(&self, graph: &FlowGraph, source: &Endpoint, target: &Endpoint) -> bool {
        match (source.node_id(), target.node_id()) {
            (Some(s), Some(t)) => s != t && graph.node(s).is_some() && graph.node(t).is_some(),
            _ => false,
        }
    }
}

/// Links between any two distinct nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCapabilities;

impl EditorCapabilities for DefaultCapabilities {}
