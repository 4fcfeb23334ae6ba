//! Bidirectional sync engine: canvas graph ↔ DSL text.
//!
//! The engine holds the authoritative graph and text and decides when each
//! side has to be regenerated from the other:
//!
//! - **Text → Graph**: a text edit marks the text dirty. After a quiet period
//!   (300 ms by default) the engine hands out a text → graph request; the
//!   metamodel's answer replaces the graph and every parallel-link group is
//!   fan-routed again.
//!
//! - **Graph → Text**: a semantic graph mutation marks the graph dirty. After
//!   a shorter quiet period (100 ms) the engine hands out a graph → text
//!   request; a changed result replaces the text without counting as a text
//!   edit, so the two sides never ping-pong.
//!
//! Every conversion is followed by a validation pass whose markers become
//! decorations on the graph. Only one conversion + validation cycle is ever
//! in flight; edits arriving meanwhile are recorded and their quiet period
//! starts once the cycle completes.
//!
//! The engine does no I/O and reads no clock: callers pass `now` in and run
//! the returned requests themselves (see `session`).

use flow_core::model::*;
use flow_core::{
    CellId, Direction, EditorConfig, FanRouter, FlowError, ReconcileReport, ShapeFactory,
    merge_markers, reconcile_markers, structural_markers,
};
use kurbo::{Point, Size, Vec2};
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// ─── State ───────────────────────────────────────────────────────────────

/// Where the engine is in the conversion cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionState {
    Idle,
    /// Text edited; text → graph is scheduled.
    TextDirty,
    /// Graph edited; graph → text is scheduled.
    GraphDirty,
    /// A conversion or its validation is in flight.
    Converting,
}

/// Which side was edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dirty {
    Text,
    Graph,
}

/// Owned input for one metamodel conversion.
#[derive(Debug, Clone)]
pub enum ConversionRequest {
    TextToGraph { text: String, current: FlowGraph },
    GraphToText { graph: FlowGraph },
}

impl ConversionRequest {
    pub fn direction(&self) -> Direction {
        match self {
            ConversionRequest::TextToGraph { .. } => Direction::TextToGraph,
            ConversionRequest::GraphToText { .. } => Direction::GraphToText,
        }
    }
}

/// Owned input for one validation pass.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub graph: FlowGraph,
    pub text: String,
}

/// Result of a successful validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validated {
    /// Metamodel markers merged with the editor's structural ones.
    pub markers: MarkerMap,
    pub report: ReconcileReport,
}

/// What a mutation did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationOutcome {
    /// The mutation touched the semantic content of the graph.
    pub semantic: bool,
    /// Links whose vertices the fan router rewrote.
    pub rerouted: Vec<CellId>,
}

// ─── Mutations ───────────────────────────────────────────────────────────

/// A mutation applied to the graph from canvas interaction.
#[derive(Debug, Clone)]
pub enum GraphMutation {
    AddNode {
        id: CellId,
        node: Box<FlowNode>,
    },
    /// Remove a node, link, decoration or handle (cascading like
    /// [`FlowGraph::remove`]).
    RemoveCell {
        id: CellId,
    },
    AddLink {
        id: CellId,
        link: Box<Link>,
    },
    SetEndpoint {
        id: CellId,
        end: LinkEnd,
        endpoint: Endpoint,
    },
    /// Set (`Some`) or remove (`None`) a property on a node or link.
    SetProp {
        id: CellId,
        key: String,
        value: Option<Value>,
    },
    /// Set or remove an attribute. Paths under `metadata` or `props` are
    /// always semantic; `semantic` marks any other path as such.
    SetAttr {
        id: CellId,
        path: String,
        value: Option<Value>,
        semantic: bool,
    },
    MoveNode {
        id: CellId,
        dx: f64,
        dy: f64,
    },
    ResizeNode {
        id: CellId,
        width: f64,
        height: f64,
    },
    /// User-placed vertices. A non-empty list opts the link out of fan
    /// routing; an empty one opts it back in.
    SetVertices {
        id: CellId,
        vertices: Vec<Point>,
    },
    Clear,
}

fn is_semantic_attr(path: &str) -> bool {
    path.starts_with("metadata") || path.starts_with("props")
}

// ─── Engine ──────────────────────────────────────────────────────────────

/// The sync engine holds the authoritative graph and text and schedules the
/// conversions that keep them in sync.
pub struct SyncEngine {
    graph: FlowGraph,
    text: String,
    state: ConversionState,
    /// Deadline of the pending conversion (`TextDirty` / `GraphDirty` only).
    deadline: Option<Instant>,
    /// Edit recorded while converting; the latest one wins.
    deferred: Option<Dirty>,
    /// False until a validation pass has run on the current content.
    validated: bool,
    /// False when there is no metamodel to convert with.
    conversion_enabled: bool,
    graph_to_text_sync: bool,
    /// Semantic change made while graph → text sync was off.
    unsynced_graph_change: bool,
    /// Node whose handles are shown.
    handles_for: Option<CellId>,
    text_debounce: Duration,
    graph_debounce: Duration,
    router: FanRouter,
    shapes: Arc<dyn ShapeFactory>,
}

impl SyncEngine {
    pub fn new(config: &EditorConfig, shapes: Arc<dyn ShapeFactory>) -> Self {
        Self {
            graph: FlowGraph::new(),
            text: String::new(),
            state: ConversionState::Idle,
            deadline: None,
            deferred: None,
            validated: false,
            conversion_enabled: true,
            graph_to_text_sync: config.graph_to_text_sync,
            unsynced_graph_change: false,
            handles_for: None,
            text_debounce: config.text_debounce(),
            graph_debounce: config.graph_debounce(),
            router: FanRouter::new(config.fan_gap),
            shapes,
        }
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn state(&self) -> ConversionState {
        self.state
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub fn graph_to_text_sync(&self) -> bool {
        self.graph_to_text_sync
    }

    pub fn shapes(&self) -> &dyn ShapeFactory {
        self.shapes.as_ref()
    }

    /// When the pending conversion is due, if one is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    // ─── Text → Graph direction ─────────────────────────────────────────

    /// Replace the text. Returns false (and schedules nothing) when the text
    /// is unchanged, which is what keeps an echoed `DslChanged` from starting
    /// another cycle.
    pub fn set_text(&mut self, text: String, now: Instant) -> bool {
        if text == self.text {
            return false;
        }
        self.text = text;
        self.validated = false;
        self.mark_dirty(Dirty::Text, now);
        true
    }

    // ─── Graph → Text direction ─────────────────────────────────────────

    /// Apply a mutation from canvas interaction, re-route the affected
    /// parallel links and, for semantic changes, schedule graph → text.
    pub fn apply_mutation(
        &mut self,
        mutation: GraphMutation,
        now: Instant,
    ) -> Result<MutationOutcome, FlowError> {
        let mut outcome = MutationOutcome::default();

        match mutation {
            GraphMutation::AddNode { id, node } => {
                self.graph.add_node(id, *node)?;
                outcome.semantic = true;
            }
            GraphMutation::RemoveCell { id } => {
                let cell = self.graph.cell(id).ok_or(FlowError::UnknownCell(id))?;
                outcome.semantic = cell.is_semantic();
                let pair = match &cell.kind {
                    CellKind::Link(link) => link.endpoint_nodes(),
                    _ => None,
                };
                self.graph.remove(id);
                if let Some((source, target)) = pair {
                    outcome.rerouted = self.router.route_pair(&mut self.graph, source, target);
                }
                if self.handles_for.is_some_and(|n| !self.graph.contains(n)) {
                    self.handles_for = None;
                }
            }
            GraphMutation::AddLink { id, link } => {
                self.graph.add_link(id, *link)?;
                outcome.rerouted = self.router.route_cell(&mut self.graph, id);
                outcome.semantic = true;
            }
            GraphMutation::SetEndpoint { id, end, endpoint } => {
                let before = self
                    .graph
                    .link(id)
                    .ok_or(FlowError::NotALink(id))?
                    .endpoint_nodes();
                self.graph.set_endpoint(id, end, endpoint)?;
                let after = self.graph.link(id).and_then(Link::endpoint_nodes);
                let same_pair = |(s, t): (CellId, CellId)| {
                    before.is_some_and(|(a, b)| (s == a && t == b) || (s == b && t == a))
                };
                if let Some((source, target)) = before
                    && !after.is_some_and(same_pair)
                {
                    outcome.rerouted = self.router.route_pair(&mut self.graph, source, target);
                }
                outcome.rerouted.extend(self.router.route_cell(&mut self.graph, id));
                outcome.semantic = true;
            }
            GraphMutation::SetProp { id, key, value } => {
                let props = self.props_mut(id)?;
                match value {
                    Some(value) => props.insert(key, value),
                    None => props.remove(&key),
                };
                outcome.semantic = true;
            }
            GraphMutation::SetAttr {
                id,
                path,
                value,
                semantic,
            } => {
                outcome.semantic = semantic || is_semantic_attr(&path);
                let attrs = self.attrs_mut(id)?;
                match value {
                    Some(value) => attrs.insert(path, value),
                    None => attrs.remove(&path),
                };
            }
            GraphMutation::MoveNode { id, dx, dy } => {
                let node = self.graph.node_mut(id).ok_or(FlowError::NotANode(id))?;
                let delta = Vec2::new(dx, dy);
                node.position += delta;
                self.translate_embedded(id, delta);
                outcome.rerouted = self.router.route_cell(&mut self.graph, id);
            }
            GraphMutation::ResizeNode { id, width, height } => {
                let node = self.graph.node_mut(id).ok_or(FlowError::NotANode(id))?;
                node.size = Size::new(width, height);
                if self.handles_for == Some(id) {
                    self.show_handles(id);
                }
                outcome.rerouted = self.router.route_cell(&mut self.graph, id);
            }
            GraphMutation::SetVertices { id, vertices } => {
                let link = self.graph.link_mut(id).ok_or(FlowError::NotALink(id))?;
                link.vertices = vertices.into_iter().collect();
                link.fan_routed = false;
                outcome.rerouted = self.router.route_cell(&mut self.graph, id);
            }
            GraphMutation::Clear => {
                self.graph.clear();
                self.handles_for = None;
                outcome.semantic = true;
            }
        }

        if outcome.semantic {
            self.validated = false;
            if self.graph_to_text_sync {
                self.mark_dirty(Dirty::Graph, now);
            } else {
                self.unsynced_graph_change = true;
            }
        }
        Ok(outcome)
    }

    /// Turn graph → text regeneration on or off. Re-enabling catches up on
    /// any semantic change made while it was off.
    pub fn set_graph_to_text_sync(&mut self, enabled: bool, now: Instant) {
        self.graph_to_text_sync = enabled;
        if enabled && std::mem::take(&mut self.unsynced_graph_change) {
            self.mark_dirty(Dirty::Graph, now);
        }
    }

    /// Turn conversions on or off altogether (no metamodel to convert with).
    /// Anything pending is dropped; an in-flight cycle still completes.
    pub fn set_conversion_enabled(&mut self, enabled: bool) {
        self.conversion_enabled = enabled;
        if !enabled {
            self.deferred = None;
            if self.state != ConversionState::Converting {
                self.state = ConversionState::Idle;
                self.deadline = None;
            }
        }
    }

    fn mark_dirty(&mut self, dirty: Dirty, now: Instant) {
        if !self.conversion_enabled {
            return;
        }
        if self.state == ConversionState::Converting {
            if let Some(older) = self.deferred.filter(|older| *older != dirty) {
                debug!("sync: deferred {older:?} edit superseded by {dirty:?} edit");
            }
            debug!("sync: {dirty:?} edit while converting, deferred");
            self.deferred = Some(dirty);
            return;
        }
        // The newer edit supersedes a pending conversion the other way.
        let (state, wait) = match dirty {
            Dirty::Text => (ConversionState::TextDirty, self.text_debounce),
            Dirty::Graph => (ConversionState::GraphDirty, self.graph_debounce),
        };
        match self.state {
            ConversionState::TextDirty | ConversionState::GraphDirty if self.state != state => {
                debug!("sync: pending {:?} superseded by {dirty:?} edit", self.state);
            }
            ConversionState::Idle => debug!("sync: Idle -> {state:?}"),
            _ => {}
        }
        self.state = state;
        self.deadline = Some(now.checked_add(wait).unwrap_or(now));
    }

    // ─── Conversion cycle ───────────────────────────────────────────────

    /// Start the pending conversion if its quiet period has elapsed.
    pub fn poll_conversion(&mut self, now: Instant) -> Option<ConversionRequest> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        let request = match self.state {
            ConversionState::TextDirty => ConversionRequest::TextToGraph {
                text: self.text.clone(),
                current: self.graph.clone(),
            },
            ConversionState::GraphDirty => ConversionRequest::GraphToText {
                graph: self.graph.clone(),
            },
            ConversionState::Idle | ConversionState::Converting => return None,
        };
        debug!("sync: {:?} -> Converting ({})", self.state, request.direction());
        self.state = ConversionState::Converting;
        self.deadline = None;
        Some(request)
    }

    /// Install the metamodel's text → graph answer. A failure keeps the
    /// current graph; validation runs either way.
    pub fn finish_text_to_graph(
        &mut self,
        result: Result<FlowGraph, FlowError>,
    ) -> ValidationRequest {
        match result {
            Ok(graph) => {
                self.graph = graph;
                let rerouted = self.router.route_all(&mut self.graph);
                debug!(
                    "sync: graph rebuilt, {} cells, {} links fan-routed",
                    self.graph.len(),
                    rerouted.len()
                );
                if let Some(node) = self.handles_for {
                    if self.graph.node(node).is_some() {
                        self.show_handles(node);
                    } else {
                        self.handles_for = None;
                    }
                }
            }
            Err(err) => warn!("sync: {err}"),
        }
        self.validated = false;
        self.validation_request()
    }

    /// Take the metamodel's graph → text answer. Returns the new text when
    /// it differs from the current one. Failures are swallowed; validation
    /// runs either way.
    pub fn finish_graph_to_text(
        &mut self,
        result: Result<String, FlowError>,
    ) -> (Option<String>, ValidationRequest) {
        let changed = match result {
            Ok(text) if text != self.text => {
                // Not an edit: nothing is scheduled.
                self.text = text.clone();
                Some(text)
            }
            Ok(_) => None,
            Err(err) => {
                warn!("sync: {err}");
                None
            }
        };
        (changed, self.validation_request())
    }

    /// Validate without converting (initial load). `None` while another
    /// cycle is pending or in flight.
    pub fn begin_validation(&mut self) -> Option<ValidationRequest> {
        if self.state != ConversionState::Idle {
            return None;
        }
        debug!("sync: Idle -> Converting (validation only)");
        self.state = ConversionState::Converting;
        Some(self.validation_request())
    }

    fn validation_request(&self) -> ValidationRequest {
        ValidationRequest {
            graph: self.graph.clone(),
            text: self.text.clone(),
        }
    }

    /// Close the cycle: reconcile decorations with the markers, return to
    /// `Idle` and start the quiet period of any edit recorded meanwhile. A
    /// failed validation leaves the decorations as they were.
    pub fn finish_validation(
        &mut self,
        result: Result<MarkerMap, FlowError>,
        now: Instant,
    ) -> Option<Validated> {
        let validated = match result {
            Ok(mut markers) => {
                merge_markers(&mut markers, structural_markers(&self.graph));
                let report = reconcile_markers(&mut self.graph, &markers, self.shapes.as_ref());
                self.validated = true;
                Some(Validated { markers, report })
            }
            Err(err) => {
                warn!("sync: validation failed: {err}");
                None
            }
        };

        debug!("sync: Converting -> Idle");
        self.state = ConversionState::Idle;
        if let Some(dirty) = self.deferred.take() {
            self.mark_dirty(dirty, now);
        }
        validated
    }

    // ─── Selection handles ──────────────────────────────────────────────

    /// Show the handles of `node`, replacing any shown elsewhere. Handles are
    /// visual and never schedule a conversion.
    pub fn show_handles(&mut self, node: CellId) -> Vec<CellId> {
        self.hide_handles();
        let Some(bbox) = self.graph.node(node).map(FlowNode::bbox) else {
            return Vec::new();
        };
        let mut shown = Vec::new();
        for (id, handle) in self.shapes.handles(node, bbox) {
            if self.graph.embed(node, id, CellKind::Handle(handle)).is_ok() {
                shown.push(id);
            }
        }
        self.handles_for = Some(node);
        shown
    }

    pub fn hide_handles(&mut self) {
        let Some(node) = self.handles_for.take() else {
            return;
        };
        let handles: Vec<CellId> = self
            .graph
            .embedded(node)
            .into_iter()
            .filter(|id| matches!(self.graph.cell(*id).map(|c| &c.kind), Some(CellKind::Handle(_))))
            .collect();
        for id in handles {
            self.graph.remove(id);
        }
    }

    // ─── Helpers ────────────────────────────────────────────────────────

    fn props_mut(&mut self, id: CellId) -> Result<&mut Props, FlowError> {
        match self.graph.cell_mut(id).map(|c| &mut c.kind) {
            Some(CellKind::Node(node)) => Ok(&mut node.props),
            Some(CellKind::Link(link)) => Ok(&mut link.props),
            Some(_) => Err(FlowError::NotANode(id)),
            None => Err(FlowError::UnknownCell(id)),
        }
    }

    fn attrs_mut(&mut self, id: CellId) -> Result<&mut Attrs, FlowError> {
        match self.graph.cell_mut(id).map(|c| &mut c.kind) {
            Some(CellKind::Node(node)) => Ok(&mut node.attrs),
            Some(CellKind::Link(link)) => Ok(&mut link.attrs),
            Some(_) => Err(FlowError::NotANode(id)),
            None => Err(FlowError::UnknownCell(id)),
        }
    }

    /// Embedded decorations and handles travel with their node.
    fn translate_embedded(&mut self, node: CellId, delta: Vec2) {
        for child in self.graph.embedded(node) {
            match self.graph.cell_mut(child).map(|c| &mut c.kind) {
                Some(CellKind::Decoration(d)) => d.bounds = d.bounds + delta,
                Some(CellKind::Handle(h)) => h.bounds = h.bounds + delta,
                _ => {}
            }
        }
    }
}
