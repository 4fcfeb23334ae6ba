//! Core flow-graph data model.
//!
//! A flow document is a set of cells held in one arena keyed by `CellId`, in
//! insertion order. Nodes are the pipeline steps, links connect node ports (or
//! dangle at a free point while being drawn), and decorations and handles are
//! visual children embedded under a node or link. Embedding is a plain
//! `parent` ID on the child: the graph owns every cell, nothing points back.
//!
//! Only nodes and links are semantic. Decorations and handles never reach the
//! DSL text.

use crate::error::FlowError;
use crate::id::CellId;
use indexmap::IndexMap;
use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashSet};

/// Opaque property map (`props/...` attribute paths).
pub type Props = BTreeMap<String, serde_json::Value>;

/// Visual attribute map. Never persisted into the DSL unless the attribute
/// path is classified as semantic.
pub type Attrs = BTreeMap<String, serde_json::Value>;

// ─── Type descriptors ────────────────────────────────────────────────────

/// A node or link type as supplied by the metamodel catalog.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryMetadata {
    pub group: String,
    pub name: String,
    pub description: Option<String>,
    /// Hidden from the palette (e.g. internal link types).
    pub no_palette_entry: bool,
    /// Property schema, opaque to the editor.
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl EntryMetadata {
    pub fn new(group: &str, name: &str) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }
}

// ─── Validation markers ──────────────────────────────────────────────────

/// Severity of a validation marker. Ordered most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single validation finding for a node or link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub message: String,
    pub severity: Severity,
}

impl Marker {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

/// Markers per node/link, as returned by validation.
pub type MarkerMap = BTreeMap<CellId, Vec<Marker>>;

// ─── Nodes ───────────────────────────────────────────────────────────────

/// A pipeline step on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub position: Point,
    pub size: Size,
    pub metadata: Option<EntryMetadata>,
    pub props: Props,
    pub attrs: Attrs,
}

impl FlowNode {
    pub fn new(metadata: Option<EntryMetadata>, position: Point, size: Size) -> Self {
        Self {
            position,
            size,
            metadata,
            props: Props::new(),
            attrs: Attrs::new(),
        }
    }

    pub fn bbox(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }
}

// ─── Links ───────────────────────────────────────────────────────────────

/// One end of a link: a free point, or a node (optionally a named port on it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Endpoint {
    Point(Point),
    Port { node: CellId, port: Option<String> },
}

impl Endpoint {
    /// Attach to a node without naming a port.
    pub fn node(node: CellId) -> Self {
        Endpoint::Port { node, port: None }
    }

    pub fn port(node: CellId, port: &str) -> Self {
        Endpoint::Port {
            node,
            port: Some(port.to_string()),
        }
    }

    /// The node this endpoint is attached to, if any.
    pub fn node_id(&self) -> Option<CellId> {
        match self {
            Endpoint::Port { node, .. } => Some(*node),
            Endpoint::Point(_) => None,
        }
    }
}

/// Which end of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkEnd {
    Source,
    Target,
}

/// A connection between two endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: Endpoint,
    pub target: Endpoint,
    /// Routing waypoints.
    pub vertices: SmallVec<[Point; 2]>,
    /// The vertices were generated by the fan router, not placed by the user.
    pub fan_routed: bool,
    pub metadata: Option<EntryMetadata>,
    pub props: Props,
    pub attrs: Attrs,
}

impl Link {
    pub fn new(source: Endpoint, target: Endpoint) -> Self {
        Self {
            source,
            target,
            vertices: SmallVec::new(),
            fan_routed: false,
            metadata: None,
            props: Props::new(),
            attrs: Attrs::new(),
        }
    }

    /// Both endpoint nodes, if both ends are attached.
    pub fn endpoint_nodes(&self) -> Option<(CellId, CellId)> {
        Some((self.source.node_id()?, self.target.node_id()?))
    }

    /// True if the link joins `a` and `b` in either direction.
    pub fn connects(&self, a: CellId, b: CellId) -> bool {
        match self.endpoint_nodes() {
            Some((s, t)) => (s == a && t == b) || (s == b && t == a),
            None => false,
        }
    }

    /// True if either end is attached to `node`.
    pub fn touches(&self, node: CellId) -> bool {
        self.source.node_id() == Some(node) || self.target.node_id() == Some(node)
    }

    /// The endpoint node opposite `node`.
    pub fn other_end(&self, node: CellId) -> Option<CellId> {
        let (s, t) = self.endpoint_nodes()?;
        if s == node {
            Some(t)
        } else if t == node {
            Some(s)
        } else {
            None
        }
    }

    /// A link takes part in fan routing unless the user placed its vertices.
    pub fn is_auto_routable(&self) -> bool {
        self.vertices.is_empty() || self.fan_routed
    }

    pub fn end(&self, end: LinkEnd) -> &Endpoint {
        match end {
            LinkEnd::Source => &self.source,
            LinkEnd::Target => &self.target,
        }
    }
}

// ─── Embedded cells ──────────────────────────────────────────────────────

/// Marker badge embedded under a node or link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decoration {
    pub bounds: Rect,
    /// Most severe marker severity; drives the badge style.
    pub severity: Severity,
    pub markers: Vec<Marker>,
}

/// Interaction handle (remove, properties, …) shown on a selected node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handle {
    pub kind: String,
    pub bounds: Rect,
}

// ─── Cells ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellKind {
    Node(FlowNode),
    Link(Link),
    Decoration(Decoration),
    Handle(Handle),
}

/// An entry of the graph arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    /// Embedding parent. Always set for decorations and handles.
    pub parent: Option<CellId>,
    pub kind: CellKind,
}

impl Cell {
    /// Nodes and links; what the DSL serializes.
    pub fn is_semantic(&self) -> bool {
        matches!(self.kind, CellKind::Node(_) | CellKind::Link(_))
    }
}

// ─── Flow graph ──────────────────────────────────────────────────────────

/// The complete flow document: every cell in one table, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    cells: IndexMap<CellId, Cell>,
}

impl FlowGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cells.contains_key(&id)
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(&id)
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Nodes and links only, in insertion order.
    pub fn semantic_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values().filter(|c| c.is_semantic())
    }

    pub fn node(&self, id: CellId) -> Option<&FlowNode> {
        match &self.cells.get(&id)?.kind {
            CellKind::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn node_mut(&mut self, id: CellId) -> Option<&mut FlowNode> {
        match &mut self.cells.get_mut(&id)?.kind {
            CellKind::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn link(&self, id: CellId) -> Option<&Link> {
        match &self.cells.get(&id)?.kind {
            CellKind::Link(link) => Some(link),
            _ => None,
        }
    }

    pub fn link_mut(&mut self, id: CellId) -> Option<&mut Link> {
        match &mut self.cells.get_mut(&id)?.kind {
            CellKind::Link(link) => Some(link),
            _ => None,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = (CellId, &FlowNode)> {
        self.cells.values().filter_map(|c| match &c.kind {
            CellKind::Node(node) => Some((c.id, node)),
            _ => None,
        })
    }

    /// Links in insertion order. This is the traversal order fan routing
    /// assigns offsets in.
    pub fn links(&self) -> impl Iterator<Item = (CellId, &Link)> {
        self.cells.values().filter_map(|c| match &c.kind {
            CellKind::Link(link) => Some((c.id, link)),
            _ => None,
        })
    }

    /// Add a node at the top level.
    pub fn add_node(&mut self, id: CellId, node: FlowNode) -> Result<(), FlowError> {
        self.insert(Cell {
            id,
            parent: None,
            kind: CellKind::Node(node),
        })
    }

    /// Add a link. Attached endpoints must reference existing nodes.
    pub fn add_link(&mut self, id: CellId, link: Link) -> Result<(), FlowError> {
        self.check_endpoint(&link.source)?;
        self.check_endpoint(&link.target)?;
        self.insert(Cell {
            id,
            parent: None,
            kind: CellKind::Link(link),
        })
    }

    /// Embed a decoration or handle under `parent`.
    pub fn embed(&mut self, parent: CellId, id: CellId, kind: CellKind) -> Result<(), FlowError> {
        if !self.contains(parent) {
            return Err(FlowError::UnknownCell(parent));
        }
        self.insert(Cell {
            id,
            parent: Some(parent),
            kind,
        })
    }

    fn insert(&mut self, cell: Cell) -> Result<(), FlowError> {
        if self.cells.contains_key(&cell.id) {
            return Err(FlowError::DuplicateCell(cell.id));
        }
        self.cells.insert(cell.id, cell);
        Ok(())
    }

    fn check_endpoint(&self, endpoint: &Endpoint) -> Result<(), FlowError> {
        if let Some(node) = endpoint.node_id() {
            match self.cells.get(&node).map(|c| &c.kind) {
                Some(CellKind::Node(_)) => {}
                Some(_) => return Err(FlowError::NotANode(node)),
                None => return Err(FlowError::UnknownCell(node)),
            }
        }
        Ok(())
    }

    /// Re-attach one end of a link.
    pub fn set_endpoint(
        &mut self,
        link_id: CellId,
        end: LinkEnd,
        endpoint: Endpoint,
    ) -> Result<(), FlowError> {
        self.check_endpoint(&endpoint)?;
        let link = self
            .link_mut(link_id)
            .ok_or(FlowError::NotALink(link_id))?;
        match end {
            LinkEnd::Source => link.source = endpoint,
            LinkEnd::Target => link.target = endpoint,
        }
        Ok(())
    }

    /// Direct children embedded under `parent`.
    pub fn embedded(&self, parent: CellId) -> Vec<CellId> {
        self.cells
            .values()
            .filter(|c| c.parent == Some(parent))
            .map(|c| c.id)
            .collect()
    }

    /// Links attached to `node`, in graph order.
    pub fn connected_links(&self, node: CellId) -> Vec<CellId> {
        self.links()
            .filter(|(_, link)| link.touches(node))
            .map(|(id, _)| id)
            .collect()
    }

    /// Remove a cell together with everything that depends on it: embedded
    /// children, and for a node every attached link. Returns the removed cells.
    pub fn remove(&mut self, id: CellId) -> Vec<Cell> {
        if !self.contains(id) {
            return Vec::new();
        }

        let mut doomed: Vec<CellId> = vec![id];
        if matches!(self.cells[&id].kind, CellKind::Node(_)) {
            doomed.extend(self.connected_links(id));
        }

        // Pull in embedded descendants of everything collected so far.
        let mut seen: HashSet<CellId> = doomed.iter().copied().collect();
        let mut i = 0;
        while i < doomed.len() {
            for child in self.embedded(doomed[i]) {
                if seen.insert(child) {
                    doomed.push(child);
                }
            }
            i += 1;
        }

        doomed
            .into_iter()
            .filter_map(|id| self.cells.shift_remove(&id))
            .collect()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Bounding box of a node, or of a link's resolved endpoints.
    pub fn bbox(&self, id: CellId) -> Option<Rect> {
        match &self.cells.get(&id)?.kind {
            CellKind::Node(node) => Some(node.bbox()),
            CellKind::Link(link) => {
                let a = self.resolve_endpoint(&link.source)?;
                let b = self.resolve_endpoint(&link.target)?;
                Some(Rect::from_points(a, b))
            }
            CellKind::Decoration(d) => Some(d.bounds),
            CellKind::Handle(h) => Some(h.bounds),
        }
    }

    /// Where an endpoint sits: the free point, or the center of its node.
    pub fn resolve_endpoint(&self, endpoint: &Endpoint) -> Option<Point> {
        match endpoint {
            Endpoint::Point(p) => Some(*p),
            Endpoint::Port { node, .. } => self.node(*node).map(|n| n.bbox().center()),
        }
    }
}
