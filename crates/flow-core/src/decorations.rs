//! Marker decorations: the on-canvas face of validation.
//!
//! Validation hands back markers per node or link. Each flagged cell carries
//! exactly one embedded decoration listing its markers; reconciling creates,
//! updates or removes those decorations so that they match the latest marker
//! map. The pass is idempotent.

use crate::id::CellId;
use crate::model::*;
use crate::shapes::ShapeFactory;

// ─── Report ──────────────────────────────────────────────────────────────

/// What a reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<CellId>,
    pub updated: Vec<CellId>,
    pub removed: Vec<CellId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Bring decorations in line with `markers`. Markers for cells that are not
/// in the graph are ignored.
pub fn reconcile_markers(
    graph: &mut FlowGraph,
    markers: &MarkerMap,
    shapes: &dyn ShapeFactory,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let owners: Vec<CellId> = graph.semantic_cells().map(|c| c.id).collect();

    for owner in owners {
        let found = markers.get(&owner).filter(|m| !m.is_empty());
        let deco_id = owner.decoration();
        let existing = graph.contains(deco_id);

        match (found, existing) {
            (Some(list), false) => {
                let Some(anchor) = graph.bbox(owner) else {
                    continue;
                };
                let decoration = Decoration {
                    bounds: shapes.decoration_bounds(anchor),
                    severity: worst_severity(list),
                    markers: list.clone(),
                };
                if graph
                    .embed(owner, deco_id, CellKind::Decoration(decoration))
                    .is_ok()
                {
                    report.created.push(deco_id);
                }
            }
            (Some(list), true) => {
                let anchor = graph.bbox(owner);
                if let Some(Cell {
                    kind: CellKind::Decoration(deco),
                    ..
                }) = graph.cell_mut(deco_id)
                {
                    let severity = worst_severity(list);
                    let bounds = anchor.map(|a| shapes.decoration_bounds(a)).unwrap_or(deco.bounds);
                    if deco.markers != *list || deco.severity != severity || deco.bounds != bounds {
                        deco.markers = list.clone();
                        deco.severity = severity;
                        deco.bounds = bounds;
                        report.updated.push(deco_id);
                    }
                }
            }
            (None, true) => {
                graph.remove(deco_id);
                report.removed.push(deco_id);
            }
            (None, false) => {}
        }
    }

    report
}

/// Markers the editor raises on its own, independent of the metamodel.
#[must_use]
pub fn structural_markers(graph: &FlowGraph) -> MarkerMap {
    let mut markers = MarkerMap::new();
    unattached_links(graph, &mut markers);
    markers
}

/// Merge `extra` into `base`, keeping both sides' markers.
pub fn merge_markers(base: &mut MarkerMap, extra: MarkerMap) {
    for (id, list) in extra {
        base.entry(id).or_default().extend(list);
    }
}

fn worst_severity(markers: &[Marker]) -> Severity {
    markers
        .iter()
        .map(|m| m.severity)
        .min()
        .unwrap_or(Severity::Info)
}

// ─── Rules ────────────────────────────────────────────────────────────────

/// Warn on links left with a free end.
fn unattached_links(graph: &FlowGraph, markers: &mut MarkerMap) {
    for (id, link) in graph.links() {
        if link.source.node_id().is_none() {
            markers
                .entry(id)
                .or_default()
                .push(Marker::warning("Link has no source node."));
        }
        if link.target.node_id().is_none() {
            markers
                .entry(id)
                .or_default()
                .push(Marker::warning("Link has no target node."));
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
