//! Fan routing of parallel links.
//!
//! When several links join the same two nodes they would be drawn on top of
//! each other. The router gives each of them a single vertex offset
//! perpendicular to the line between the two node centers, alternating sides:
//! offsets `0, gap, gap, 2·gap, 2·gap, …`, the first on the negative side.
//!
//! Only links whose vertices are empty or were generated here take part; a
//! user who places vertices by hand opts that link out. When a pair drops back
//! to a single link, generated vertices are removed again.
//!
//! The router only ever writes `vertices` and `fan_routed`.

use crate::id::CellId;
use crate::model::FlowGraph;
use kurbo::{Point, Vec2};
use log::trace;
use smallvec::smallvec;
use std::collections::HashSet;

/// Default separation between neighbouring fanned links.
pub const DEFAULT_FAN_GAP: f64 = 20.0;

#[derive(Debug, Clone, Copy)]
pub struct FanRouter {
    gap: f64,
}

impl Default for FanRouter {
    fn default() -> Self {
        Self::new(DEFAULT_FAN_GAP)
    }
}

impl FanRouter {
    pub fn new(gap: f64) -> Self {
        Self { gap }
    }

    pub fn gap(&self) -> f64 {
        self.gap
    }

    /// Re-route after `changed` was added, moved or re-attached.
    ///
    /// For a node, its links are grouped by the node at the other end and one
    /// representative per group is routed. For a link, its sibling set is
    /// routed. Returns the links whose vertices were rewritten.
    pub fn route_cell(&self, graph: &mut FlowGraph, changed: CellId) -> Vec<CellId> {
        if let Some(link) = graph.link(changed) {
            return match link.endpoint_nodes() {
                Some((source, target)) => self.route_pair(graph, source, target),
                None => Vec::new(),
            };
        }

        if graph.node(changed).is_none() {
            return Vec::new();
        }

        let mut others: Vec<CellId> = Vec::new();
        let mut representatives: Vec<CellId> = Vec::new();
        for link_id in graph.connected_links(changed) {
            let Some(other) = graph.link(link_id).and_then(|l| l.other_end(changed)) else {
                continue;
            };
            if !others.contains(&other) {
                others.push(other);
                representatives.push(link_id);
            }
        }

        let mut rerouted = Vec::new();
        for link_id in representatives {
            rerouted.extend(self.route_cell(graph, link_id));
        }
        rerouted
    }

    /// Route every link joining `source` and `target`, in graph order.
    ///
    /// The angle of the fan is taken from `source` towards `target`.
    pub fn route_pair(&self, graph: &mut FlowGraph, source: CellId, target: CellId) -> Vec<CellId> {
        let siblings: Vec<CellId> = graph
            .links()
            .filter(|(_, link)| link.connects(source, target) && link.is_auto_routable())
            .map(|(id, _)| id)
            .collect();

        match siblings.len() {
            0 => Vec::new(),
            1 => {
                let id = siblings[0];
                match graph.link_mut(id) {
                    Some(link) if link.fan_routed => {
                        link.vertices.clear();
                        link.fan_routed = false;
                        trace!("fan: {id} back to a straight line");
                        vec![id]
                    }
                    _ => Vec::new(),
                }
            }
            count => {
                let centers = graph
                    .node(source)
                    .map(|n| n.bbox().center())
                    .zip(graph.node(target).map(|n| n.bbox().center()));
                // Either end may be gone mid-clear; nothing to route then.
                let Some((from, to)) = centers else {
                    return Vec::new();
                };

                let mid = from.midpoint(to);
                let theta = screen_angle(from, to);
                trace!("fan: {count} links between {source} and {target}, theta {theta:.1}");

                for (index, id) in siblings.iter().enumerate() {
                    let vertex = fan_vertex(mid, theta, self.gap, index);
                    if let Some(link) = graph.link_mut(*id) {
                        link.vertices = smallvec![vertex];
                        link.fan_routed = true;
                    }
                }
                siblings
            }
        }
    }

    /// Route every distinct endpoint pair once (after the whole graph was
    /// rebuilt from text).
    pub fn route_all(&self, graph: &mut FlowGraph) -> Vec<CellId> {
        let mut pairs: HashSet<(CellId, CellId)> = HashSet::new();
        let mut representatives = Vec::new();
        for (id, link) in graph.links() {
            if let Some((s, t)) = link.endpoint_nodes() {
                let key = if s <= t { (s, t) } else { (t, s) };
                if pairs.insert(key) {
                    representatives.push(id);
                }
            }
        }

        let mut rerouted = Vec::new();
        for id in representatives {
            rerouted.extend(self.route_cell(graph, id));
        }
        rerouted
    }
}

/// Distance and side of the `index`-th sibling: `(gap · ceil(index / 2), ±1)`,
/// negative side for even indices.
pub fn fan_offset(gap: f64, index: usize) -> (f64, f64) {
    let distance = gap * index.div_ceil(2) as f64;
    let sign = if index % 2 == 1 { 1.0 } else { -1.0 };
    (distance, sign)
}

/// The vertex of the `index`-th sibling around midpoint `mid`.
pub fn fan_vertex(mid: Point, theta_deg: f64, gap: f64, index: usize) -> Point {
    let (distance, sign) = fan_offset(gap, index);
    let angle = (theta_deg + sign * 90.0).to_radians();
    let dir = Vec2::from_angle(angle);
    // Angles are measured with y pointing up; the canvas has y pointing down.
    mid + Vec2::new(dir.x * distance, -dir.y * distance)
}

/// Angle in degrees `[0, 360)` of the segment `from → to`, y axis up.
pub fn screen_angle(from: Point, to: Point) -> f64 {
    let rad = (-(to.y - from.y)).atan2(to.x - from.x);
    let deg = rad.to_degrees();
    if deg < 0.0 { deg + 360.0 } else { deg }
}
