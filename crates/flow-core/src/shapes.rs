//! Shape factory: the geometry the rendering side would otherwise own.
//!
//! One factory is constructed per editor and handed to every component that
//! creates cells or measures palette entries.

use crate::id::CellId;
use crate::model::*;
use kurbo::{Point, Rect, Size};

pub trait ShapeFactory: Send + Sync {
    /// Size of a canvas node of the given type.
    fn node_size(&self, metadata: &EntryMetadata) -> Size;

    /// Size of a palette entry of the given type.
    fn palette_entry_size(&self, metadata: &EntryMetadata) -> Size {
        self.node_size(metadata)
    }

    /// Height of a palette group header.
    fn group_header_height(&self, _group: &str) -> f64 {
        30.0
    }

    /// Build a node for a type dropped at `at` (the drop point is the center).
    fn create_node(&self, metadata: &EntryMetadata, at: Point) -> FlowNode {
        let size = self.node_size(metadata);
        let origin = Point::new(at.x - size.width / 2.0, at.y - size.height / 2.0);
        FlowNode::new(Some(metadata.clone()), origin, size)
    }

    /// Where the marker badge of a cell with bounding box `anchor` sits.
    fn decoration_bounds(&self, anchor: Rect) -> Rect {
        Rect::from_origin_size(
            Point::new(anchor.x0 - 8.0, anchor.y0 - 8.0),
            Size::new(16.0, 16.0),
        )
    }

    /// Handles shown on a selected node.
    fn handles(&self, node: CellId, bbox: Rect) -> Vec<(CellId, Handle)> {
        let remove = CellId::intern(&format!("{node}#remove"));
        vec![(
            remove,
            Handle {
                kind: "remove".to_string(),
                bounds: Rect::from_origin_size(
                    Point::new(bbox.x1 - 5.0, bbox.y0 - 15.0),
                    Size::new(10.0, 10.0),
                ),
            },
        )]
    }
}

/// Built-in shapes: fixed-size boxes.
#[derive(Debug, Clone, Copy)]
pub struct DefaultShapes {
    pub node_size: Size,
}

impl Default for DefaultShapes {
    fn default() -> Self {
        Self {
            node_size: Size::new(120.0, 40.0),
        }
    }
}

impl ShapeFactory for DefaultShapes {
    fn node_size(&self, _metadata: &EntryMetadata) -> Size {
        self.node_size
    }
}
