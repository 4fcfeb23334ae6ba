//! Drag-and-drop descriptor tracking.
//!
//! A drag gesture (a palette entry dragged onto the canvas, or a new link
//! pulled out of a node's port) is described on every pointer move by a
//! [`DndDescriptor`] computed from whatever sits under the pointer. The
//! tracker keeps the last one and turns changes into hide/show feedback
//! calls, skipping moves that stay on the same magnet.

use crate::metamodel::EditorCapabilities;
use crate::sync::GraphMutation;
use flow_core::{CellId, Endpoint, EntryMetadata, FlowGraph, Link, Point, ShapeFactory};
use log::debug;

/// A view on the canvas, optionally narrowed to a magnet (port) by its
/// selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewRef {
    pub cell: CellId,
    pub selector: Option<String>,
}

impl ViewRef {
    pub fn cell(cell: CellId) -> Self {
        Self { cell, selector: None }
    }

    pub fn magnet(cell: CellId, selector: &str) -> Self {
        Self {
            cell,
            selector: Some(selector.to_string()),
        }
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Port {
            node: self.cell,
            port: self.selector.clone(),
        }
    }
}

/// Where a drag started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DragOrigin {
    Palette,
    Canvas,
}

/// A candidate drop. Two descriptors are the same drop iff origin, views and
/// selectors all match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DndDescriptor {
    pub source: Option<ViewRef>,
    pub target: Option<ViewRef>,
    pub source_component: DragOrigin,
}

/// Highlight toggling on the rendering side. Calls are not idempotent, so
/// the tracker never shows the same descriptor twice.
pub trait DropFeedback: Send {
    fn show(&mut self, descriptor: &DndDescriptor);
    fn hide(&mut self, descriptor: &DndDescriptor);
}

/// Feedback that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeedback;

impl DropFeedback for NoFeedback {
    fn show(&mut self, _: &DndDescriptor) {}
    fn hide(&mut self, _: &DndDescriptor) {}
}

/// The descriptor of the one active drag, if any.
#[derive(Debug, Default)]
pub struct DragTracker {
    current: Option<DndDescriptor>,
}

impl DragTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&DndDescriptor> {
        self.current.as_ref()
    }

    /// Feed the descriptor under the pointer. Returns true when the feedback
    /// changed.
    pub fn update(
        &mut self,
        candidate: Option<DndDescriptor>,
        feedback: &mut dyn DropFeedback,
    ) -> bool {
        if candidate.is_some() && candidate == self.current {
            return false;
        }
        let Some(next) = candidate else {
            return self.clear(feedback);
        };
        if let Some(old) = self.current.take() {
            feedback.hide(&old);
        }
        feedback.show(&next);
        self.current = Some(next);
        true
    }

    /// End the gesture: hide feedback and hand back the last descriptor. The
    /// tracker is empty afterwards whatever the caller does with it.
    pub fn finish(&mut self, feedback: &mut dyn DropFeedback) -> Option<DndDescriptor> {
        let last = self.current.take();
        if let Some(descriptor) = &last {
            feedback.hide(descriptor);
        }
        last
    }

    fn clear(&mut self, feedback: &mut dyn DropFeedback) -> bool {
        match self.current.take() {
            Some(old) => {
                feedback.hide(&old);
                true
            }
            None => false,
        }
    }
}

/// What is being dragged.
#[derive(Debug, Clone, PartialEq)]
pub enum Dragged {
    /// A palette entry, dropped as a new node.
    PaletteEntry(EntryMetadata),
    /// A new link pulled out of the descriptor's source port.
    NewLink,
}

/// The graph mutations a drop at `at` amounts to. Empty when the drop does
/// not fit the descriptor or the capabilities refuse it.
pub fn drop_mutations(
    graph: &FlowGraph,
    descriptor: &DndDescriptor,
    dragged: &Dragged,
    at: Point,
    shapes: &dyn ShapeFactory,
    capabilities: &dyn EditorCapabilities,
) -> Vec<GraphMutation> {
    match (descriptor.source_component, dragged) {
        (DragOrigin::Palette, Dragged::PaletteEntry(metadata)) => {
            let node = shapes.create_node(metadata, at);
            vec![GraphMutation::AddNode {
                id: CellId::with_prefix(&metadata.name),
                node: Box::new(node),
            }]
        }
        (DragOrigin::Canvas, Dragged::NewLink) => {
            let (Some(source), Some(target)) = (&descriptor.source, &descriptor.target) else {
                return Vec::new();
            };
            let (source, target) = (source.endpoint(), target.endpoint());
            if !capabilities.validate_link(graph, &source, &target) {
                debug!("dnd: link {source:?} -> {target:?} refused");
                return Vec::new();
            }
            vec![GraphMutation::AddLink {
                id: CellId::with_prefix("link"),
                link: Box::new(Link::new(source, target)),
            }]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metamodel::DefaultCapabilities;
    use flow_core::{DefaultShapes, FlowNode, Size};
    use pretty_assertions::assert_eq;

    /// Records feedback calls in order.
    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl DropFeedback for Recorder {
        fn show(&mut self, d: &DndDescriptor) {
            self.0.push(format!("show {}", label(d)));
        }
        fn hide(&mut self, d: &DndDescriptor) {
            self.0.push(format!("hide {}", label(d)));
        }
    }

    fn label(d: &DndDescriptor) -> String {
        match &d.target {
            Some(v) => format!("{}{}", v.cell, v.selector.as_deref().unwrap_or("")),
            None => "-".into(),
        }
    }

    fn over(cell: &str, selector: Option<&str>) -> Option<DndDescriptor> {
        let cell = CellId::intern(cell);
        Some(DndDescriptor {
            source: Some(ViewRef::magnet(CellId::intern("dnd_src"), ".out")),
            target: Some(match selector {
                Some(s) => ViewRef::magnet(cell, s),
                None => ViewRef::cell(cell),
            }),
            source_component: DragOrigin::Canvas,
        })
    }

    #[test]
    fn same_magnet_does_not_flicker() {
        let mut tracker = DragTracker::new();
        let mut rec = Recorder::default();
        assert!(tracker.update(over("dnd_n", Some(".in")), &mut rec));
        assert!(!tracker.update(over("dnd_n", Some(".in")), &mut rec));
        assert_eq!(rec.0, vec!["show dnd_n.in"]);
    }

    #[test]
    fn hide_comes_before_show() {
        let mut tracker = DragTracker::new();
        let mut rec = Recorder::default();
        tracker.update(over("dnd_n", Some(".in")), &mut rec);
        tracker.update(over("dnd_n", Some(".in2")), &mut rec);
        tracker.update(over("dnd_m", None), &mut rec);
        assert_eq!(
            rec.0,
            vec![
                "show dnd_n.in",
                "hide dnd_n.in",
                "show dnd_n.in2",
                "hide dnd_n.in2",
                "show dnd_m",
            ]
        );
    }

    #[test]
    fn none_always_clears() {
        let mut tracker = DragTracker::new();
        let mut rec = Recorder::default();
        assert!(!tracker.update(None, &mut rec));
        tracker.update(over("dnd_n", None), &mut rec);
        assert!(tracker.update(None, &mut rec));
        assert!(tracker.current().is_none());
        assert_eq!(rec.0, vec!["show dnd_n", "hide dnd_n"]);
    }

    #[test]
    fn origin_is_part_of_identity() {
        let mut tracker = DragTracker::new();
        let mut rec = Recorder::default();
        let canvas = over("dnd_n", None);
        let mut palette = canvas.clone();
        if let Some(d) = palette.as_mut() {
            d.source_component = DragOrigin::Palette;
        }
        tracker.update(canvas, &mut rec);
        assert!(tracker.update(palette, &mut rec));
    }

    #[test]
    fn finish_hands_back_and_clears() {
        let mut tracker = DragTracker::new();
        let mut rec = Recorder::default();
        tracker.update(over("dnd_n", Some(".in")), &mut rec);
        let last = tracker.finish(&mut rec);
        assert_eq!(last, over("dnd_n", Some(".in")));
        assert!(tracker.current().is_none());
        assert!(tracker.finish(&mut rec).is_none());
        assert_eq!(rec.0, vec!["show dnd_n.in", "hide dnd_n.in"]);
    }

    #[test]
    fn palette_drop_creates_a_centered_node() {
        let shapes = DefaultShapes::default();
        let descriptor = DndDescriptor {
            source: None,
            target: None,
            source_component: DragOrigin::Palette,
        };
        let entry = Dragged::PaletteEntry(EntryMetadata::new("sources", "http"));
        let muts = drop_mutations(
            &FlowGraph::new(),
            &descriptor,
            &entry,
            Point::new(200.0, 100.0),
            &shapes,
            &DefaultCapabilities,
        );
        match muts.as_slice() {
            [GraphMutation::AddNode { id, node }] => {
                assert!(id.as_str().starts_with("http"));
                assert_eq!(node.bbox().center(), Point::new(200.0, 100.0));
            }
            other => panic!("expected one AddNode, got {other:?}"),
        }
    }

    #[test]
    fn port_to_port_drop_creates_a_link() {
        let mut g = FlowGraph::new();
        let src = CellId::intern("dnd_src");
        let dst = CellId::intern("dnd_dst");
        for id in [src, dst] {
            g.add_node(id, FlowNode::new(None, Point::ZERO, Size::new(10.0, 10.0)))
                .unwrap();
        }
        let shapes = DefaultShapes::default();
        let descriptor = over("dnd_dst", Some(".in")).unwrap();
        let muts = drop_mutations(&g, &descriptor, &Dragged::NewLink, Point::ZERO, &shapes, &DefaultCapabilities);
        match muts.as_slice() {
            [GraphMutation::AddLink { link, .. }] => {
                assert_eq!(link.source, Endpoint::port(src, ".out"));
                assert_eq!(link.target, Endpoint::port(dst, ".in"));
            }
            other => panic!("expected one AddLink, got {other:?}"),
        }

        // Dropping back onto the source node is refused.
        let onto_self = over("dnd_src", Some(".in")).unwrap();
        assert!(
            drop_mutations(&g, &onto_self, &Dragged::NewLink, Point::ZERO, &shapes, &DefaultCapabilities)
                .is_empty()
        );
    }
}
