//! Palette layout solver.
//!
//! Lays group headers and entries out as a flow of uniform cells inside a
//! container of fixed width. Headers span the full width; entries wrap into
//! rows centered horizontally. Collapsed groups keep their header but hide
//! their entries, and a case-insensitive filter on group or entry name
//! narrows the set. Every change re-runs the whole layout.

use crate::catalog::Catalog;
use crate::config::PaletteConfig;
use crate::model::EntryMetadata;
use crate::shapes::ShapeFactory;
use kurbo::{Point, Rect, Size};
use std::collections::BTreeSet;
use std::sync::Arc;

/// What the palette is asked to show.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaletteQuery {
    /// Container width.
    pub width: f64,
    /// Groups whose entries are hidden.
    pub collapsed: BTreeSet<String>,
    /// Substring filter; empty means no filter.
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaletteItemKind {
    Header { group: String, collapsed: bool },
    Entry(EntryMetadata),
    /// Shown instead of everything else when a filter matches nothing.
    NoMatches,
}

/// One placed palette element.
#[derive(Debug, Clone, PartialEq)]
pub struct PaletteItem {
    pub kind: PaletteItemKind,
    pub bounds: Rect,
}

/// Result of a layout pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaletteLayout {
    pub items: Vec<PaletteItem>,
    /// Uniform entry cell, padding included.
    pub cell: Size,
    /// Total height consumed; the container is resized to exactly this.
    pub height: f64,
}

impl PaletteLayout {
    /// The entry under `point`, for starting a palette drag.
    pub fn entry_at(&self, point: Point) -> Option<&EntryMetadata> {
        self.items.iter().find_map(|item| match &item.kind {
            PaletteItemKind::Entry(metadata) if item.bounds.contains(point) => Some(metadata),
            _ => None,
        })
    }

    /// The group whose header is under `point`, for toggling collapse.
    pub fn header_at(&self, point: Point) -> Option<&str> {
        self.items.iter().find_map(|item| match &item.kind {
            PaletteItemKind::Header { group, .. } if item.bounds.contains(point) => {
                Some(group.as_str())
            }
            _ => None,
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = (&EntryMetadata, Rect)> {
        self.items.iter().filter_map(|item| match &item.kind {
            PaletteItemKind::Entry(metadata) => Some((metadata, item.bounds)),
            _ => None,
        })
    }
}

enum Candidate<'c> {
    Header { group: &'c str, collapsed: bool },
    Entry { metadata: &'c EntryMetadata, size: Size },
}

/// Lay out `catalog` for `query`.
pub fn layout_palette(
    catalog: &Catalog,
    query: &PaletteQuery,
    config: &PaletteConfig,
    shapes: &dyn ShapeFactory,
) -> PaletteLayout {
    let needle = query.filter.to_lowercase();
    let filtering = !needle.is_empty();

    // Headers precede the first active entry of their group, collapsed or not.
    let mut candidates: Vec<Candidate<'_>> = Vec::new();
    for (group, entries) in catalog.groups() {
        let collapsed = query.collapsed.contains(group);
        let group_matches = filtering && group.to_lowercase().contains(&needle);
        let mut header_added = false;

        for (name, metadata) in entries {
            if metadata.no_palette_entry {
                continue;
            }
            if filtering && !group_matches && !name.to_lowercase().contains(&needle) {
                continue;
            }
            if !header_added {
                candidates.push(Candidate::Header { group, collapsed });
                header_added = true;
            }
            if !collapsed {
                candidates.push(Candidate::Entry {
                    metadata,
                    size: shapes.palette_entry_size(metadata),
                });
            }
        }
    }

    if candidates.is_empty() {
        if !filtering {
            return PaletteLayout::default();
        }
        let height = config.no_matches_height;
        return PaletteLayout {
            items: vec![PaletteItem {
                kind: PaletteItemKind::NoMatches,
                bounds: Rect::new(0.0, 0.0, query.width, height),
            }],
            cell: Size::ZERO,
            height,
        };
    }

    // Uniform cell: the largest entry plus padding on every side.
    let mut cell = Size::ZERO;
    for candidate in &candidates {
        if let Candidate::Entry { size, .. } = candidate {
            cell.width = cell.width.max(size.width);
            cell.height = cell.height.max(size.height);
        }
    }
    cell.width += 2.0 * config.entry_padding.width;
    cell.height += 2.0 * config.entry_padding.height;

    let width = query.width;
    let start_x = if cell.width > 0.0 && width >= cell.width {
        (width - (width / cell.width).floor() * cell.width) / 2.0
    } else {
        0.0
    };

    // `y` runs one cell ahead after every entry; an entry that stays in the
    // row takes that cell back so the whole row shares one `y`.
    let mut x = start_x;
    let mut y = 0.0;
    let mut prev_was_entry = false;
    let mut items = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match candidate {
            Candidate::Header { group, collapsed } => {
                let height = shapes.group_header_height(group);
                x = start_x;
                items.push(PaletteItem {
                    kind: PaletteItemKind::Header {
                        group: group.to_string(),
                        collapsed,
                    },
                    bounds: Rect::from_origin_size(Point::new(0.0, y), Size::new(width, height)),
                });
                y += height + config.header_gap;
                prev_was_entry = false;
            }
            Candidate::Entry { metadata, size } => {
                if x + cell.width > width {
                    x = start_x;
                } else if prev_was_entry {
                    y -= cell.height;
                }
                let origin = Point::new(
                    x + (cell.width - size.width) / 2.0,
                    y + (cell.height - size.height) / 2.0,
                );
                items.push(PaletteItem {
                    kind: PaletteItemKind::Entry(metadata.clone()),
                    bounds: Rect::from_origin_size(origin, size),
                });
                x += cell.width;
                y += cell.height;
                prev_was_entry = true;
            }
        }
    }

    PaletteLayout {
        items,
        cell,
        height: y,
    }
}

// ─── Palette state ───────────────────────────────────────────────────────

/// Palette state: catalog, collapse set, filter and width, with the layout
/// kept current after every change.
pub struct Palette {
    catalog: Catalog,
    query: PaletteQuery,
    config: PaletteConfig,
    shapes: Arc<dyn ShapeFactory>,
    layout: PaletteLayout,
}

impl Palette {
    pub fn new(width: f64, config: PaletteConfig, shapes: Arc<dyn ShapeFactory>) -> Self {
        Self {
            catalog: Catalog::new(),
            query: PaletteQuery {
                width,
                ..Default::default()
            },
            config,
            shapes,
            layout: PaletteLayout::default(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn layout(&self) -> &PaletteLayout {
        &self.layout
    }

    pub fn filter(&self) -> &str {
        &self.query.filter
    }

    pub fn is_collapsed(&self, group: &str) -> bool {
        self.query.collapsed.contains(group)
    }

    /// Replace the catalog wholesale (on every catalog-change notification).
    pub fn set_catalog(&mut self, catalog: Catalog) -> &PaletteLayout {
        self.catalog = catalog;
        self.relayout()
    }

    pub fn set_filter(&mut self, filter: &str) -> &PaletteLayout {
        self.query.filter = filter.to_string();
        self.relayout()
    }

    pub fn set_width(&mut self, width: f64) -> &PaletteLayout {
        self.query.width = width;
        self.relayout()
    }

    /// Collapse an expanded group or expand a collapsed one.
    pub fn toggle_group(&mut self, group: &str) -> &PaletteLayout {
        if !self.query.collapsed.remove(group) {
            self.query.collapsed.insert(group.to_string());
        }
        self.relayout()
    }

    fn relayout(&mut self) -> &PaletteLayout {
        self.layout = layout_palette(&self.catalog, &self.query, &self.config, self.shapes.as_ref());
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::DefaultShapes;
    use pretty_assertions::assert_eq;

    fn shapes() -> DefaultShapes {
        DefaultShapes {
            node_size: Size::new(120.0, 40.0),
        }
    }

    fn sources_catalog() -> Catalog {
        let mut c = Catalog::new();
        c.insert(EntryMetadata::new("sources", "http"));
        c.insert(EntryMetadata::new("sources", "file"));
        c
    }

    fn query(width: f64) -> PaletteQuery {
        PaletteQuery {
            width,
            ..Default::default()
        }
    }

    #[test]
    fn two_entries_share_a_row_when_they_fit() {
        // Cell is 144 x 64; 300 holds two cells, start_x = (300 - 288) / 2 = 6.
        let layout = layout_palette(&sources_catalog(), &query(300.0), &PaletteConfig::default(), &shapes());

        assert_eq!(layout.cell, Size::new(144.0, 64.0));
        assert_eq!(layout.items.len(), 3);
        assert_eq!(layout.items[0].bounds, Rect::new(0.0, 0.0, 300.0, 30.0));

        let entries: Vec<(String, Rect)> = layout
            .entries()
            .map(|(m, r)| (m.name.clone(), r))
            .collect();
        assert_eq!(
            entries,
            vec![
                ("file".to_string(), Rect::new(18.0, 47.0, 138.0, 87.0)),
                ("http".to_string(), Rect::new(162.0, 47.0, 282.0, 87.0)),
            ]
        );
        assert_eq!(layout.height, 35.0 + 64.0);
    }

    #[test]
    fn second_entry_wraps_in_a_narrow_container() {
        // 200 holds one cell: start_x = (200 - 144) / 2 = 28.
        let layout = layout_palette(&sources_catalog(), &query(200.0), &PaletteConfig::default(), &shapes());
        let rects: Vec<Rect> = layout.entries().map(|(_, r)| r).collect();
        assert_eq!(rects[0], Rect::new(40.0, 47.0, 160.0, 87.0));
        assert_eq!(rects[1], Rect::new(40.0, 111.0, 160.0, 151.0));
        assert_eq!(layout.height, 35.0 + 128.0);
    }

    #[test]
    fn container_narrower_than_a_cell_starts_at_zero() {
        let layout = layout_palette(&sources_catalog(), &query(100.0), &PaletteConfig::default(), &shapes());
        let rects: Vec<Rect> = layout.entries().map(|(_, r)| r).collect();
        assert_eq!(rects[0].x0, 12.0);
        assert_eq!(rects[1].x0, 12.0);
        assert_eq!(rects[1].y0 - rects[0].y0, 64.0);
    }

    #[test]
    fn collapsed_group_keeps_its_header() {
        let mut q = query(300.0);
        q.collapsed.insert("sources".to_string());
        let layout = layout_palette(&sources_catalog(), &q, &PaletteConfig::default(), &shapes());
        assert_eq!(layout.items.len(), 1);
        assert_eq!(
            layout.items[0].kind,
            PaletteItemKind::Header {
                group: "sources".into(),
                collapsed: true
            }
        );
        assert_eq!(layout.height, 35.0);
    }

    #[test]
    fn filter_matches_entry_or_group_case_insensitively() {
        let mut catalog = sources_catalog();
        catalog.insert(EntryMetadata::new("sinks", "log"));
        catalog.insert(EntryMetadata::new("sinks", "hdfs"));

        let mut q = query(300.0);
        q.filter = "HT".to_string();
        let layout = layout_palette(&catalog, &q, &PaletteConfig::default(), &shapes());
        let names: Vec<&str> = layout.entries().map(|(m, _)| m.name.as_str()).collect();
        assert_eq!(names, vec!["http"]);

        q.filter = "Sink".to_string();
        let layout = layout_palette(&catalog, &q, &PaletteConfig::default(), &shapes());
        let names: Vec<&str> = layout.entries().map(|(m, _)| m.name.as_str()).collect();
        assert_eq!(names, vec!["hdfs", "log"]);
    }

    #[test]
    fn hidden_entries_never_show() {
        let mut catalog = sources_catalog();
        let mut internal = EntryMetadata::new("links", "tap");
        internal.no_palette_entry = true;
        catalog.insert(internal);

        let layout = layout_palette(&catalog, &query(300.0), &PaletteConfig::default(), &shapes());
        assert!(layout.items.iter().all(|i| !matches!(
            &i.kind,
            PaletteItemKind::Header { group, .. } if group == "links"
        )));
    }

    #[test]
    fn unmatched_filter_shows_placeholder() {
        let mut q = query(250.0);
        q.filter = "kafka".to_string();
        let layout = layout_palette(&sources_catalog(), &q, &PaletteConfig::default(), &shapes());
        assert_eq!(
            layout.items,
            vec![PaletteItem {
                kind: PaletteItemKind::NoMatches,
                bounds: Rect::new(0.0, 0.0, 250.0, 30.0),
            }]
        );
        assert_eq!(layout.height, 30.0);
    }

    #[test]
    fn empty_catalog_is_empty_layout() {
        let layout = layout_palette(&Catalog::new(), &query(300.0), &PaletteConfig::default(), &shapes());
        assert!(layout.items.is_empty());
        assert_eq!(layout.height, 0.0);
    }

    #[test]
    fn palette_toggle_and_filter_relayout() {
        let mut palette = Palette::new(300.0, PaletteConfig::default(), Arc::new(shapes()));
        palette.set_catalog(sources_catalog());
        assert_eq!(palette.layout().items.len(), 3);

        palette.toggle_group("sources");
        assert!(palette.is_collapsed("sources"));
        assert_eq!(palette.layout().items.len(), 1);

        palette.toggle_group("sources");
        let expanded = palette.layout().clone();
        assert_eq!(expanded.items.len(), 3);

        let first = palette.set_filter("file").clone();
        let second = palette.set_filter("file").clone();
        assert_eq!(first, second);

        let hit = first.entry_at(Point::new(60.0, 60.0)).map(|m| m.name.clone());
        assert_eq!(hit.as_deref(), Some("file"));
        assert_eq!(first.header_at(Point::new(5.0, 5.0)), Some("sources"));
    }
}
