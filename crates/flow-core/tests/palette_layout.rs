//! Integration tests: catalog JSON → palette layout.
//!
//! Exercises catalog parsing, filtering, collapse state and the row-packing
//! arithmetic together. Default shapes are 120 × 40, so with the default
//! 12 px padding every cell is 144 × 64.

use flow_core::palette::{Palette, PaletteItemKind, PaletteLayout};
use flow_core::{Catalog, DefaultShapes, PaletteConfig, Point, Rect};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const WIDTH: f64 = 320.0;

fn palette() -> Palette {
    let catalog = Catalog::from_json(include_str!("fixtures/catalog.json")).unwrap();
    let mut palette = Palette::new(WIDTH, PaletteConfig::default(), Arc::new(DefaultShapes::default()));
    palette.set_catalog(catalog);
    palette
}

fn headers(layout: &PaletteLayout) -> Vec<(String, f64)> {
    layout
        .items
        .iter()
        .filter_map(|item| match &item.kind {
            PaletteItemKind::Header { group, .. } => Some((group.clone(), item.bounds.y0)),
            _ => None,
        })
        .collect()
}

fn entry_origin(layout: &PaletteLayout, name: &str) -> Point {
    layout
        .entries()
        .find(|(m, _)| m.name == name)
        .map(|(_, r)| r.origin())
        .unwrap_or_else(|| panic!("entry {name} not laid out"))
}

// ─── Full catalog ───────────────────────────────────────────────────────

#[test]
fn full_catalog_layout() {
    let palette = palette();
    let layout = palette.layout();

    // Two cells per row: start_x = (320 - 288) / 2 = 16.
    assert_eq!(
        headers(layout),
        vec![
            ("sources".to_string(), 0.0),
            ("processors".to_string(), 163.0),
            ("sinks".to_string(), 262.0),
        ]
    );
    assert_eq!(entry_origin(layout, "file"), Point::new(28.0, 47.0));
    assert_eq!(entry_origin(layout, "http"), Point::new(172.0, 47.0));
    assert_eq!(entry_origin(layout, "time"), Point::new(28.0, 111.0));
    assert_eq!(entry_origin(layout, "filter"), Point::new(28.0, 210.0));
    assert_eq!(entry_origin(layout, "transform"), Point::new(172.0, 210.0));
    assert_eq!(entry_origin(layout, "hdfs"), Point::new(28.0, 309.0));
    assert_eq!(entry_origin(layout, "log"), Point::new(172.0, 309.0));
    assert_eq!(layout.height, 361.0);
}

#[test]
fn headers_span_the_container() {
    let palette = palette();
    for item in &palette.layout().items {
        if let PaletteItemKind::Header { .. } = item.kind {
            assert_eq!(item.bounds.x0, 0.0);
            assert_eq!(item.bounds.width(), WIDTH);
        }
    }
}

#[test]
fn hidden_group_has_no_header() {
    let palette = palette();
    assert!(!headers(palette.layout()).iter().any(|(g, _)| g == "links"));
}

// ─── Filtering ──────────────────────────────────────────────────────────

#[test]
fn filter_narrows_and_repacks() {
    let mut palette = palette();
    let layout = palette.set_filter("T").clone();

    let names: Vec<&str> = layout.entries().map(|(m, _)| m.name.as_str()).collect();
    assert_eq!(names, vec!["http", "time", "filter", "transform"]);
    assert_eq!(
        headers(&layout),
        vec![("sources".to_string(), 0.0), ("processors".to_string(), 99.0)]
    );
    assert_eq!(entry_origin(&layout, "time"), Point::new(172.0, 47.0));
    assert_eq!(layout.height, 198.0);
}

#[test]
fn same_filter_twice_is_identical() {
    let mut palette = palette();
    let first = palette.set_filter("s").clone();
    let second = palette.set_filter("s").clone();
    assert_eq!(first, second);
}

#[test]
fn filter_without_matches_shows_placeholder_only() {
    let mut palette = palette();
    let layout = palette.set_filter("kafka");
    assert_eq!(layout.items.len(), 1);
    assert_eq!(layout.items[0].kind, PaletteItemKind::NoMatches);
    assert_eq!(layout.items[0].bounds, Rect::new(0.0, 0.0, WIDTH, 30.0));
}

#[test]
fn clearing_filter_restores_full_layout() {
    let mut palette = palette();
    let full = palette.layout().clone();
    palette.set_filter("log");
    assert_eq!(palette.set_filter("").clone(), full);
}

// ─── Collapse ───────────────────────────────────────────────────────────

#[test]
fn collapsing_a_group_pulls_later_groups_up() {
    let mut palette = palette();
    let layout = palette.toggle_group("processors").clone();

    assert_eq!(
        headers(&layout),
        vec![
            ("sources".to_string(), 0.0),
            ("processors".to_string(), 163.0),
            ("sinks".to_string(), 198.0),
        ]
    );
    assert!(layout.entries().all(|(m, _)| m.group != "processors"));
}

#[test]
fn collapse_survives_catalog_reload() {
    let mut palette = palette();
    palette.toggle_group("sinks");
    let catalog = palette.catalog().clone();
    let layout = palette.set_catalog(catalog);
    assert!(layout.entries().all(|(m, _)| m.group != "sinks"));
}

// ─── Resize ─────────────────────────────────────────────────────────────

#[test]
fn narrow_container_stacks_entries() {
    let mut palette = palette();
    let layout = palette.set_width(150.0).clone();
    // One cell per row: start_x = (150 - 144) / 2 = 3.
    assert_eq!(entry_origin(&layout, "file"), Point::new(15.0, 47.0));
    assert_eq!(entry_origin(&layout, "http"), Point::new(15.0, 111.0));
    assert_eq!(entry_origin(&layout, "time"), Point::new(15.0, 175.0));
}
