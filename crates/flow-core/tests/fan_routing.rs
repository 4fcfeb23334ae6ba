//! Integration tests: graph edits → fan routing.

use flow_core::fan::{FanRouter, fan_offset};
use flow_core::{CellId, Endpoint, FlowGraph, FlowNode, Link, Point, Size};

fn node(g: &mut FlowGraph, name: &str, x: f64, y: f64) -> CellId {
    let id = CellId::intern(name);
    g.add_node(id, FlowNode::new(None, Point::new(x, y), Size::new(100.0, 40.0)))
        .unwrap();
    id
}

fn link(g: &mut FlowGraph, name: &str, from: CellId, to: CellId) -> CellId {
    let id = CellId::intern(name);
    g.add_link(id, Link::new(Endpoint::port(from, "output"), Endpoint::port(to, "input")))
        .unwrap();
    id
}

fn distance_from_baseline(vertex: Point, a: Point, b: Point) -> f64 {
    // Signed perpendicular distance from the line a → b.
    let d = b - a;
    let v = vertex - a;
    (d.x * v.y - d.y * v.x) / d.hypot()
}

#[test]
fn offsets_follow_sibling_order_for_any_count() {
    for k in 2..8 {
        let mut g = FlowGraph::new();
        let a = node(&mut g, &format!("it_a{k}"), 0.0, 0.0);
        let b = node(&mut g, &format!("it_b{k}"), 200.0, 150.0);
        let ids: Vec<CellId> = (0..k)
            .map(|i| link(&mut g, &format!("it_l{k}_{i}"), a, b))
            .collect();

        FanRouter::default().route_cell(&mut g, ids[0]);

        let ca = g.node(a).unwrap().bbox().center();
        let cb = g.node(b).unwrap().bbox().center();
        for (i, id) in ids.iter().enumerate() {
            let l = g.link(*id).unwrap();
            assert!(l.fan_routed);
            assert_eq!(l.vertices.len(), 1);
            let (distance, _) = fan_offset(20.0, i);
            let got = distance_from_baseline(l.vertices[0], ca, cb).abs();
            assert!(
                (got - distance).abs() < 1e-9,
                "k={k} i={i}: expected offset {distance}, got {got}"
            );
        }
    }
}

#[test]
fn odd_and_even_siblings_sit_on_opposite_sides() {
    let mut g = FlowGraph::new();
    let a = node(&mut g, "side_a", 0.0, 0.0);
    let b = node(&mut g, "side_b", 0.0, 300.0);
    let ids: Vec<CellId> = (0..3).map(|i| link(&mut g, &format!("side_l{i}"), a, b)).collect();
    FanRouter::default().route_cell(&mut g, ids[0]);

    let ca = g.node(a).unwrap().bbox().center();
    let cb = g.node(b).unwrap().bbox().center();
    let side = |i: usize| distance_from_baseline(g.link(ids[i]).unwrap().vertices[0], ca, cb);
    assert!(side(1) * side(2) < 0.0);
}

#[test]
fn reverse_direction_links_are_siblings() {
    let mut g = FlowGraph::new();
    let a = node(&mut g, "rev_a", 0.0, 0.0);
    let b = node(&mut g, "rev_b", 300.0, 0.0);
    let forward = link(&mut g, "rev_fwd", a, b);
    let back = link(&mut g, "rev_back", b, a);

    let routed = FanRouter::default().route_cell(&mut g, back);
    assert_eq!(routed, vec![forward, back]);
}

#[test]
fn other_pairs_are_untouched() {
    let mut g = FlowGraph::new();
    let a = node(&mut g, "pair_a", 0.0, 0.0);
    let b = node(&mut g, "pair_b", 300.0, 0.0);
    let c = node(&mut g, "pair_c", 0.0, 300.0);
    let ab1 = link(&mut g, "pair_ab1", a, b);
    let _ab2 = link(&mut g, "pair_ab2", a, b);
    let ac = link(&mut g, "pair_ac", a, c);

    // Moving `a` routes both of its groups; the lone a–c link stays straight.
    let routed = FanRouter::default().route_cell(&mut g, a);
    assert!(routed.contains(&ab1));
    assert!(!routed.contains(&ac));
    assert!(g.link(ac).unwrap().vertices.is_empty());
}

#[test]
fn route_all_after_rebuild() {
    let mut g = FlowGraph::new();
    let a = node(&mut g, "all_a", 0.0, 0.0);
    let b = node(&mut g, "all_b", 300.0, 0.0);
    let c = node(&mut g, "all_c", 0.0, 300.0);
    link(&mut g, "all_ab1", a, b);
    link(&mut g, "all_ab2", a, b);
    link(&mut g, "all_bc1", b, c);
    link(&mut g, "all_bc2", c, b);

    let routed = FanRouter::default().route_all(&mut g);
    assert_eq!(routed.len(), 4);
    assert!(g.links().all(|(_, l)| l.fan_routed));
}

#[test]
fn removing_down_to_one_restores_straight_line() {
    let mut g = FlowGraph::new();
    let a = node(&mut g, "down_a", 0.0, 0.0);
    let b = node(&mut g, "down_b", 300.0, 0.0);
    let ids: Vec<CellId> = (0..3).map(|i| link(&mut g, &format!("down_l{i}"), a, b)).collect();
    let router = FanRouter::default();
    router.route_cell(&mut g, ids[0]);

    g.remove(ids[0]);
    router.route_pair(&mut g, a, b);
    assert!(g.link(ids[1]).unwrap().fan_routed);

    g.remove(ids[2]);
    router.route_pair(&mut g, a, b);
    let last = g.link(ids[1]).unwrap();
    assert!(last.vertices.is_empty());
    assert!(!last.fan_routed);
}
