//! End-to-end tests for the category operations and rule application.
//!
//! Algebraic properties are checked on random small graphs with proptest;
//! the scenarios check concrete naming and attribute behaviour.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use regraph_rs::homomorphism::{compose, identity};
use regraph_rs::{
    are_isomorphic, check_homomorphism, pullback, pushout, pullback_complement, AttributeSet, Attrs,
    Graph, IgnoreAttrs, Mapping, NodeId, Rule,
};

// ============================================================================
// Helpers
// ============================================================================

fn id(s: &str) -> NodeId {
    NodeId::from(s)
}

fn map(pairs: &[(&str, &str)]) -> Mapping {
    pairs.iter().map(|(a, b)| (id(a), id(b))).collect()
}

fn named(prefix: &str, i: usize) -> NodeId {
    NodeId::from(format!("{prefix}{i}"))
}

/// `{k: {i | bit i of mask}}` over the values 0, 1, 2; empty masks give
/// no attributes.
fn weights(mask: u8) -> Attrs {
    let values: Vec<i64> = (0..3).filter(|i| mask & (1 << i) != 0).collect();
    if values.is_empty() {
        Attrs::new()
    } else {
        Attrs::new().with("k", AttributeSet::finite(values))
    }
}

/// Random directed graph on `n0 .. n{k-1}` with random `k` attributes.
fn arb_graph(max_nodes: usize) -> impl Strategy<Value = Graph> {
    (1..=max_nodes).prop_flat_map(|n| {
        (prop::collection::vec(0u8..8, n), prop::collection::vec((0..n, 0..n, 0u8..8), 0..=2 * n)).prop_map(
            move |(node_masks, edges)| {
                let mut g = Graph::new(true);
                for (i, &mask) in node_masks.iter().enumerate() {
                    g.add_node(named("n", i), weights(mask)).unwrap();
                }
                for (s, t, mask) in edges {
                    let (s, t) = (named("n", s), named("n", t));
                    if !g.has_edge(&s, &t) {
                        g.add_edge(&s, &t, weights(mask)).unwrap();
                    }
                }
                g
            },
        )
    })
}

/// Random graph with a total homomorphism into `d`; nodes are `{prefix}i`
/// and carry a random part of their image's attributes.
fn arb_over(d: Graph, prefix: &'static str) -> impl Strategy<Value = (Graph, Mapping)> {
    let targets: Vec<NodeId> = d.nodes().cloned().collect();
    let n = targets.len();
    (
        prop::collection::vec((0..n, 0u8..8), 1..5),
        prop::collection::vec((0usize..5, 0usize..5, 0u8..8), 0..10),
    )
        .prop_map(move |(assign, edges)| {
            let mut g = Graph::new(true);
            let mut f = Mapping::new();
            for (i, &(a, mask)) in assign.iter().enumerate() {
                let attrs = d.node(&targets[a]).unwrap().intersection(&weights(mask));
                g.add_node(named(prefix, i), attrs).unwrap();
                f.insert(named(prefix, i), targets[a].clone());
            }
            for (s, t, mask) in edges {
                if s >= assign.len() || t >= assign.len() {
                    continue;
                }
                let (s, t) = (named(prefix, s), named(prefix, t));
                if let Some(image) = d.edge_attrs(&f[&s], &f[&t]) {
                    if !g.has_edge(&s, &t) {
                        g.add_edge(&s, &t, image.intersection(&weights(mask))).unwrap();
                    }
                }
            }
            (g, f)
        })
}

fn arb_cospan() -> impl Strategy<Value = (Graph, (Graph, Mapping), (Graph, Mapping))> {
    arb_graph(4).prop_flat_map(|d| (Just(d.clone()), arb_over(d.clone(), "b"), arb_over(d, "c")))
}

/// A span `B ← A → C` where `C` is generated around the image of `A` and
/// carries at least the attributes of everything mapped onto it.
fn arb_span() -> impl Strategy<Value = (Graph, Graph, Graph, Mapping, Mapping)> {
    arb_graph(4)
        .prop_flat_map(|b| {
            (
                Just(b.clone()),
                arb_over(b, "a"),
                1usize..4,
                prop::collection::vec(0usize..4, 5),
                prop::collection::vec(0u8..8, 4),
            )
        })
        .prop_map(|(b, (a, f), m, assign, extra)| {
            let g: Mapping = a
                .nodes()
                .enumerate()
                .map(|(i, n)| (n.clone(), named("c", assign[i] % m)))
                .collect();
            let mut c = Graph::new(true);
            for i in 0..m {
                let attrs = a
                    .node_entries()
                    .filter(|(n, _)| g[*n] == named("c", i))
                    .fold(weights(extra[i]), |acc, (_, attrs)| acc.union(attrs));
                c.add_node(named("c", i), attrs).unwrap();
            }
            for (s, t, attrs) in a.edges() {
                let (gs, gt) = (&g[s], &g[t]);
                if c.has_edge(gs, gt) {
                    c.add_edge_attrs(gs, gt, attrs).unwrap();
                } else {
                    c.add_edge(gs, gt, attrs.clone()).unwrap();
                }
            }
            (a, b, c, f, g)
        })
}

/// Number of gluing classes the images of `A` form in `B ⊔ C`.
fn merge_classes(a: &Graph, f: &Mapping, g: &Mapping) -> usize {
    let mut class: BTreeMap<(bool, NodeId), usize> = BTreeMap::new();
    let mut next = 0;
    for n in a.nodes() {
        let left = (true, f[n].clone());
        let right = (false, g[n].clone());
        match (class.get(&left).copied(), class.get(&right).copied()) {
            (None, None) => {
                class.insert(left, next);
                class.insert(right, next);
                next += 1;
            }
            (Some(k), None) => {
                class.insert(right, k);
            }
            (None, Some(k)) => {
                class.insert(left, k);
            }
            (Some(k), Some(j)) if k != j => {
                for v in class.values_mut() {
                    if *v == j {
                        *v = k;
                    }
                }
            }
            _ => {}
        }
    }
    let distinct: std::collections::BTreeSet<usize> = class.values().copied().collect();
    distinct.len()
}

// ============================================================================
// 1. Pullback validity and attribute containment
// ============================================================================

proptest! {
    #[test]
    fn prop_pullback_commutes((d, (b, f), (c, g)) in arb_cospan()) {
        let pb = pullback(&b, &c, &d, &f, &g, &IgnoreAttrs::none(), &IgnoreAttrs::none()).unwrap();
        prop_assert!(check_homomorphism(&pb.a, &b, &pb.a_b, &IgnoreAttrs::none(), true).is_ok());
        prop_assert!(check_homomorphism(&pb.a, &c, &pb.a_c, &IgnoreAttrs::none(), true).is_ok());
        for n in pb.a.nodes() {
            prop_assert_eq!(&f[&pb.a_b[n]], &g[&pb.a_c[n]]);
        }
        let expected: usize = b
            .nodes()
            .map(|x| c.nodes().filter(|y| f[x] == g[*y]).count())
            .sum();
        prop_assert_eq!(pb.a.node_count(), expected);

        for (n, attrs) in pb.a.node_entries() {
            prop_assert!(attrs.is_subset_of(b.node(&pb.a_b[n]).unwrap()));
            prop_assert!(attrs.is_subset_of(c.node(&pb.a_c[n]).unwrap()));
        }
        for (s, t, attrs) in pb.a.edges() {
            prop_assert!(attrs.is_subset_of(b.edge(&pb.a_b[s], &pb.a_b[t]).unwrap()));
            prop_assert!(attrs.is_subset_of(c.edge(&pb.a_c[s], &pb.a_c[t]).unwrap()));
        }
    }
}

// ============================================================================
// 2. Pushout node count and attribute containment
// ============================================================================

proptest! {
    #[test]
    fn prop_pushout_node_count((a, b, c, f, g) in arb_span()) {
        let po = pushout(&a, &b, &c, &f, &g).unwrap();
        let b_image: std::collections::BTreeSet<&NodeId> = f.values().collect();
        let c_image: std::collections::BTreeSet<&NodeId> = g.values().collect();
        let expected = (b.node_count() - b_image.len())
            + (c.node_count() - c_image.len())
            + merge_classes(&a, &f, &g);
        prop_assert_eq!(po.d.node_count(), expected);
        prop_assert_eq!(compose(&f, &po.b_d), compose(&g, &po.c_d));

        for (side, to_d) in [(&b, &po.b_d), (&c, &po.c_d)] {
            for (n, attrs) in side.node_entries() {
                prop_assert!(attrs.is_subset_of(po.d.node(&to_d[n]).unwrap()));
            }
            for (s, t, attrs) in side.edges() {
                prop_assert!(attrs.is_subset_of(po.d.edge(&to_d[s], &to_d[t]).unwrap()));
            }
        }
    }
}

// ============================================================================
// 3. Identity law
// ============================================================================

proptest! {
    #[test]
    fn prop_identity_rule_preserves_graph(g in arb_graph(5), mask in prop::collection::vec(any::<bool>(), 5)) {
        let chosen: Vec<NodeId> = g
            .nodes()
            .enumerate()
            .filter(|(i, _)| mask[*i])
            .map(|(_, n)| n.clone())
            .collect();
        let pattern = g.subgraph(&chosen);
        let rule = Rule::identity(&pattern);
        let app = rule.apply_to(&g, &identity(&pattern)).unwrap();
        prop_assert!(are_isomorphic(&app.g_prime, &g));
    }
}

#[test]
fn test_identity_rule_on_whole_graph() {
    let mut g = Graph::new(true);
    g.add_node("a", Attrs::new().with("k", AttributeSet::finite(["x", "y"]))).unwrap();
    g.add_nodes_from(["b"]).unwrap();
    g.add_edge(&id("a"), &id("b"), Attrs::new().with("w", 1)).unwrap();
    let app = Rule::identity(&g).apply_to(&g, &identity(&g)).unwrap();
    assert_eq!(app.g_prime, g);
}

// ============================================================================
// 4. Round-trip law
// ============================================================================

#[test]
fn test_rule_then_inverse_round_trips() {
    let mut g = Graph::new(true);
    g.add_nodes_from(["u", "v", "w"]).unwrap();
    g.add_edges_from([("u", "v"), ("v", "w"), ("w", "u")]).unwrap();

    let mut pattern = Graph::new(true);
    pattern.add_nodes_from(["x", "y"]).unwrap();
    pattern.add_edges_from([("x", "y")]).unwrap();
    let mut rule = Rule::from_pattern(pattern);
    rule.inject_remove_edge(&id("x"), &id("y")).unwrap();
    rule.inject_add_node("z", Attrs::new()).unwrap();
    rule.inject_add_edge(&id("x"), &id("z"), Attrs::new()).unwrap();
    rule.inject_add_node_attrs(&id("y"), &Attrs::new().with("seen", true)).unwrap();

    let forward = rule.apply_to(&g, &map(&[("x", "u"), ("y", "v")])).unwrap();
    assert!(!forward.g_prime.has_edge(&id("u"), &id("v")));
    assert!(forward.g_prime.has_node("z"));

    let back = rule.inverted().apply_to(&forward.g_prime, &forward.rhs_g_prime).unwrap();
    assert!(are_isomorphic(&back.g_prime, &g));
}

// ============================================================================
// 5. Complement and pushout naming
// ============================================================================

#[test]
fn test_clone_then_merge_names() {
    let mut g = Graph::new(true);
    g.add_nodes_from(["x", "y"]).unwrap();
    g.add_edges_from([("x", "y")]).unwrap();

    let mut pattern = Graph::new(true);
    pattern.add_nodes_from(["n"]).unwrap();
    let mut rule = Rule::from_pattern(pattern);
    let (p_clone, r_clone) = rule.inject_clone_node(&id("n"), None).unwrap();
    assert_eq!(p_clone, id("n_1"));
    assert_eq!(r_clone, id("n_1"));

    let app = rule.apply_to(&g, &map(&[("n", "x")])).unwrap();
    assert_eq!(app.g_prime.node_count(), 3);
    assert_eq!(app.rhs_g_prime, map(&[("n", "x"), ("n_1", "x_1")]));
    assert!(app.g_prime.has_edge(&id("x_1"), &id("y")));

    let mut merge = Rule::from_pattern(g.subgraph(&[id("x"), id("y")]));
    let merged = merge.inject_merge_nodes(&[id("x"), id("y")], None).unwrap();
    let app = merge.apply_to(&g, &map(&[("x", "x"), ("y", "y")])).unwrap();
    assert_eq!(merged, id("x_y"));
    assert_eq!(app.g_prime.nodes().cloned().collect::<Vec<_>>(), vec![id("x_y")]);
    // the merged edge becomes a loop
    assert!(app.g_prime.has_edge(&id("x_y"), &id("x_y")));
}

#[test]
fn test_complement_keeps_unmatched_attrs() {
    let mut d = Graph::new(true);
    d.add_node("a", Attrs::new().with("tag", AttributeSet::finite(["keep", "drop"]))).unwrap();
    let mut b = Graph::new(true);
    b.add_node("1", Attrs::new().with("tag", "drop")).unwrap();
    let mut a = Graph::new(true);
    a.add_nodes_from(["1"]).unwrap();
    let cs = pullback_complement(&a, &b, &d, &map(&[("1", "1")]), &map(&[("1", "a")])).unwrap();
    assert_eq!(cs.c.node(&id("a")).unwrap(), &Attrs::new().with("tag", "keep"));
}

#[test]
fn test_undirected_rewrite() {
    let mut g = Graph::new(false);
    g.add_nodes_from(["p", "q"]).unwrap();
    g.add_edges_from([("q", "p")]).unwrap();
    let mut pattern = Graph::new(false);
    pattern.add_nodes_from(["a", "b"]).unwrap();
    pattern.add_edges_from([("a", "b")]).unwrap();
    let mut rule = Rule::from_pattern(pattern);
    rule.inject_remove_edge(&id("a"), &id("b")).unwrap();
    let app = rule.apply_to(&g, &map(&[("a", "p"), ("b", "q")])).unwrap();
    assert_eq!(app.g_prime.edge_count(), 0);
}
