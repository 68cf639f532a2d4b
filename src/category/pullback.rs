//! Pullbacks: total, partial (wildcard typing) and n-ary.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::{complement_with, pushout_with, Cospan, NaryPullback, PullbackSquare};
use crate::homomorphism::{check_homomorphism, compose, is_total, preimages, IgnoreAttrs, Mapping};
use crate::model::{Graph, GraphId, NodeId};
use crate::{Error, Result};

/// Pullback of `f: B → D` and `g: C → D`.
///
/// Dispatches to [`total_pullback`] when both maps are total and to
/// [`partial_pullback`] otherwise.
pub fn pullback(
    b: &Graph,
    c: &Graph,
    d: &Graph,
    f: &Mapping,
    g: &Mapping,
    ignore_bd: &IgnoreAttrs,
    ignore_cd: &IgnoreAttrs,
) -> Result<PullbackSquare> {
    if is_total(f, b) && is_total(g, c) {
        total_pullback(b, c, d, f, g, ignore_bd, ignore_cd)
    } else {
        partial_pullback(b, c, d, f, g, ignore_bd, ignore_cd)
    }
}

/// Fiber product of two total maps.
///
/// One `A` node per pair `(n1, n2)` with `f(n1) = g(n2)`, named after `n1`
/// (suffixed when `n1` has several partners). Node attributes are the
/// intersection, or one side's / the union when the other side's map
/// exempts the node. An edge exists iff both projections hit an edge and
/// always carries the intersection of the two edges' attributes.
pub fn total_pullback(
    b: &Graph,
    c: &Graph,
    d: &Graph,
    f: &Mapping,
    g: &Mapping,
    ignore_bd: &IgnoreAttrs,
    ignore_cd: &IgnoreAttrs,
) -> Result<PullbackSquare> {
    check_homomorphism(b, d, f, ignore_bd, true)?;
    check_homomorphism(c, d, g, ignore_cd, true)?;

    let over = preimages(g);
    let mut a = b.empty_like();
    let mut a_b = Mapping::new();
    let mut a_c = Mapping::new();
    let mut exempt_ab: BTreeSet<NodeId> = BTreeSet::new();
    let mut exempt_ac: BTreeSet<NodeId> = BTreeSet::new();

    for (n1, attrs1) in b.node_entries() {
        let Some(partners) = f.get(n1).and_then(|t| over.get(t)) else {
            continue;
        };
        for n2 in partners {
            let attrs2 = c.node(n2)?;
            let ignore1 = ignore_bd.ignores_node(n1);
            let ignore2 = ignore_cd.ignores_node(n2);
            let attrs = match (ignore1, ignore2) {
                (true, true) => attrs1.union(attrs2),
                (true, false) => attrs1.clone(),
                (false, true) => attrs2.clone(),
                (false, false) => attrs1.intersection(attrs2),
            };
            let name = a.fresh_id(n1.as_str());
            a.add_node(name.clone(), attrs)?;
            if ignore1 {
                exempt_ac.insert(name.clone());
            }
            if ignore2 {
                exempt_ab.insert(name.clone());
            }
            a_b.insert(name.clone(), n1.clone());
            a_c.insert(name, n2.clone());
        }
    }

    let a_nodes: Vec<NodeId> = a.nodes().cloned().collect();
    for s in &a_nodes {
        for t in &a_nodes {
            if !a.is_directed() && s > t {
                continue;
            }
            let (Some(eb), Some(ec)) = (
                b.edge_attrs(&a_b[s], &a_b[t]),
                c.edge_attrs(&a_c[s], &a_c[t]),
            ) else {
                continue;
            };
            a.add_edge(s, t, eb.intersection(ec))?;
        }
    }

    check_homomorphism(&a, b, &a_b, &IgnoreAttrs::Nodes(exempt_ab), true)?;
    check_homomorphism(&a, c, &a_c, &IgnoreAttrs::Nodes(exempt_ac), true)?;
    debug!(nodes = a.node_count(), edges = a.edge_count(), "total pullback");
    Ok(PullbackSquare { a, a_b, a_c })
}

/// Pullback of partial maps. Elements outside the domain of `f` (or `g`)
/// are treated as compatible with everything on the other side: they are
/// reintroduced by complementing the typed part inside `B` and `C` and
/// gluing the two complements along the total pullback.
///
/// The projection into `B` is undefined on `C`'s untyped remainder, and
/// symmetrically.
pub fn partial_pullback(
    b: &Graph,
    c: &Graph,
    d: &Graph,
    f: &Mapping,
    g: &Mapping,
    ignore_bd: &IgnoreAttrs,
    ignore_cd: &IgnoreAttrs,
) -> Result<PullbackSquare> {
    check_homomorphism(b, d, f, ignore_bd, false)?;
    check_homomorphism(c, d, g, ignore_cd, false)?;

    let b_dom = b.subgraph(&f.keys().cloned().collect::<Vec<_>>());
    let c_dom = c.subgraph(&g.keys().cloned().collect::<Vec<_>>());
    let b_incl: Mapping = b_dom.nodes().map(|n| (n.clone(), n.clone())).collect();
    let c_incl: Mapping = c_dom.nodes().map(|n| (n.clone(), n.clone())).collect();

    let core = total_pullback(&b_dom, &c_dom, d, f, g, ignore_bd, ignore_cd)?;
    // The core may carry one side's attributes only, so the gluing steps
    // check structure and leave attribute containment to the final maps.
    let relaxed = if ignore_bd.is_none() && ignore_cd.is_none() {
        IgnoreAttrs::none()
    } else {
        IgnoreAttrs::all()
    };
    let b2 = complement_with(&core.a, &b_dom, b, &core.a_b, &b_incl, &relaxed)?;
    let c2 = complement_with(&core.a, &c_dom, c, &core.a_c, &c_incl, &relaxed)?;
    let glued = pushout_with(&core.a, &b2.c, &c2.c, &b2.a_c, &c2.a_c, &relaxed)?;

    let a_b: Mapping = glued
        .b_d
        .iter()
        .filter_map(|(k, v)| b2.c_d.get(k).map(|orig| (v.clone(), orig.clone())))
        .collect();
    let a_c: Mapping = glued
        .c_d
        .iter()
        .filter_map(|(k, v)| c2.c_d.get(k).map(|orig| (v.clone(), orig.clone())))
        .collect();

    debug!(
        nodes = glued.d.node_count(),
        typed = core.a.node_count(),
        "partial pullback"
    );
    Ok(PullbackSquare { a: glued.d, a_b, a_c })
}

/// Pullback of one graph `B` against several cospans at once.
///
/// Each cospan is pulled back individually, then the results are
/// intersected pairwise over `B`.
pub fn nary_pullback(b: &Graph, cospans: &BTreeMap<GraphId, Cospan<'_>>) -> Result<NaryPullback> {
    let mut legs = Vec::with_capacity(cospans.len());
    for (name, leg) in cospans {
        let pb = pullback(b, leg.c, leg.d, leg.b_d, leg.c_d, &IgnoreAttrs::none(), &IgnoreAttrs::none())?;
        legs.push((name.clone(), pb));
    }
    let mut legs = legs.into_iter();
    let Some((first_name, first)) = legs.next() else {
        return Err(Error::Graph("n-ary pullback needs at least one cospan".into()));
    };

    let mut a = first.a;
    let mut a_b = first.a_b;
    let mut a_c: BTreeMap<GraphId, Mapping> = BTreeMap::new();
    a_c.insert(first_name, first.a_c);

    for (name, next) in legs {
        let step = pullback(
            &a,
            &next.a,
            b,
            &a_b,
            &next.a_b,
            &IgnoreAttrs::none(),
            &IgnoreAttrs::none(),
        )?;
        a_b = compose(&step.a_b, &a_b);
        for leg in a_c.values_mut() {
            *leg = compose(&step.a_b, leg);
        }
        a_c.insert(name, compose(&step.a_c, &next.a_c));
        a = step.a;
    }

    check_homomorphism(&a, b, &a_b, &IgnoreAttrs::none(), false)?;
    for (name, leg) in &a_c {
        if let Some(cospan) = cospans.get(name) {
            check_homomorphism(&a, cospan.c, leg, &IgnoreAttrs::none(), false)?;
        }
    }
    Ok(NaryPullback { a, a_b, a_c })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttributeSet, Attrs};
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn map(pairs: &[(&str, &str)]) -> Mapping {
        pairs.iter().map(|(a, b)| (id(a), id(b))).collect()
    }

    /// D = {person -> company}; B and C both typed into D.
    fn cospan() -> (Graph, Graph, Graph, Mapping, Mapping) {
        let mut d = Graph::new(true);
        d.add_nodes_from(["person", "company"]).unwrap();
        d.add_edges_from([("person", "company")]).unwrap();

        let mut b = Graph::new(true);
        b.add_node("alice", Attrs::new().with("age", AttributeSet::integers([(20, 40)]))).unwrap();
        b.add_node("acme", Attrs::new()).unwrap();
        b.add_edges_from([("alice", "acme")]).unwrap();

        let mut c = Graph::new(true);
        c.add_node("p1", Attrs::new().with("age", AttributeSet::integers([(30, 50)]))).unwrap();
        c.add_node("p2", Attrs::new()).unwrap();
        c.add_node("co", Attrs::new()).unwrap();
        c.add_edges_from([("p1", "co")]).unwrap();

        let f = map(&[("alice", "person"), ("acme", "company")]);
        let g = map(&[("p1", "person"), ("p2", "person"), ("co", "company")]);
        (b, c, d, f, g)
    }

    #[test]
    fn test_total_pullback_pairs_and_edges() {
        let (b, c, d, f, g) = cospan();
        let pb = total_pullback(&b, &c, &d, &f, &g, &IgnoreAttrs::none(), &IgnoreAttrs::none())
            .unwrap();
        assert_eq!(pb.a.node_count(), 3);
        assert_eq!(pb.a_b, map(&[("acme", "acme"), ("alice", "alice"), ("alice_1", "alice")]));
        assert_eq!(pb.a_c, map(&[("acme", "co"), ("alice", "p1"), ("alice_1", "p2")]));
        assert!(pb.a.has_edge(&id("alice"), &id("acme")));
        assert!(!pb.a.has_edge(&id("alice_1"), &id("acme")));
        assert_eq!(
            pb.a.node(&id("alice")).unwrap().get("age"),
            Some(&AttributeSet::integers([(30, 40)]))
        );
    }

    #[test]
    fn test_total_pullback_keeps_ignored_side_attrs() {
        let (b, c, d, f, g) = cospan();
        let pb = total_pullback(&b, &c, &d, &f, &g, &IgnoreAttrs::all(), &IgnoreAttrs::none())
            .unwrap();
        assert_eq!(
            pb.a.node(&id("alice")).unwrap().get("age"),
            Some(&AttributeSet::integers([(20, 40)]))
        );
    }

    #[test]
    fn test_total_pullback_intersects_edge_attrs_under_any_policy() {
        let weights = |values: &[i64]| Attrs::new().with("w", AttributeSet::finite(values.iter().copied()));
        let looped = |node: &str, attrs: Attrs| {
            let mut g = Graph::new(true);
            g.add_nodes_from([node]).unwrap();
            g.add_edge(&id(node), &id(node), attrs).unwrap();
            g
        };
        let d = looped("t", weights(&[1, 2]));
        let b = looped("x", weights(&[1, 2]));
        let c = looped("y", weights(&[2]));
        let (f, g) = (map(&[("x", "t")]), map(&[("y", "t")]));
        for (ignore_bd, ignore_cd) in [
            (IgnoreAttrs::none(), IgnoreAttrs::none()),
            (IgnoreAttrs::all(), IgnoreAttrs::none()),
            (IgnoreAttrs::none(), IgnoreAttrs::all()),
            (IgnoreAttrs::all(), IgnoreAttrs::all()),
        ] {
            let pb = total_pullback(&b, &c, &d, &f, &g, &ignore_bd, &ignore_cd).unwrap();
            assert_eq!(pb.a.edge(&id("x"), &id("x")).unwrap(), &weights(&[2]));
        }
    }

    #[test]
    fn test_total_pullback_rejects_partial_input() {
        let (b, c, d, mut f, g) = cospan();
        f.remove(&id("acme"));
        assert!(total_pullback(&b, &c, &d, &f, &g, &IgnoreAttrs::none(), &IgnoreAttrs::none()).is_err());
    }

    #[test]
    fn test_partial_pullback_keeps_untyped_elements() {
        let (mut b, c, d, f, g) = cospan();
        b.add_node("loose", Attrs::new()).unwrap();
        b.add_edges_from([("alice", "loose")]).unwrap();
        let pb = pullback(&b, &c, &d, &f, &g, &IgnoreAttrs::none(), &IgnoreAttrs::none()).unwrap();
        // three typed pairs plus the untyped node
        assert_eq!(pb.a.node_count(), 4);
        let loose: Vec<&NodeId> = pb.a_b.iter().filter(|(_, v)| **v == id("loose")).map(|(k, _)| k).collect();
        assert_eq!(loose.len(), 1);
        assert!(!pb.a_c.contains_key(loose[0]));
        // the untyped edge is replicated onto both alice copies
        let alices: Vec<&NodeId> = pb.a_b.iter().filter(|(_, v)| **v == id("alice")).map(|(k, _)| k).collect();
        for a in alices {
            assert!(pb.a.has_edge(a, loose[0]));
        }
        check_homomorphism(&pb.a, &b, &pb.a_b, &IgnoreAttrs::none(), false).unwrap();
        check_homomorphism(&pb.a, &c, &pb.a_c, &IgnoreAttrs::none(), false).unwrap();
    }

    #[test]
    fn test_nary_pullback_intersects_legs() {
        let mut d = Graph::new(true);
        d.add_nodes_from(["t"]).unwrap();
        let mut b = Graph::new(true);
        b.add_nodes_from(["x"]).unwrap();
        let mut c1 = Graph::new(true);
        c1.add_nodes_from(["u1", "u2"]).unwrap();
        let mut c2 = Graph::new(true);
        c2.add_nodes_from(["v"]).unwrap();
        let b_d = map(&[("x", "t")]);
        let c1_d = map(&[("u1", "t"), ("u2", "t")]);
        let c2_d = map(&[("v", "t")]);

        let mut legs = BTreeMap::new();
        legs.insert(GraphId::from("c1"), Cospan { c: &c1, d: &d, b_d: &b_d, c_d: &c1_d });
        legs.insert(GraphId::from("c2"), Cospan { c: &c2, d: &d, b_d: &b_d, c_d: &c2_d });
        let res = nary_pullback(&b, &legs).unwrap();
        assert_eq!(res.a.node_count(), 2);
        assert_eq!(res.a_c.len(), 2);
        for n in res.a.nodes() {
            assert_eq!(res.a_b[n], id("x"));
            assert_eq!(res.a_c[&GraphId::from("c2")][n], id("v"));
        }
    }
}
