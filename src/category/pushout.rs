//! Pushouts: gluing two graphs along a common source.

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::debug;

use super::{PushoutSquare, UnionFind};
use crate::homomorphism::{check_homomorphism, compose, IgnoreAttrs, Mapping};
use crate::model::{Attrs, Graph, NodeId};
use crate::{Error, Result};

/// Pushout of total maps `f: A → B` and `g: A → C`.
pub fn pushout(a: &Graph, b: &Graph, c: &Graph, f: &Mapping, g: &Mapping) -> Result<PushoutSquare> {
    pushout_with(a, b, c, f, g, &IgnoreAttrs::none())
}

/// Pushout with an attribute policy applied to the validation of `f`, `g`.
///
/// Nodes of `B` and `C` are grouped into classes: the two images of every
/// `A` node share a class, transitively. Each class becomes one node of
/// `D` carrying the union of its members' attributes. Naming order:
/// classes with a single `B` member keep that name, classes with several
/// `B` members take the sorted `_`-join, classes without `B` members
/// (untouched `C` nodes) take a fresh id based on the `C` name.
pub(crate) fn pushout_with(
    a: &Graph,
    b: &Graph,
    c: &Graph,
    f: &Mapping,
    g: &Mapping,
    ignore: &IgnoreAttrs,
) -> Result<PushoutSquare> {
    check_homomorphism(a, b, f, ignore, true)?;
    check_homomorphism(a, c, g, ignore, true)?;

    let b_ids: Vec<&NodeId> = b.nodes().collect();
    let c_ids: Vec<&NodeId> = c.nodes().collect();
    let nb = b_ids.len();
    let b_index: HashMap<&NodeId, usize> = b_ids.iter().enumerate().map(|(i, n)| (*n, i)).collect();
    let c_index: HashMap<&NodeId, usize> =
        c_ids.iter().enumerate().map(|(i, n)| (*n, nb + i)).collect();

    let mut uf = UnionFind::new(nb + c_ids.len());
    for n in a.nodes() {
        uf.union(b_index[&f[n]], c_index[&g[n]]);
    }

    // root → (B members, C members), both in sorted id order
    let mut classes: HashMap<usize, (SmallVec<[usize; 4]>, SmallVec<[usize; 4]>)> = HashMap::new();
    for i in 0..nb + c_ids.len() {
        let root = uf.find(i);
        let entry = classes.entry(root).or_default();
        if i < nb { entry.0.push(i) } else { entry.1.push(i) }
    }

    let mut d = b.empty_like();
    let mut names: HashMap<usize, NodeId> = HashMap::new();
    let mut merged: Vec<(usize, &SmallVec<[usize; 4]>)> = Vec::new();
    let mut loose_c: Vec<usize> = Vec::new();

    for (i, name) in b_ids.iter().enumerate() {
        let root = uf.find(i);
        let members = &classes[&root].0;
        if members.len() == 1 {
            d.add_node((*name).clone(), Attrs::new())?;
            names.insert(root, (*name).clone());
        } else if members[0] == i {
            merged.push((root, members));
        }
    }
    for (root, members) in merged {
        let joined = members.iter().map(|&i| b_ids[i].as_str()).collect::<Vec<_>>().join("_");
        let name = d.fresh_id(&joined);
        d.add_node(name.clone(), Attrs::new())?;
        names.insert(root, name);
    }
    for i in nb..nb + c_ids.len() {
        let root = uf.find(i);
        if classes[&root].0.is_empty() {
            loose_c.push(i);
        }
    }
    for i in loose_c {
        let name = d.fresh_id(c_ids[i - nb].as_str());
        d.add_node(name.clone(), Attrs::new())?;
        names.insert(uf.find(i), name);
    }

    let mut b_d = Mapping::new();
    let mut c_d = Mapping::new();
    for (i, n) in b_ids.iter().enumerate() {
        let target = names[&uf.find(i)].clone();
        d.add_node_attrs(&target, b.node(n)?)?;
        b_d.insert((*n).clone(), target);
    }
    for (j, n) in c_ids.iter().enumerate() {
        let target = names[&uf.find(nb + j)].clone();
        d.add_node_attrs(&target, c.node(n)?)?;
        c_d.insert((*n).clone(), target);
    }

    for (side, map) in [(b, &b_d), (c, &c_d)] {
        for (s, t, attrs) in side.edges() {
            let (ds, dt) = (&map[s], &map[t]);
            if d.has_edge(ds, dt) {
                d.add_edge_attrs(ds, dt, attrs)?;
            } else {
                d.add_edge(ds, dt, attrs.clone())?;
            }
        }
    }

    check_homomorphism(b, &d, &b_d, &IgnoreAttrs::none(), true)?;
    check_homomorphism(c, &d, &c_d, &IgnoreAttrs::none(), true)?;
    if compose(f, &b_d) != compose(g, &c_d) {
        return Err(Error::InvalidHomomorphism {
            domain: None,
            codomain: None,
            reason: "pushout square does not commute".into(),
        });
    }
    debug!(nodes = d.node_count(), edges = d.edge_count(), "pushout");
    Ok(PushoutSquare { d, b_d, c_d })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttributeSet;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn map(pairs: &[(&str, &str)]) -> Mapping {
        pairs.iter().map(|(a, b)| (id(a), id(b))).collect()
    }

    #[test]
    fn test_pushout_glues_shared_part() {
        let mut a = Graph::new(true);
        a.add_nodes_from(["s"]).unwrap();
        let mut b = Graph::new(true);
        b.add_node("x", Attrs::new().with("k", "b")).unwrap();
        b.add_nodes_from(["y"]).unwrap();
        b.add_edges_from([("x", "y")]).unwrap();
        let mut c = Graph::new(true);
        c.add_node("u", Attrs::new().with("k", "c")).unwrap();
        c.add_nodes_from(["y"]).unwrap();
        c.add_edges_from([("y", "u")]).unwrap();

        let po = pushout(&a, &b, &c, &map(&[("s", "x")]), &map(&[("s", "u")])).unwrap();
        assert_eq!(po.d.node_count(), 3);
        assert_eq!(po.b_d, map(&[("x", "x"), ("y", "y")]));
        // C's y collides with B's y and gets a fresh id
        assert_eq!(po.c_d, map(&[("u", "x"), ("y", "y_1")]));
        assert!(po.d.has_edge(&id("y_1"), &id("x")));
        assert_eq!(
            po.d.node(&id("x")).unwrap().get("k"),
            Some(&AttributeSet::finite(["b", "c"]))
        );
    }

    #[test]
    fn test_pushout_merges_through_c() {
        // two A nodes with distinct B images but one C image: merge in D
        let mut a = Graph::new(true);
        a.add_nodes_from(["1", "2"]).unwrap();
        let mut b = Graph::new(true);
        b.add_nodes_from(["p", "q", "r"]).unwrap();
        b.add_edges_from([("p", "r"), ("q", "r")]).unwrap();
        let mut c = Graph::new(true);
        c.add_nodes_from(["m"]).unwrap();

        let po = pushout(&a, &b, &c, &map(&[("1", "p"), ("2", "q")]), &map(&[("1", "m"), ("2", "m")]))
            .unwrap();
        assert_eq!(po.d.node_count(), 2);
        assert_eq!(po.b_d[&id("p")], id("p_q"));
        assert_eq!(po.b_d[&id("q")], id("p_q"));
        assert_eq!(po.c_d[&id("m")], id("p_q"));
        assert_eq!(po.d.edge_count(), 1);
    }

    #[test]
    fn test_pushout_rejects_partial_maps() {
        let mut a = Graph::new(true);
        a.add_nodes_from(["1", "2"]).unwrap();
        let b = a.clone();
        let err = pushout(&a, &b, &b, &map(&[("1", "1")]), &map(&[("1", "1"), ("2", "2")]));
        assert!(matches!(err, Err(Error::InvalidHomomorphism { .. })));
    }
}
