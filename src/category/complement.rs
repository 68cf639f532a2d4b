//! Pullback complement: the deletion and cloning half of a DPO step.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::ComplementSquare;
use crate::homomorphism::{check_homomorphism, is_monic, preimages, IgnoreAttrs, Mapping};
use crate::model::{Graph, NodeId};
use crate::{Error, Result};

/// Complete `A --f--> B --g--> D` into a pullback square `A → C → D`.
///
/// `g` must be monic. Every `D` node outside the image of `g` is copied
/// unchanged; every `g(b)` is kept once per `A`-preimage of `b` (dropped
/// when there is none, cloned when there are several). Node attributes
/// become `(D − B) ∪ A`.
pub fn pullback_complement(
    a: &Graph,
    b: &Graph,
    d: &Graph,
    f: &Mapping,
    g: &Mapping,
) -> Result<ComplementSquare> {
    complement_with(a, b, d, f, g, &IgnoreAttrs::none())
}

pub(crate) fn complement_with(
    a: &Graph,
    b: &Graph,
    d: &Graph,
    f: &Mapping,
    g: &Mapping,
    ignore: &IgnoreAttrs,
) -> Result<ComplementSquare> {
    check_homomorphism(a, b, f, ignore, true)?;
    check_homomorphism(b, d, g, &IgnoreAttrs::none(), true)?;
    if !is_monic(g) {
        return Err(Error::InvalidHomomorphism {
            domain: None,
            codomain: None,
            reason: "pullback complement requires a monic B → D".into(),
        });
    }

    let over_b = preimages(f);
    let image: BTreeSet<&NodeId> = g.values().collect();
    let mut c = d.empty_like();
    let mut a_c = Mapping::new();
    let mut c_d = Mapping::new();

    // D node → the C nodes standing for it
    let mut copies: BTreeMap<&NodeId, Vec<NodeId>> = BTreeMap::new();

    for (n, attrs) in d.node_entries() {
        if !image.contains(n) {
            c.add_node(n.clone(), attrs.clone())?;
            c_d.insert(n.clone(), n.clone());
            copies.entry(n).or_default().push(n.clone());
        }
    }

    let mut clones: Vec<(&NodeId, &NodeId, &NodeId)> = Vec::new();
    for (bn, dn) in g {
        let Some(pre) = over_b.get(bn) else {
            continue;
        };
        let primary = &pre[0];
        add_copy(&mut c, d, b, a, primary, bn, dn, dn.clone())?;
        a_c.insert(primary.clone(), dn.clone());
        c_d.insert(dn.clone(), dn.clone());
        copies.entry(dn).or_default().push(dn.clone());
        for extra in &pre[1..] {
            clones.push((extra, bn, dn));
        }
    }
    let cloned = clones.len();
    for (an, bn, dn) in clones {
        let name = c.fresh_id(dn.as_str());
        add_copy(&mut c, d, b, a, an, bn, dn, name.clone())?;
        a_c.insert(an.clone(), name.clone());
        c_d.insert(name.clone(), dn.clone());
        copies.entry(dn).or_default().push(name);
    }

    let b_of: BTreeMap<&NodeId, &NodeId> = g.iter().map(|(bn, dn)| (dn, bn)).collect();

    for (an1, an2, attrs) in a.edges() {
        let (s, t) = (&a_c[an1], &a_c[an2]);
        let (bs, bt) = (&f[an1], &f[an2]);
        let d_attrs = d.edge(&g[bs], &g[bt])?;
        let b_attrs = b.edge(bs, bt)?;
        let merged = d_attrs.difference(b_attrs).union(attrs);
        if !c.has_edge(s, t) {
            c.add_edge(s, t, merged)?;
        }
    }

    for (ds, dt, attrs) in d.edges() {
        let (bs, bt) = (b_of.get(ds), b_of.get(dt));
        if let (Some(bs), Some(bt)) = (bs, bt) {
            if b.has_edge(bs, bt) {
                // the rule sees this edge: only A edges survive
                continue;
            }
        }
        let (Some(sources), Some(targets)) = (copies.get(ds), copies.get(dt)) else {
            continue;
        };
        for s in sources {
            for t in targets {
                if !c.has_edge(s, t) {
                    c.add_edge(s, t, attrs.clone())?;
                }
            }
        }
    }

    let relaxed = if ignore.is_none() { IgnoreAttrs::none() } else { IgnoreAttrs::all() };
    check_homomorphism(a, &c, &a_c, &relaxed, true)?;
    check_homomorphism(&c, d, &c_d, &relaxed, true)?;
    debug!(nodes = c.node_count(), cloned, "pullback complement");
    Ok(ComplementSquare { c, a_c, c_d })
}

#[allow(clippy::too_many_arguments)]
fn add_copy(
    c: &mut Graph,
    d: &Graph,
    b: &Graph,
    a: &Graph,
    an: &NodeId,
    bn: &NodeId,
    dn: &NodeId,
    name: NodeId,
) -> Result<()> {
    let attrs = d.node(dn)?.difference(b.node(bn)?).union(a.node(an)?);
    c.add_node(name, attrs)
}
