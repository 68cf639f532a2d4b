//! # Category operations
//!
//! Pullbacks, pushouts and pullback complements of attributed graphs, plus
//! the composite helpers the hierarchy uses to intersect several typings.
//!
//! Every operation is pure: inputs are borrowed, results are new graphs and
//! mappings bundled in a named square. Preconditions are validated with
//! [`check_homomorphism`](crate::homomorphism::check_homomorphism) before any
//! construction and postconditions are re-checked before returning.
//!
//! Naming is deterministic. New ids come from [`Graph::fresh_id`], so
//! repeated runs on the same input produce identical graphs.

mod complement;
mod pullback;
mod pushout;

pub use complement::pullback_complement;
pub use pullback::{nary_pullback, partial_pullback, pullback, total_pullback};
pub use pushout::pushout;

pub(crate) use complement::complement_with;
pub(crate) use pushout::pushout_with;

use std::collections::BTreeMap;

use crate::homomorphism::{IgnoreAttrs, Mapping};
use crate::model::{Graph, GraphId, NodeId};
use crate::{Error, Result};

// ============================================================================
// Squares
// ============================================================================

/// `A` with projections `A → B` and `A → C`.
#[derive(Debug, Clone, PartialEq)]
pub struct PullbackSquare {
    pub a: Graph,
    pub a_b: Mapping,
    pub a_c: Mapping,
}

/// `D` with injections `B → D` and `C → D`.
#[derive(Debug, Clone, PartialEq)]
pub struct PushoutSquare {
    pub d: Graph,
    pub b_d: Mapping,
    pub c_d: Mapping,
}

/// `C` with `A → C` and `C → D`, completing `A → B → D`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplementSquare {
    pub c: Graph,
    pub a_c: Mapping,
    pub c_d: Mapping,
}

/// Result of an n-ary pullback: one projection back to `B` and one per
/// named cospan.
#[derive(Debug, Clone, PartialEq)]
pub struct NaryPullback {
    pub a: Graph,
    pub a_b: Mapping,
    pub a_c: BTreeMap<GraphId, Mapping>,
}

/// One leg `C → D ← B` of an n-ary pullback.
#[derive(Debug, Clone, Copy)]
pub struct Cospan<'a> {
    pub c: &'a Graph,
    pub d: &'a Graph,
    pub b_d: &'a Mapping,
    pub c_d: &'a Mapping,
}

/// Pushout of a pullback together with the induced typing of the result.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedPushout {
    pub square: PushoutSquare,
    pub typing: Mapping,
}

// ============================================================================
// Union-find
// ============================================================================

/// Disjoint sets over dense indices, path-halving, union by size.
#[derive(Debug, Clone)]
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub(crate) fn new(n: usize) -> Self {
        Self { parent: (0..n).collect(), size: vec![1; n] }
    }

    pub(crate) fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub(crate) fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] { (ra, rb) } else { (rb, ra) };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }
}

// ============================================================================
// Induced maps and composites
// ============================================================================

/// The unique `u: Z → A` with `a_b ∘ u = z_b` and `a_c ∘ u = z_c` for a
/// pullback `A` whose projections may be partial.
///
/// Elements are matched on the pair `(b, c)` of their images. When a `Z`
/// element is typed on the `C` side but its `B` image is untyped in `A`,
/// the lookup falls back to the untyped copy `(b, None)`. Elements with no
/// image on either side stay unmapped.
pub fn unique_map_to_pullback(
    square: &PullbackSquare,
    z_nodes: impl IntoIterator<Item = NodeId>,
    z_b: &Mapping,
    z_c: &Mapping,
) -> Result<Mapping> {
    let mut index: BTreeMap<(Option<&NodeId>, Option<&NodeId>), &NodeId> = BTreeMap::new();
    for n in square.a.nodes() {
        let key = (square.a_b.get(n), square.a_c.get(n));
        if index.insert(key, n).is_some() {
            return Err(Error::InvalidHomomorphism {
                domain: None,
                codomain: None,
                reason: format!("induced map is not unique: several elements over node '{n}'"),
            });
        }
    }

    let mut out = Mapping::new();
    for z in z_nodes {
        let b = z_b.get(&z);
        let c = z_c.get(&z);
        if b.is_none() && c.is_none() {
            continue;
        }
        let hit = index
            .get(&(b, c))
            .or_else(|| c.and(index.get(&(b, None))))
            .or_else(|| b.and(index.get(&(None, c))));
        match hit {
            Some(a) => {
                out.insert(z, (*a).clone());
            }
            None => {
                return Err(Error::InvalidHomomorphism {
                    domain: None,
                    codomain: None,
                    reason: format!("no induced image for node '{z}'"),
                });
            }
        }
    }
    Ok(out)
}

/// Pullback followed by the pushout of its projections. The returned typing
/// sends the pushout back to `D`.
pub fn pullback_pushout(
    b: &Graph,
    c: &Graph,
    d: &Graph,
    b_d: &Mapping,
    c_d: &Mapping,
) -> Result<TypedPushout> {
    let pb = pullback(b, c, d, b_d, c_d, &IgnoreAttrs::none(), &IgnoreAttrs::none())?;
    let square = pushout_with(&pb.a, b, c, &pb.a_b, &pb.a_c, &IgnoreAttrs::none())?;
    let typing = typing_of_pushout(b, c, &square, b_d, c_d);
    Ok(TypedPushout { square, typing })
}

/// Fold [`pullback_pushout`] over a non-empty list of graphs typed by `d`.
pub fn multi_pullback_pushout(d: &Graph, graphs: &[(Graph, Mapping)]) -> Result<(Graph, Mapping)> {
    let Some(((first, first_typing), rest)) = graphs.split_first() else {
        return Err(Error::Graph("multi pullback-pushout of an empty list".into()));
    };
    let mut graph = first.clone();
    let mut typing = first_typing.clone();
    for (next, next_typing) in rest {
        let step = pullback_pushout(&graph, next, d, &typing, next_typing)?;
        graph = step.square.d;
        typing = step.typing;
    }
    Ok((graph, typing))
}

/// Typing of a pushout `D` induced by typings of its two sides.
pub fn typing_of_pushout(
    b: &Graph,
    c: &Graph,
    square: &PushoutSquare,
    b_typing: &Mapping,
    c_typing: &Mapping,
) -> Mapping {
    let mut out = Mapping::new();
    for n in b.nodes() {
        if let (Some(p), Some(t)) = (square.b_d.get(n), b_typing.get(n)) {
            out.insert(p.clone(), t.clone());
        }
    }
    for n in c.nodes() {
        if let (Some(p), Some(t)) = (square.c_d.get(n), c_typing.get(n)) {
            out.insert(p.clone(), t.clone());
        }
    }
    out
}
