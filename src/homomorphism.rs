//! Homomorphisms between attributed graphs.
//!
//! A homomorphism is a plain [`Mapping`] of node ids plus an
//! [`IgnoreAttrs`] policy; nothing here owns a graph. Validation is
//! centralized in [`check_homomorphism`] and every category operation
//! re-checks its postconditions through it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{Graph, NodeId};
use crate::{Error, Result};

/// Source node → target node.
pub type Mapping = BTreeMap<NodeId, NodeId>;

/// Which attribute checks a homomorphism skips.
///
/// `Flag(true)` skips node and edge checks; `Nodes(set)` exempts only the
/// listed source nodes and still checks every edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IgnoreAttrs {
    Flag(bool),
    Nodes(BTreeSet<NodeId>),
}

impl Default for IgnoreAttrs {
    fn default() -> Self {
        IgnoreAttrs::Flag(false)
    }
}

impl From<bool> for IgnoreAttrs {
    fn from(v: bool) -> Self {
        IgnoreAttrs::Flag(v)
    }
}

impl IgnoreAttrs {
    pub fn none() -> Self {
        IgnoreAttrs::Flag(false)
    }

    pub fn all() -> Self {
        IgnoreAttrs::Flag(true)
    }

    pub fn is_none(&self) -> bool {
        match self {
            IgnoreAttrs::Flag(b) => !b,
            IgnoreAttrs::Nodes(set) => set.is_empty(),
        }
    }

    pub fn ignores_node(&self, id: &NodeId) -> bool {
        match self {
            IgnoreAttrs::Flag(b) => *b,
            IgnoreAttrs::Nodes(set) => set.contains(id),
        }
    }

    pub fn ignores_edges(&self) -> bool {
        matches!(self, IgnoreAttrs::Flag(true))
    }

    /// Carry an exemption set across a node renaming `new → old`.
    pub fn pull_back(&self, new_to_old: &Mapping) -> IgnoreAttrs {
        match self {
            IgnoreAttrs::Flag(b) => IgnoreAttrs::Flag(*b),
            IgnoreAttrs::Nodes(set) => IgnoreAttrs::Nodes(
                new_to_old
                    .iter()
                    .filter(|(_, old)| set.contains(*old))
                    .map(|(new, _)| new.clone())
                    .collect(),
            ),
        }
    }
}

fn invalid(reason: String) -> Error {
    Error::InvalidHomomorphism { domain: None, codomain: None, reason }
}

// ============================================================================
// Validation
// ============================================================================

/// Check that `mapping` is a homomorphism `source → target`.
///
/// Edges with an unmapped endpoint are skipped, so partial maps validate
/// on their domain only.
pub fn check_homomorphism(
    source: &Graph,
    target: &Graph,
    mapping: &Mapping,
    ignore_attrs: &IgnoreAttrs,
    total: bool,
) -> Result<()> {
    if total {
        if let Some(missing) = source.nodes().find(|n| !mapping.contains_key(*n)) {
            return Err(invalid(format!(
                "mapping is not total: node '{missing}' has no image"
            )));
        }
    }
    for (s, t) in mapping {
        if !source.has_node(s.as_str()) {
            return Err(invalid(format!("node '{s}' is not in the source graph")));
        }
        if !target.has_node(t.as_str()) {
            return Err(invalid(format!(
                "image '{t}' of node '{s}' is not in the target graph"
            )));
        }
    }

    for (s, t, attrs) in source.edges() {
        let (Some(ms), Some(mt)) = (mapping.get(s), mapping.get(t)) else {
            continue;
        };
        let Some(target_attrs) = target.edge_attrs(ms, mt) else {
            return Err(invalid(format!(
                "connectivity is not preserved: edge '{s}'->'{t}' maps to missing edge '{ms}'->'{mt}'"
            )));
        };
        if !ignore_attrs.ignores_edges() && !attrs.is_subset_of(target_attrs) {
            return Err(invalid(format!(
                "attributes of edge '{s}'->'{t}' are not preserved by '{ms}'->'{mt}'"
            )));
        }
    }

    for (s, t) in mapping {
        if ignore_attrs.ignores_node(s) {
            continue;
        }
        let (Some(sa), Some(ta)) = (source.node_attrs(s.as_str()), target.node_attrs(t.as_str()))
        else {
            continue;
        };
        if !sa.is_subset_of(ta) {
            return Err(invalid(format!(
                "attributes of node '{s}' are not preserved by its image '{t}'"
            )));
        }
    }
    Ok(())
}

pub fn is_homomorphism(
    source: &Graph,
    target: &Graph,
    mapping: &Mapping,
    ignore_attrs: &IgnoreAttrs,
    total: bool,
) -> bool {
    check_homomorphism(source, target, mapping, ignore_attrs, total).is_ok()
}

// ============================================================================
// Algebra on mappings
// ============================================================================

/// `second ∘ first`, defined wherever both steps are.
pub fn compose(first: &Mapping, second: &Mapping) -> Mapping {
    first
        .iter()
        .filter_map(|(k, v)| second.get(v).map(|w| (k.clone(), w.clone())))
        .collect()
}

/// Compose a path of mappings, applied left to right.
pub fn compose_chain<'a>(chain: impl IntoIterator<Item = &'a Mapping>) -> Option<Mapping> {
    let mut iter = chain.into_iter();
    let first = iter.next()?.clone();
    Some(iter.fold(first, |acc, next| compose(&acc, next)))
}

pub fn is_total(mapping: &Mapping, source: &Graph) -> bool {
    source.node_count() == mapping.len() && source.nodes().all(|n| mapping.contains_key(n))
}

pub fn is_monic(mapping: &Mapping) -> bool {
    let mut seen = BTreeSet::new();
    mapping.values().all(|v| seen.insert(v))
}

pub fn identity(graph: &Graph) -> Mapping {
    graph.nodes().map(|n| (n.clone(), n.clone())).collect()
}

pub fn keys_by_value(mapping: &Mapping, value: &NodeId) -> Vec<NodeId> {
    mapping
        .iter()
        .filter(|(_, v)| *v == value)
        .map(|(k, _)| k.clone())
        .collect()
}

/// Image node → sorted preimages.
pub fn preimages(mapping: &Mapping) -> BTreeMap<NodeId, Vec<NodeId>> {
    let mut out: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for (k, v) in mapping {
        out.entry(v.clone()).or_default().push(k.clone());
    }
    out
}

/// Merge `extra` into `acc`, reporting the first key on which they disagree.
pub fn merge_agreeing(acc: &mut Mapping, extra: &Mapping) -> std::result::Result<(), NodeId> {
    for (k, v) in extra {
        match acc.get(k) {
            Some(existing) if existing != v => return Err(k.clone()),
            Some(_) => {}
            None => {
                acc.insert(k.clone(), v.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attrs;

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn map(pairs: &[(&str, &str)]) -> Mapping {
        pairs.iter().map(|(a, b)| (id(a), id(b))).collect()
    }

    fn typing_graph() -> Graph {
        let mut t = Graph::new(true);
        t.add_node("agent", Attrs::new().with("name", crate::model::AttributeSet::Universal))
            .unwrap();
        t.add_node("action", Attrs::new()).unwrap();
        t.add_edges_from([("agent", "action")]).unwrap();
        t
    }

    fn instance_graph() -> Graph {
        let mut g = Graph::new(true);
        g.add_node("alice", Attrs::new().with("name", "alice")).unwrap();
        g.add_node("eat", Attrs::new()).unwrap();
        g.add_edges_from([("alice", "eat")]).unwrap();
        g
    }

    #[test]
    fn test_valid_total_homomorphism() {
        let m = map(&[("alice", "agent"), ("eat", "action")]);
        check_homomorphism(&instance_graph(), &typing_graph(), &m, &IgnoreAttrs::none(), true)
            .unwrap();
    }

    #[test]
    fn test_totality_violation() {
        let m = map(&[("alice", "agent")]);
        let err = check_homomorphism(&instance_graph(), &typing_graph(), &m, &IgnoreAttrs::none(), true)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHomomorphism { .. }));
        assert!(is_homomorphism(&instance_graph(), &typing_graph(), &m, &IgnoreAttrs::none(), false));
    }

    #[test]
    fn test_connectivity_violation() {
        let m = map(&[("alice", "action"), ("eat", "agent")]);
        assert!(!is_homomorphism(&instance_graph(), &typing_graph(), &m, &IgnoreAttrs::all(), true));
    }

    #[test]
    fn test_attribute_violation_and_exemption() {
        let mut t = typing_graph();
        t.set_node_attrs(&id("agent"), Attrs::new().with("name", "bob")).unwrap();
        let m = map(&[("alice", "agent"), ("eat", "action")]);
        assert!(!is_homomorphism(&instance_graph(), &t, &m, &IgnoreAttrs::none(), true));
        let exempt = IgnoreAttrs::Nodes([id("alice")].into_iter().collect());
        assert!(is_homomorphism(&instance_graph(), &t, &m, &exempt, true));
    }

    #[test]
    fn test_node_exemption_still_checks_edges() {
        let mut g = instance_graph();
        g.set_edge_attrs(&id("alice"), &id("eat"), Attrs::new().with("w", 1i64)).unwrap();
        let m = map(&[("alice", "agent"), ("eat", "action")]);
        let exempt = IgnoreAttrs::Nodes([id("alice"), id("eat")].into_iter().collect());
        assert!(!is_homomorphism(&g, &typing_graph(), &m, &exempt, true));
        assert!(is_homomorphism(&g, &typing_graph(), &m, &IgnoreAttrs::all(), true));
    }

    #[test]
    fn test_compose_is_partial() {
        let f = map(&[("a", "x"), ("b", "y")]);
        let g = map(&[("x", "1")]);
        assert_eq!(compose(&f, &g), map(&[("a", "1")]));
        assert_eq!(compose_chain([&f, &g]), Some(map(&[("a", "1")])));
    }

    #[test]
    fn test_monic_and_preimages() {
        let f = map(&[("a", "x"), ("b", "x"), ("c", "y")]);
        assert!(!is_monic(&f));
        assert_eq!(keys_by_value(&f, &id("x")), vec![id("a"), id("b")]);
        assert_eq!(preimages(&f)[&id("y")], vec![id("c")]);
    }

    #[test]
    fn test_ignore_attrs_json_forms() {
        let flag: IgnoreAttrs = serde_json::from_str("true").unwrap();
        assert_eq!(flag, IgnoreAttrs::all());
        let nodes: IgnoreAttrs = serde_json::from_str("[\"a\"]").unwrap();
        assert!(nodes.ignores_node(&id("a")));
        assert!(!nodes.ignores_edges());
    }
}
