//! Paths through the hierarchy: reachability, composed typings and the
//! consistency invariant.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::{Hierarchy, HierarchyEdge, HierarchyNode};
use crate::homomorphism::{check_homomorphism, compose, merge_agreeing, Mapping};
use crate::model::GraphId;
use crate::rule::Rule;
use crate::{Error, Result};

/// Composite of a path of typing edges.
#[derive(Debug, Clone, PartialEq)]
pub enum PathTyping {
    Graph(Mapping),
    Rule { lhs: Mapping, rhs: Mapping },
}

/// Graph → (ancestor → union of all path composites).
pub(crate) type Composites = BTreeMap<GraphId, BTreeMap<GraphId, Mapping>>;

/// Rule → (ancestor → (lhs composite, rhs composite)).
pub(crate) type RuleComposites = BTreeMap<GraphId, BTreeMap<GraphId, (Mapping, Mapping)>>;

impl Hierarchy {
    pub(crate) fn reaches(&self, from: &GraphId, to: &GraphId) -> bool {
        let mut seen: BTreeSet<GraphId> = BTreeSet::new();
        let mut queue = VecDeque::from([from.clone()]);
        while let Some(current) = queue.pop_front() {
            if &current == to {
                return true;
            }
            for next in self.successors(&current) {
                if seen.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// Node ids, sources first.
    pub(crate) fn topological_order(&self) -> Result<Vec<GraphId>> {
        let mut indegree: BTreeMap<&GraphId, usize> = self.nodes.keys().map(|id| (id, 0)).collect();
        for (_, t) in self.edges.keys() {
            if let Some(d) = indegree.get_mut(t) {
                *d += 1;
            }
        }
        let mut ready: VecDeque<GraphId> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| (*id).clone())
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            for next in self.successors(&id) {
                if let Some(d) = indegree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(next);
                    }
                }
            }
            order.push(id);
        }
        if order.len() != self.nodes.len() {
            return Err(Error::Hierarchy("hierarchy contains a cycle".into()));
        }
        Ok(order)
    }

    /// For every graph, the union of the composites of all paths to each
    /// ancestor. Fails on the first pair of paths that disagree.
    pub(crate) fn graph_composites(&self) -> Result<Composites> {
        let mut out: Composites = BTreeMap::new();
        for id in self.topological_order()?.into_iter().rev() {
            if !matches!(self.nodes.get(&id), Some(HierarchyNode::Graph(_))) {
                continue;
            }
            let mut reach: BTreeMap<GraphId, Mapping> = BTreeMap::new();
            for next in self.successors(&id) {
                let direct = &self.typing(&id, &next)?.mapping;
                absorb(&mut reach, &id, &next, direct)?;
                if let Some(further) = out.get(&next) {
                    for (ancestor, composite) in further {
                        absorb(&mut reach, &id, ancestor, &compose(direct, composite))?;
                    }
                }
            }
            out.insert(id, reach);
        }
        Ok(out)
    }

    /// Composites of both sides of every rule. A preserved node must get
    /// the same type through either side.
    pub(crate) fn rule_composites(&self, composites: &Composites) -> Result<RuleComposites> {
        let mut out: RuleComposites = BTreeMap::new();
        for (id, node) in &self.nodes {
            let HierarchyNode::Rule(r) = node else {
                continue;
            };
            let mut lhs_reach: BTreeMap<GraphId, Mapping> = BTreeMap::new();
            let mut rhs_reach: BTreeMap<GraphId, Mapping> = BTreeMap::new();
            for next in self.successors(id) {
                let typing = self.rule_typing(id, &next)?;
                absorb(&mut lhs_reach, id, &next, &typing.lhs_mapping)?;
                absorb(&mut rhs_reach, id, &next, &typing.rhs_mapping)?;
                if let Some(further) = composites.get(&next) {
                    for (ancestor, composite) in further {
                        absorb(&mut lhs_reach, id, ancestor, &compose(&typing.lhs_mapping, composite))?;
                        absorb(&mut rhs_reach, id, ancestor, &compose(&typing.rhs_mapping, composite))?;
                    }
                }
            }
            let mut reach = BTreeMap::new();
            for (ancestor, lhs) in lhs_reach {
                let rhs = rhs_reach.remove(&ancestor).unwrap_or_default();
                check_preserved(id, &ancestor, &r.rule, &lhs, &rhs)?;
                reach.insert(ancestor, (lhs, rhs));
            }
            for (ancestor, rhs) in rhs_reach {
                reach.insert(ancestor, (Mapping::new(), rhs));
            }
            out.insert(id.clone(), reach);
        }
        Ok(out)
    }

    /// Check that all paths agree, for graphs and rules alike.
    pub fn check_consistency(&self) -> Result<()> {
        let composites = self.graph_composites()?;
        self.rule_composites(&composites)?;
        Ok(())
    }

    /// Local validity of one edge.
    pub(crate) fn check_edge(&self, source: &GraphId, target: &GraphId) -> Result<()> {
        let codomain = self.graph(target)?;
        let checked = match (self.node(source)?, self.edge(source, target)?) {
            (HierarchyNode::Graph(g), HierarchyEdge::Typing(t)) => {
                check_homomorphism(&g.graph, codomain, &t.mapping, &t.ignore_attrs, t.total)
            }
            (HierarchyNode::Rule(r), HierarchyEdge::RuleTyping(t)) => {
                check_homomorphism(r.rule.lhs(), codomain, &t.lhs_mapping, &t.ignore_attrs, t.lhs_total)
                    .and_then(|()| {
                        check_homomorphism(r.rule.rhs(), codomain, &t.rhs_mapping, &t.ignore_attrs, t.rhs_total)
                    })
                    .and_then(|()| check_preserved(source, target, &r.rule, &t.lhs_mapping, &t.rhs_mapping))
            }
            (node, _) => {
                return Err(Error::Hierarchy(format!(
                    "edge '{source}' -> '{target}' does not fit a {} source",
                    node.kind()
                )));
            }
        };
        checked.map_err(|e| e.between(source, target))
    }

    /// Every ancestor of a graph with the union of the path composites.
    pub fn get_ancestors(&self, graph_id: &GraphId) -> Result<BTreeMap<GraphId, Mapping>> {
        self.graph(graph_id)?;
        let mut composites = self.graph_composites()?;
        Ok(composites.remove(graph_id).unwrap_or_default())
    }

    /// Compose the typing edges along `path`.
    pub fn compose_path_typing(&self, path: &[GraphId]) -> Result<PathTyping> {
        let [first, second, rest @ ..] = path else {
            return Err(Error::Hierarchy("a typing path needs at least two nodes".into()));
        };
        let mut acc = match self.edge(first, second)? {
            HierarchyEdge::Typing(t) => PathTyping::Graph(t.mapping.clone()),
            HierarchyEdge::RuleTyping(t) => PathTyping::Rule {
                lhs: t.lhs_mapping.clone(),
                rhs: t.rhs_mapping.clone(),
            },
        };
        let mut previous = second;
        for next in rest {
            let step = &self.typing(previous, next)?.mapping;
            acc = match acc {
                PathTyping::Graph(m) => PathTyping::Graph(compose(&m, step)),
                PathTyping::Rule { lhs, rhs } => PathTyping::Rule {
                    lhs: compose(&lhs, step),
                    rhs: compose(&rhs, step),
                },
            };
            previous = next;
        }
        Ok(acc)
    }
}

fn absorb(
    reach: &mut BTreeMap<GraphId, Mapping>,
    source: &GraphId,
    ancestor: &GraphId,
    mapping: &Mapping,
) -> Result<()> {
    merge_agreeing(reach.entry(ancestor.clone()).or_default(), mapping).map_err(|node| {
        Error::Hierarchy(format!(
            "paths from '{source}' to '{ancestor}' disagree on node '{node}'"
        ))
    })
}

/// Both sides of a rule must type each preserved node alike.
fn check_preserved(
    rule_id: &GraphId,
    ancestor: &GraphId,
    rule: &Rule,
    lhs: &Mapping,
    rhs: &Mapping,
) -> Result<()> {
    let via_lhs = compose(rule.p_lhs(), lhs);
    let via_rhs = compose(rule.p_rhs(), rhs);
    for (p, ty) in &via_lhs {
        if let Some(other) = via_rhs.get(p) {
            if other != ty {
                return Err(Error::Hierarchy(format!(
                    "rule '{rule_id}' types preserved node '{p}' as '{ty}' and '{other}' in '{ancestor}'"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{RuleTyping, Typing};
    use crate::model::{Attrs, Graph, NodeId};
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn gid(s: &str) -> GraphId {
        GraphId::from(s)
    }

    fn map(pairs: &[(&str, &str)]) -> Mapping {
        pairs.iter().map(|(a, b)| (id(a), id(b))).collect()
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> Graph {
        let mut g = Graph::new(true);
        g.add_nodes_from(nodes.iter().copied()).unwrap();
        g.add_edges_from(edges.iter().copied()).unwrap();
        g
    }

    /// Diamond: G → A → T and G → B → T.
    fn diamond() -> Hierarchy {
        let mut h = Hierarchy::new(true);
        h.add_graph("T", graph(&["t"], &[]), Attrs::new()).unwrap();
        h.add_graph("A", graph(&["a"], &[]), Attrs::new()).unwrap();
        h.add_graph("B", graph(&["b"], &[]), Attrs::new()).unwrap();
        h.add_graph("G", graph(&["g"], &[]), Attrs::new()).unwrap();
        h.add_typing("A", "T", Typing::new(map(&[("a", "t")]))).unwrap();
        h.add_typing("B", "T", Typing::new(map(&[("b", "t")]))).unwrap();
        h.add_typing("G", "A", Typing::new(map(&[("g", "a")]))).unwrap();
        h.add_typing("G", "B", Typing::new(map(&[("g", "b")]))).unwrap();
        h
    }

    #[test]
    fn test_topological_order_sources_first() {
        let h = diamond();
        let order = h.topological_order().unwrap();
        let pos = |s: &str| order.iter().position(|x| x == &gid(s)).unwrap();
        assert!(pos("G") < pos("A"));
        assert!(pos("A") < pos("T"));
        assert!(pos("B") < pos("T"));
    }

    #[test]
    fn test_ancestors_compose_through_paths() {
        let h = diamond();
        let ancestors = h.get_ancestors(&gid("G")).unwrap();
        assert_eq!(ancestors.keys().cloned().collect::<Vec<_>>(), vec![gid("A"), gid("B"), gid("T")]);
        assert_eq!(ancestors[&gid("T")], map(&[("g", "t")]));
    }

    #[test]
    fn test_compose_path_typing() {
        let h = diamond();
        let composite = h.compose_path_typing(&[gid("G"), gid("B"), gid("T")]).unwrap();
        assert_eq!(composite, PathTyping::Graph(map(&[("g", "t")])));
        assert!(h.compose_path_typing(&[gid("G")]).is_err());
        assert!(h.compose_path_typing(&[gid("G"), gid("T")]).is_err());
    }

    #[test]
    fn test_rule_typing_must_agree_on_preserved_nodes() {
        let mut h = Hierarchy::new(true);
        h.add_graph("T", graph(&["x", "y"], &[]), Attrs::new()).unwrap();
        let rule = Rule::from_pattern(graph(&["n"], &[]));
        h.add_rule("R", rule, Attrs::new()).unwrap();
        let bad = RuleTyping::new(map(&[("n", "x")]), map(&[("n", "y")]));
        assert!(matches!(h.add_rule_typing("R", "T", bad), Err(Error::Hierarchy(_))));
        let good = RuleTyping::new(map(&[("n", "x")]), map(&[("n", "x")])).total();
        h.add_rule_typing("R", "T", good).unwrap();
        match h.compose_path_typing(&[gid("R"), gid("T")]).unwrap() {
            PathTyping::Rule { lhs, rhs } => assert_eq!(lhs, rhs),
            PathTyping::Graph(_) => panic!("expected a rule typing"),
        }
    }
}
