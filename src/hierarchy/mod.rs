//! # Hierarchy
//!
//! A DAG whose nodes are graphs and rules and whose edges are typing
//! homomorphisms. Three invariants hold after every public mutation:
//!
//! 1. **Acyclicity**: no directed cycle.
//! 2. **Local validity**: every edge is a homomorphism (partial unless
//!    marked total) under its attribute policy.
//! 3. **Consistency**: all directed paths between two nodes compose to
//!    maps that agree on their common domain.
//!
//! Edits that could break consistency run inside a [`Transaction`] and are
//! rolled back when validation fails.

mod typing;
mod rewrite;

pub use rewrite::{RewriteOptions, RewriteResult};
pub use typing::PathTyping;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::homomorphism::{check_homomorphism, compose, IgnoreAttrs, Mapping};
use crate::matching::{self, SearchBudget, TypeConstraint};
use crate::model::{Attrs, Graph, GraphId, NodeId};
use crate::rule::Rule;
use crate::tx::Transaction;
use crate::{Error, Result};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Directedness of every graph in the hierarchy.
    pub directed: bool,
    /// Step limit for pattern matching; `None` searches exhaustively.
    pub match_budget: Option<u64>,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self { directed: true, match_budget: None }
    }
}

impl HierarchyConfig {
    pub fn budget(&self) -> SearchBudget {
        match self.match_budget {
            Some(steps) => SearchBudget::unlimited().with_max_steps(steps),
            None => SearchBudget::unlimited(),
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub graph: Graph,
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleNode {
    pub rule: Rule,
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HierarchyNode {
    Graph(GraphNode),
    Rule(RuleNode),
}

impl HierarchyNode {
    pub fn attrs(&self) -> &Attrs {
        match self {
            HierarchyNode::Graph(g) => &g.attrs,
            HierarchyNode::Rule(r) => &r.attrs,
        }
    }

    pub fn attrs_mut(&mut self) -> &mut Attrs {
        match self {
            HierarchyNode::Graph(g) => &mut g.attrs,
            HierarchyNode::Rule(r) => &mut r.attrs,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HierarchyNode::Graph(_) => "graph",
            HierarchyNode::Rule(_) => "rule",
        }
    }
}

// ============================================================================
// Edges
// ============================================================================

/// Graph → graph typing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Typing {
    pub mapping: Mapping,
    pub total: bool,
    pub ignore_attrs: IgnoreAttrs,
    pub attrs: Attrs,
}

impl Typing {
    /// A partial typing that checks attributes.
    pub fn new(mapping: Mapping) -> Self {
        Self { mapping, ..Self::default() }
    }

    pub fn total(mut self) -> Self {
        self.total = true;
        self
    }

    pub fn ignoring_attrs(mut self, ignore: impl Into<IgnoreAttrs>) -> Self {
        self.ignore_attrs = ignore.into();
        self
    }

    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }
}

/// Rule → graph typing: one map for each side of the rule.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleTyping {
    pub lhs_mapping: Mapping,
    pub rhs_mapping: Mapping,
    pub lhs_total: bool,
    pub rhs_total: bool,
    pub ignore_attrs: IgnoreAttrs,
    pub attrs: Attrs,
}

impl RuleTyping {
    pub fn new(lhs_mapping: Mapping, rhs_mapping: Mapping) -> Self {
        Self { lhs_mapping, rhs_mapping, ..Self::default() }
    }

    pub fn total(mut self) -> Self {
        self.lhs_total = true;
        self.rhs_total = true;
        self
    }

    pub fn ignoring_attrs(mut self, ignore: impl Into<IgnoreAttrs>) -> Self {
        self.ignore_attrs = ignore.into();
        self
    }

    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HierarchyEdge {
    Typing(Typing),
    RuleTyping(RuleTyping),
}

impl HierarchyEdge {
    pub fn attrs(&self) -> &Attrs {
        match self {
            HierarchyEdge::Typing(t) => &t.attrs,
            HierarchyEdge::RuleTyping(t) => &t.attrs,
        }
    }

    pub fn ignore_attrs(&self) -> &IgnoreAttrs {
        match self {
            HierarchyEdge::Typing(t) => &t.ignore_attrs,
            HierarchyEdge::RuleTyping(t) => &t.ignore_attrs,
        }
    }
}

// ============================================================================
// Hierarchy
// ============================================================================

#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub(crate) config: HierarchyConfig,
    pub(crate) nodes: BTreeMap<GraphId, HierarchyNode>,
    pub(crate) edges: BTreeMap<(GraphId, GraphId), HierarchyEdge>,
    pub(crate) next_tx: u64,
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self::with_config(HierarchyConfig::default())
    }
}

impl Hierarchy {
    pub fn new(directed: bool) -> Self {
        Self::with_config(HierarchyConfig { directed, ..HierarchyConfig::default() })
    }

    pub fn with_config(config: HierarchyConfig) -> Self {
        Self { config, nodes: BTreeMap::new(), edges: BTreeMap::new(), next_tx: 0 }
    }

    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    pub fn is_directed(&self) -> bool {
        self.config.directed
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn contains(&self, id: &GraphId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &GraphId) -> Result<&HierarchyNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| Error::Hierarchy(format!("Node '{id}' not found")))
    }

    pub fn graph(&self, id: &GraphId) -> Result<&Graph> {
        match self.node(id)? {
            HierarchyNode::Graph(g) => Ok(&g.graph),
            HierarchyNode::Rule(_) => Err(Error::Hierarchy(format!("'{id}' is a rule, not a graph"))),
        }
    }

    pub fn rule(&self, id: &GraphId) -> Result<&Rule> {
        match self.node(id)? {
            HierarchyNode::Rule(r) => Ok(&r.rule),
            HierarchyNode::Graph(_) => Err(Error::Hierarchy(format!("'{id}' is a graph, not a rule"))),
        }
    }

    pub fn node_attrs(&self, id: &GraphId) -> Result<&Attrs> {
        Ok(self.node(id)?.attrs())
    }

    pub fn set_node_attrs(&mut self, id: &GraphId, attrs: Attrs) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::Hierarchy(format!("Node '{id}' not found")))?;
        *node.attrs_mut() = attrs;
        Ok(())
    }

    pub fn edge(&self, source: &GraphId, target: &GraphId) -> Result<&HierarchyEdge> {
        self.edges
            .get(&(source.clone(), target.clone()))
            .ok_or_else(|| Error::Hierarchy(format!("No typing edge '{source}' -> '{target}'")))
    }

    pub fn typing(&self, source: &GraphId, target: &GraphId) -> Result<&Typing> {
        match self.edge(source, target)? {
            HierarchyEdge::Typing(t) => Ok(t),
            HierarchyEdge::RuleTyping(_) => Err(Error::Hierarchy(format!(
                "'{source}' -> '{target}' is a rule typing"
            ))),
        }
    }

    pub fn rule_typing(&self, source: &GraphId, target: &GraphId) -> Result<&RuleTyping> {
        match self.edge(source, target)? {
            HierarchyEdge::RuleTyping(t) => Ok(t),
            HierarchyEdge::Typing(_) => Err(Error::Hierarchy(format!(
                "'{source}' -> '{target}' is a graph typing"
            ))),
        }
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &GraphId> {
        self.nodes.keys()
    }

    pub fn graphs(&self) -> impl Iterator<Item = &GraphId> {
        self.nodes
            .iter()
            .filter(|(_, n)| matches!(n, HierarchyNode::Graph(_)))
            .map(|(id, _)| id)
    }

    pub fn rules(&self) -> impl Iterator<Item = &GraphId> {
        self.nodes
            .iter()
            .filter(|(_, n)| matches!(n, HierarchyNode::Rule(_)))
            .map(|(id, _)| id)
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = (&GraphId, &GraphId)> {
        self.edges.keys().map(|(s, t)| (s, t))
    }

    pub fn successors(&self, id: &GraphId) -> Vec<GraphId> {
        self.edges
            .range((id.clone(), GraphId::default())..)
            .take_while(|((s, _), _)| s == id)
            .map(|((_, t), _)| t.clone())
            .collect()
    }

    pub fn predecessors(&self, id: &GraphId) -> Vec<GraphId> {
        self.edges
            .keys()
            .filter(|(_, t)| t == id)
            .map(|(s, _)| s.clone())
            .collect()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    pub fn add_graph(&mut self, id: impl Into<GraphId>, graph: Graph, attrs: Attrs) -> Result<()> {
        let id = id.into();
        self.ensure_absent(&id)?;
        if graph.is_directed() != self.config.directed {
            return Err(Error::Hierarchy(format!(
                "Graph '{id}' does not match the hierarchy's directedness"
            )));
        }
        info!(%id, nodes = graph.node_count(), edges = graph.edge_count(), "graph added");
        self.nodes.insert(id, HierarchyNode::Graph(GraphNode { graph, attrs }));
        Ok(())
    }

    pub fn add_rule(&mut self, id: impl Into<GraphId>, rule: Rule, attrs: Attrs) -> Result<()> {
        let id = id.into();
        self.ensure_absent(&id)?;
        if rule.lhs().is_directed() != self.config.directed {
            return Err(Error::Hierarchy(format!(
                "Rule '{id}' does not match the hierarchy's directedness"
            )));
        }
        info!(%id, "rule added");
        self.nodes.insert(id, HierarchyNode::Rule(RuleNode { rule, attrs }));
        Ok(())
    }

    /// Add a graph → graph typing edge.
    pub fn add_typing(
        &mut self,
        source: impl Into<GraphId>,
        target: impl Into<GraphId>,
        typing: Typing,
    ) -> Result<()> {
        let (source, target) = (source.into(), target.into());
        if let HierarchyNode::Rule(_) = self.node(&source)? {
            return Err(Error::Hierarchy(format!(
                "'{source}' is a rule; type it with add_rule_typing"
            )));
        }
        self.ensure_new_edge(&source, &target)?;
        self.insert_edge_checked(source, target, HierarchyEdge::Typing(typing))
    }

    /// Add a rule → graph typing edge.
    pub fn add_rule_typing(
        &mut self,
        source: impl Into<GraphId>,
        target: impl Into<GraphId>,
        typing: RuleTyping,
    ) -> Result<()> {
        let (source, target) = (source.into(), target.into());
        self.rule(&source)?;
        self.ensure_new_edge(&source, &target)?;
        self.insert_edge_checked(source, target, HierarchyEdge::RuleTyping(typing))
    }

    fn ensure_absent(&self, id: &GraphId) -> Result<()> {
        if self.nodes.contains_key(id) {
            return Err(Error::Hierarchy(format!("Node '{id}' already exists")));
        }
        Ok(())
    }

    fn ensure_new_edge(&self, source: &GraphId, target: &GraphId) -> Result<()> {
        if source == target {
            return Err(Error::Hierarchy(format!("Typing '{source}' -> '{source}' would be a loop")));
        }
        self.graph(target)?;
        if self.edges.contains_key(&(source.clone(), target.clone())) {
            return Err(Error::Hierarchy(format!(
                "Typing edge '{source}' -> '{target}' already exists"
            )));
        }
        if self.reaches(target, source) {
            return Err(Error::Hierarchy(format!(
                "Typing '{source}' -> '{target}' would create a cycle"
            )));
        }
        Ok(())
    }

    /// Insert (or replace) an edge, keeping it only if the hierarchy stays
    /// valid.
    fn insert_edge_checked(&mut self, source: GraphId, target: GraphId, edge: HierarchyEdge) -> Result<()> {
        let mut tx = Transaction::begin(self);
        tx.put_edge(source.clone(), target.clone(), edge);
        let verdict = tx
            .hierarchy()
            .check_edge(&source, &target)
            .and_then(|()| tx.hierarchy().check_consistency());
        if let Err(err) = verdict {
            tx.rollback();
            return Err(err);
        }
        tx.commit();
        info!(%source, %target, "typing added");
        Ok(())
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove a graph or rule and its edges. With `reconnect`, every
    /// predecessor is typed directly by every successor through the
    /// composite of the two removed edges.
    pub fn remove_graph(&mut self, id: &GraphId, reconnect: bool) -> Result<()> {
        self.node(id)?;
        let mut bridges = Vec::new();
        if reconnect {
            let successors = self.successors(id);
            for p in self.predecessors(id) {
                for s in &successors {
                    if self.edges.contains_key(&(p.clone(), s.clone())) {
                        continue;
                    }
                    let out = self.typing(id, s)?;
                    let bridge = match self.edge(&p, id)? {
                        HierarchyEdge::Typing(inn) => HierarchyEdge::Typing(Typing {
                            mapping: compose(&inn.mapping, &out.mapping),
                            total: inn.total && out.total,
                            ignore_attrs: chain_ignore(&inn.ignore_attrs, &out.ignore_attrs, &inn.mapping),
                            attrs: Attrs::new(),
                        }),
                        HierarchyEdge::RuleTyping(inn) => {
                            let sides: Mapping =
                                inn.lhs_mapping.iter().chain(&inn.rhs_mapping).map(|(k, v)| (k.clone(), v.clone())).collect();
                            HierarchyEdge::RuleTyping(RuleTyping {
                                lhs_mapping: compose(&inn.lhs_mapping, &out.mapping),
                                rhs_mapping: compose(&inn.rhs_mapping, &out.mapping),
                                lhs_total: inn.lhs_total && out.total,
                                rhs_total: inn.rhs_total && out.total,
                                ignore_attrs: chain_ignore(&inn.ignore_attrs, &out.ignore_attrs, &sides),
                                attrs: Attrs::new(),
                            })
                        }
                    };
                    bridges.push((p.clone(), s.clone(), bridge));
                }
            }
        }

        let mut tx = Transaction::begin(self);
        tx.remove_node(id)?;
        let bridged = bridges.len();
        for (p, s, edge) in bridges {
            tx.put_edge(p, s, edge);
        }
        tx.commit();
        info!(%id, reconnect, bridged, "node removed");
        Ok(())
    }

    // ========================================================================
    // Node typing
    // ========================================================================

    /// Types of a graph node in each direct successor that types it.
    pub fn node_type(&self, graph_id: &GraphId, node: &NodeId) -> Result<BTreeMap<GraphId, NodeId>> {
        self.graph(graph_id)?.node(node)?;
        let mut out = BTreeMap::new();
        for target in self.successors(graph_id) {
            let typing = self.typing(graph_id, &target)?;
            if let Some(ty) = typing.mapping.get(node) {
                out.insert(target, ty.clone());
            }
        }
        Ok(out)
    }

    /// Mark a typing edge total; fails unless every source node is typed.
    pub fn to_total(&mut self, source: &GraphId, target: &GraphId) -> Result<()> {
        let typing = self.typing(source, target)?;
        check_homomorphism(
            self.graph(source)?,
            self.graph(target)?,
            &typing.mapping,
            &typing.ignore_attrs,
            true,
        )
        .map_err(|e| e.between(source, target))?;
        if let Some(HierarchyEdge::Typing(t)) = self.edges.get_mut(&(source.clone(), target.clone())) {
            t.total = true;
        }
        Ok(())
    }

    /// Type an untyped node of `graph_id` by `type_node` of `type_graph`.
    pub fn add_node_type(
        &mut self,
        graph_id: &GraphId,
        node: &NodeId,
        type_graph: &GraphId,
        type_node: &NodeId,
    ) -> Result<()> {
        self.graph(graph_id)?.node(node)?;
        self.graph(type_graph)?.node(type_node)?;
        let mut updated = self.typing(graph_id, type_graph)?.clone();
        match updated.mapping.get(node) {
            Some(existing) if existing == type_node => return Ok(()),
            Some(existing) => {
                return Err(Error::Hierarchy(format!(
                    "Node '{node}' of '{graph_id}' is already typed by '{existing}' in '{type_graph}'"
                )));
            }
            None => {}
        }
        updated.mapping.insert(node.clone(), type_node.clone());
        self.insert_edge_checked(graph_id.clone(), type_graph.clone(), HierarchyEdge::Typing(updated))
    }

    /// Rename a node of a graph and every typing that mentions it.
    pub fn rename_node(&mut self, graph_id: &GraphId, node: &NodeId, new_id: impl Into<NodeId>) -> Result<()> {
        let new_id = new_id.into();
        let mut graph = self.graph(graph_id)?.clone();
        graph.relabel_node(node, new_id.clone())?;
        let successors = self.successors(graph_id);
        let predecessors = self.predecessors(graph_id);

        let mut tx = Transaction::begin(self);
        tx.set_graph(graph_id, graph)?;
        for target in &successors {
            if let HierarchyEdge::Typing(t) = tx.edge_mut(graph_id, target)? {
                if let Some(ty) = t.mapping.remove(node) {
                    t.mapping.insert(new_id.clone(), ty);
                }
                if let IgnoreAttrs::Nodes(set) = &mut t.ignore_attrs {
                    if set.remove(node) {
                        set.insert(new_id.clone());
                    }
                }
            }
        }
        for source in &predecessors {
            match tx.edge_mut(source, graph_id)? {
                HierarchyEdge::Typing(t) => rename_values(&mut t.mapping, node, &new_id),
                HierarchyEdge::RuleTyping(t) => {
                    rename_values(&mut t.lhs_mapping, node, &new_id);
                    rename_values(&mut t.rhs_mapping, node, &new_id);
                }
            }
        }
        tx.commit();
        info!(graph = %graph_id, from = %node, to = %new_id, "node renamed");
        Ok(())
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Instances of `pattern` in a graph. `pattern_typing` types pattern
    /// nodes by ancestors of the graph.
    pub fn find_matching(
        &self,
        graph_id: &GraphId,
        pattern: &Graph,
        pattern_typing: &BTreeMap<GraphId, Mapping>,
    ) -> Result<Vec<Mapping>> {
        self.find_matching_with_budget(graph_id, pattern, pattern_typing, &self.config.budget())
    }

    pub fn find_matching_with_budget(
        &self,
        graph_id: &GraphId,
        pattern: &Graph,
        pattern_typing: &BTreeMap<GraphId, Mapping>,
        budget: &SearchBudget,
    ) -> Result<Vec<Mapping>> {
        let graph = self.graph(graph_id)?;
        let ancestors = self.get_ancestors(graph_id)?;
        let mut constraints = Vec::with_capacity(pattern_typing.len());
        for (type_graph, typing) in pattern_typing {
            let Some(graph_typing) = ancestors.get(type_graph) else {
                return Err(Error::Hierarchy(format!(
                    "'{type_graph}' is not an ancestor of '{graph_id}'"
                )));
            };
            check_homomorphism(pattern, self.graph(type_graph)?, typing, &IgnoreAttrs::all(), false)?;
            constraints.push(TypeConstraint {
                graph_typing: graph_typing.clone(),
                pattern_typing: typing.clone(),
            });
        }
        matching::find_matching(graph, pattern, &constraints, budget)
    }

    /// Instances of a rule's left-hand side, typed by the rule's edges.
    pub fn find_rule_matching(&self, graph_id: &GraphId, rule_id: &GraphId) -> Result<Vec<Mapping>> {
        let rule = self.rule(rule_id)?;
        let mut pattern_typing = BTreeMap::new();
        for target in self.successors(rule_id) {
            let typing = self.rule_typing(rule_id, &target)?;
            pattern_typing.insert(target, typing.lhs_mapping.clone());
        }
        self.find_matching(graph_id, rule.lhs(), &pattern_typing)
    }
}

fn rename_values(mapping: &mut Mapping, old: &NodeId, new: &NodeId) {
    for v in mapping.values_mut() {
        if v == old {
            *v = new.clone();
        }
    }
}

/// Attribute policy of the composite `second ∘ first`.
pub(crate) fn chain_ignore(first: &IgnoreAttrs, second: &IgnoreAttrs, first_map: &Mapping) -> IgnoreAttrs {
    if first.ignores_edges() || second.ignores_edges() {
        return IgnoreAttrs::all();
    }
    let mut exempt: BTreeSet<NodeId> = BTreeSet::new();
    for policy in [first.clone(), second.pull_back(first_map)] {
        if let IgnoreAttrs::Nodes(set) = policy {
            exempt.extend(set);
        }
    }
    if exempt.is_empty() {
        IgnoreAttrs::none()
    } else {
        IgnoreAttrs::Nodes(exempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttributeSet;
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

    /// G → T → M with agreeing typings.
    fn chain() -> Hierarchy {
        let mut h = Hierarchy::new(true);
        h.add_graph("M", graph(&["agent"], &[("agent", "agent")]), Attrs::new()).unwrap();
        h.add_graph("T", graph(&["person", "company"], &[("person", "company")]), Attrs::new())
            .unwrap();
        h.add_graph("G", graph(&["alice", "acme"], &[("alice", "acme")]), Attrs::new())
            .unwrap();
        h.add_typing("T", "M", Typing::new(map(&[("person", "agent"), ("company", "agent")])).total())
            .unwrap();
        h.add_typing("G", "T", Typing::new(map(&[("alice", "person"), ("acme", "company")])).total())
            .unwrap();
        h
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut h = chain();
        let err = h.add_graph("G", Graph::new(true), Attrs::new());
        assert!(matches!(err, Err(Error::Hierarchy(_))));
    }

    #[test]
    fn test_directedness_must_match() {
        let mut h = Hierarchy::new(true);
        let err = h.add_graph("U", Graph::new(false), Attrs::new());
        assert!(matches!(err, Err(Error::Hierarchy(_))));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut h = chain();
        let err = h.add_typing("M", "G", Typing::new(Mapping::new()));
        assert!(matches!(err, Err(Error::Hierarchy(_))));
        assert!(h.edge(&gid("M"), &gid("G")).is_err());
    }

    #[test]
    fn test_invalid_typing_reports_ids() {
        let mut h = chain();
        let err = h
            .add_typing("G", "M", Typing::new(map(&[("alice", "nobody")])))
            .unwrap_err();
        match err {
            Error::InvalidHomomorphism { domain, codomain, .. } => {
                assert_eq!(domain, Some(gid("G")));
                assert_eq!(codomain, Some(gid("M")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_inconsistent_shortcut_rolled_back() {
        let mut h = chain();
        h.add_graph("N", graph(&["x", "y"], &[]), Attrs::new()).unwrap();
        h.add_typing("M", "N", Typing::new(map(&[("agent", "x")]))).unwrap();
        // G → N directly disagrees with G → T → M → N on alice
        let err = h.add_typing("G", "N", Typing::new(map(&[("alice", "y")])));
        assert!(matches!(err, Err(Error::Hierarchy(_))));
        assert!(h.edge(&gid("G"), &gid("N")).is_err());
        h.add_typing("G", "N", Typing::new(map(&[("alice", "x")]))).unwrap();
    }

    #[test]
    fn test_successors_and_predecessors() {
        let h = chain();
        assert_eq!(h.successors(&gid("T")), vec![gid("M")]);
        assert_eq!(h.predecessors(&gid("T")), vec![gid("G")]);
        assert_eq!(h.graphs().count(), 3);
        assert_eq!(h.rules().count(), 0);
    }

    #[test]
    fn test_remove_graph_reconnects() {
        let mut h = chain();
        h.remove_graph(&gid("T"), true).unwrap();
        let bridge = h.typing(&gid("G"), &gid("M")).unwrap();
        assert_eq!(bridge.mapping, map(&[("acme", "agent"), ("alice", "agent")]));
        assert!(bridge.total);
        assert!(!h.contains(&gid("T")));
    }

    #[test]
    fn test_remove_graph_without_reconnect() {
        let mut h = chain();
        h.remove_graph(&gid("T"), false).unwrap();
        assert!(h.edge(&gid("G"), &gid("M")).is_err());
        assert_eq!(h.edge_ids().count(), 0);
    }

    #[test]
    fn test_node_type_and_add_node_type() {
        let mut h = chain();
        h.add_graph("H", graph(&["bob"], &[]), Attrs::new()).unwrap();
        h.add_typing("H", "T", Typing::new(Mapping::new())).unwrap();
        assert!(h.node_type(&gid("H"), &id("bob")).unwrap().is_empty());
        h.add_node_type(&gid("H"), &id("bob"), &gid("T"), &id("person")).unwrap();
        assert_eq!(
            h.node_type(&gid("H"), &id("bob")).unwrap(),
            [(gid("T"), id("person"))].into_iter().collect()
        );
        let err = h.add_node_type(&gid("H"), &id("bob"), &gid("T"), &id("company"));
        assert!(matches!(err, Err(Error::Hierarchy(_))));
    }

    #[test]
    fn test_to_total_requires_full_typing() {
        let mut h = chain();
        h.add_graph("H", graph(&["bob", "eve"], &[]), Attrs::new()).unwrap();
        h.add_typing("H", "T", Typing::new(map(&[("bob", "person")]))).unwrap();
        assert!(h.to_total(&gid("H"), &gid("T")).is_err());
        h.add_node_type(&gid("H"), &id("eve"), &gid("T"), &id("person")).unwrap();
        h.to_total(&gid("H"), &gid("T")).unwrap();
        assert!(h.typing(&gid("H"), &gid("T")).unwrap().total);
    }

    #[test]
    fn test_rename_node_updates_typings() {
        let mut h = chain();
        h.rename_node(&gid("T"), &id("person"), "human").unwrap();
        assert!(h.graph(&gid("T")).unwrap().has_node("human"));
        assert_eq!(h.typing(&gid("G"), &gid("T")).unwrap().mapping[&id("alice")], id("human"));
        assert_eq!(h.typing(&gid("T"), &gid("M")).unwrap().mapping[&id("human")], id("agent"));
        h.check_consistency().unwrap();
    }

    #[test]
    fn test_attribute_containment_checked() {
        let mut h = Hierarchy::new(true);
        let mut t = Graph::new(true);
        t.add_node("age", Attrs::new().with("v", AttributeSet::integers([(0, 10)]))).unwrap();
        let mut g = Graph::new(true);
        g.add_node("x", Attrs::new().with("v", 42)).unwrap();
        h.add_graph("T", t, Attrs::new()).unwrap();
        h.add_graph("G", g, Attrs::new()).unwrap();
        assert!(h.add_typing("G", "T", Typing::new(map(&[("x", "age")]))).is_err());
        h.add_typing("G", "T", Typing::new(map(&[("x", "age")])).ignoring_attrs(true)).unwrap();
    }

    #[test]
    fn test_chain_ignore_pulls_back_exemptions() {
        let first = IgnoreAttrs::none();
        let second = IgnoreAttrs::Nodes([id("t")].into_iter().collect());
        let composite = chain_ignore(&first, &second, &map(&[("a", "t"), ("b", "u")]));
        assert_eq!(composite, IgnoreAttrs::Nodes([id("a")].into_iter().collect()));
        assert_eq!(chain_ignore(&IgnoreAttrs::all(), &second, &Mapping::new()), IgnoreAttrs::all());
    }
}
