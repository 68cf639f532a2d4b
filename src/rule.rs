//! Rewriting rules as spans `LHS ← P → RHS`.
//!
//! `P` is the preserved part. A LHS node without a `P`-preimage is deleted,
//! one with several preimages is cloned; a RHS node without a preimage is
//! added, one with several preimages merges them.

use std::collections::BTreeMap;

use tracing::debug;

use crate::category::{pullback_complement, pushout};
use crate::homomorphism::{check_homomorphism, identity, keys_by_value, preimages, IgnoreAttrs, Mapping};
use crate::model::{Attrs, Graph, MergeMethod, NodeId};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    lhs: Graph,
    p: Graph,
    rhs: Graph,
    p_lhs: Mapping,
    p_rhs: Mapping,
}

/// Everything produced by one application of a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleApplication {
    /// The graph after deletion and cloning.
    pub g_m: Graph,
    pub p_g_m: Mapping,
    pub g_m_g: Mapping,
    /// The rewritten graph.
    pub g_prime: Graph,
    pub g_m_g_prime: Mapping,
    pub rhs_g_prime: Mapping,
}

impl Rule {
    /// Build a rule; both legs must be total homomorphisms from `P`.
    pub fn new(lhs: Graph, p: Graph, rhs: Graph, p_lhs: Mapping, p_rhs: Mapping) -> Result<Self> {
        check_homomorphism(&p, &lhs, &p_lhs, &IgnoreAttrs::none(), true)?;
        check_homomorphism(&p, &rhs, &p_rhs, &IgnoreAttrs::none(), true)?;
        Ok(Self { lhs, p, rhs, p_lhs, p_rhs })
    }

    /// The identity span on `pattern`, ready for `inject_*` edits.
    pub fn from_pattern(pattern: Graph) -> Self {
        let ids = identity(&pattern);
        Self {
            lhs: pattern.clone(),
            p: pattern.clone(),
            rhs: pattern,
            p_lhs: ids.clone(),
            p_rhs: ids,
        }
    }

    pub fn identity(graph: &Graph) -> Self {
        Self::from_pattern(graph.clone())
    }

    pub fn lhs(&self) -> &Graph { &self.lhs }
    pub fn p(&self) -> &Graph { &self.p }
    pub fn rhs(&self) -> &Graph { &self.rhs }
    pub fn p_lhs(&self) -> &Mapping { &self.p_lhs }
    pub fn p_rhs(&self) -> &Mapping { &self.p_rhs }

    /// Swap the two sides.
    pub fn inverted(&self) -> Rule {
        Rule {
            lhs: self.rhs.clone(),
            p: self.p.clone(),
            rhs: self.lhs.clone(),
            p_lhs: self.p_rhs.clone(),
            p_rhs: self.p_lhs.clone(),
        }
    }

    /// DPO application: pullback complement of `P → LHS → G`, then the
    /// pushout of `G_m ← P → RHS`.
    pub fn apply_to(&self, graph: &Graph, instance: &Mapping) -> Result<RuleApplication> {
        check_homomorphism(&self.lhs, graph, instance, &IgnoreAttrs::none(), true)?;
        let cs = pullback_complement(&self.p, &self.lhs, graph, &self.p_lhs, instance)?;
        let po = pushout(&self.p, &cs.c, &self.rhs, &cs.a_c, &self.p_rhs)?;
        debug!(
            before = graph.node_count(),
            after = po.d.node_count(),
            "rule applied"
        );
        Ok(RuleApplication {
            g_m: cs.c,
            p_g_m: cs.a_c,
            g_m_g: cs.c_d,
            g_prime: po.d,
            g_m_g_prime: po.b_d,
            rhs_g_prime: po.c_d,
        })
    }

    // ========================================================================
    // Classification
    // ========================================================================

    pub fn removed_nodes(&self) -> Vec<NodeId> {
        let kept = preimages(&self.p_lhs);
        self.lhs.nodes().filter(|n| !kept.contains_key(*n)).cloned().collect()
    }

    /// LHS node → its `P` copies, for nodes with at least two.
    pub fn cloned_nodes(&self) -> BTreeMap<NodeId, Vec<NodeId>> {
        preimages(&self.p_lhs).into_iter().filter(|(_, v)| v.len() > 1).collect()
    }

    pub fn added_nodes(&self) -> Vec<NodeId> {
        let kept = preimages(&self.p_rhs);
        self.rhs.nodes().filter(|n| !kept.contains_key(*n)).cloned().collect()
    }

    /// RHS node → the `P` nodes merged into it.
    pub fn merged_nodes(&self) -> BTreeMap<NodeId, Vec<NodeId>> {
        preimages(&self.p_rhs).into_iter().filter(|(_, v)| v.len() > 1).collect()
    }

    /// LHS edges no `P` edge maps onto.
    pub fn removed_edges(&self) -> Vec<(NodeId, NodeId)> {
        uncovered_edges(&self.p, &self.lhs, &self.p_lhs)
    }

    /// RHS edges no `P` edge maps onto.
    pub fn added_edges(&self) -> Vec<(NodeId, NodeId)> {
        uncovered_edges(&self.p, &self.rhs, &self.p_rhs)
    }

    /// Attributes a `P` node drops relative to its LHS image.
    pub fn removed_node_attrs(&self) -> BTreeMap<NodeId, Attrs> {
        attr_delta(&self.p, &self.lhs, &self.p_lhs)
    }

    /// Attributes a RHS node gains relative to its `P` preimage.
    pub fn added_node_attrs(&self) -> BTreeMap<NodeId, Attrs> {
        attr_delta(&self.p, &self.rhs, &self.p_rhs)
            .into_iter()
            .map(|(p, a)| (self.p_rhs[&p].clone(), a))
            .collect()
    }

    /// Only deletes or clones.
    pub fn is_restrictive(&self) -> bool {
        self.added_nodes().is_empty()
            && self.merged_nodes().is_empty()
            && self.added_edges().is_empty()
            && self.added_node_attrs().is_empty()
    }

    /// Only adds or merges.
    pub fn is_relaxing(&self) -> bool {
        self.removed_nodes().is_empty()
            && self.cloned_nodes().is_empty()
            && self.removed_edges().is_empty()
            && self.removed_node_attrs().is_empty()
    }

    // ========================================================================
    // Builder
    // ========================================================================

    fn preserved(&self, lhs_node: &NodeId) -> Result<Vec<NodeId>> {
        self.lhs.node(lhs_node)?;
        Ok(keys_by_value(&self.p_lhs, lhs_node))
    }

    /// Delete a LHS node: its `P` copies go, and so do RHS nodes left
    /// without a preimage.
    pub fn inject_remove_node(&mut self, lhs_node: &NodeId) -> Result<()> {
        for p in self.preserved(lhs_node)? {
            self.p.remove_node(&p)?;
            self.p_lhs.remove(&p);
            if let Some(r) = self.p_rhs.remove(&p) {
                if keys_by_value(&self.p_rhs, &r).is_empty() {
                    self.rhs.remove_node(&r)?;
                }
            }
        }
        Ok(())
    }

    pub fn inject_remove_edge(&mut self, s: &NodeId, t: &NodeId) -> Result<()> {
        self.lhs.edge(s, t)?;
        let sources = keys_by_value(&self.p_lhs, s);
        let targets = keys_by_value(&self.p_lhs, t);
        for ps in &sources {
            for pt in &targets {
                if self.p.has_edge(ps, pt) {
                    self.p.remove_edge(ps, pt)?;
                    let (rs, rt) = (&self.p_rhs[ps], &self.p_rhs[pt]);
                    if self.rhs.has_edge(rs, rt) {
                        self.rhs.remove_edge(rs, rt)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Add one more `P` copy of a LHS node. Returns the new `P` node and
    /// its RHS image.
    pub fn inject_clone_node(
        &mut self,
        lhs_node: &NodeId,
        p_name: Option<NodeId>,
    ) -> Result<(NodeId, NodeId)> {
        let Some(original) = self.preserved(lhs_node)?.into_iter().next() else {
            return Err(Error::Graph(format!(
                "Node '{lhs_node}' is removed by the rule and cannot be cloned"
            )));
        };
        let p_new = self.p.clone_node(&original, p_name)?;
        let r_old = self.p_rhs[&original].clone();
        let r_new = self.rhs.clone_node(&r_old, None)?;
        self.p_lhs.insert(p_new.clone(), lhs_node.clone());
        self.p_rhs.insert(p_new.clone(), r_new.clone());
        Ok((p_new, r_new))
    }

    pub fn inject_add_node(&mut self, id: impl Into<NodeId>, attrs: Attrs) -> Result<()> {
        self.rhs.add_node(id, attrs)
    }

    pub fn inject_add_edge(&mut self, s: &NodeId, t: &NodeId, attrs: Attrs) -> Result<()> {
        self.rhs.add_edge(s, t, attrs)
    }

    /// Merge RHS nodes; `P` nodes that pointed at them follow.
    pub fn inject_merge_nodes(&mut self, ids: &[NodeId], new_id: Option<NodeId>) -> Result<NodeId> {
        let merged = self.rhs.merge_nodes(ids, new_id, MergeMethod::Union, MergeMethod::Union)?;
        for target in self.p_rhs.values_mut() {
            if ids.contains(target) {
                *target = merged.clone();
            }
        }
        Ok(merged)
    }

    pub fn inject_add_node_attrs(&mut self, rhs_node: &NodeId, attrs: &Attrs) -> Result<()> {
        self.rhs.add_node_attrs(rhs_node, attrs)
    }

    /// Drop attributes from a LHS node in `P` and in the corresponding RHS
    /// nodes.
    pub fn inject_remove_node_attrs(&mut self, lhs_node: &NodeId, attrs: &Attrs) -> Result<()> {
        for p in self.preserved(lhs_node)? {
            self.p.remove_node_attrs(&p, attrs)?;
            let r = self.p_rhs[&p].clone();
            self.rhs.remove_node_attrs(&r, attrs)?;
        }
        Ok(())
    }
}

fn uncovered_edges(p: &Graph, side: &Graph, p_side: &Mapping) -> Vec<(NodeId, NodeId)> {
    let covered: Vec<(&NodeId, &NodeId)> = p.edges().map(|(s, t, _)| (&p_side[s], &p_side[t])).collect();
    side.edges()
        .filter(|(s, t, _)| {
            !covered.iter().any(|(cs, ct)| {
                (cs == s && ct == t) || (!side.is_directed() && cs == t && ct == s)
            })
        })
        .map(|(s, t, _)| (s.clone(), t.clone()))
        .collect()
}

fn attr_delta(p: &Graph, side: &Graph, p_side: &Mapping) -> BTreeMap<NodeId, Attrs> {
    let mut out = BTreeMap::new();
    for (n, attrs) in p.node_entries() {
        if let Some(image) = p_side.get(n).and_then(|m| side.node_attrs(m.as_str())) {
            let delta = image.difference(attrs);
            if !delta.is_empty() {
                out.insert(n.clone(), delta);
            }
        }
    }
    out
}
