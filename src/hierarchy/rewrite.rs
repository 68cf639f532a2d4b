//! Rewriting a graph of the hierarchy and propagating the change.
//!
//! After the local DPO step on `G` the typings out of `G` are rebuilt from
//! the rewrite's maps. Every node that reaches `G` is then pulled back
//! along `G_m → G`, its out-edges re-derived through the universal property
//! of the pullback. All replacements are applied in one transaction and
//! validated before commit.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::typing::Composites;
use super::{chain_ignore, Hierarchy, HierarchyEdge, HierarchyNode, RuleTyping, Typing};
use crate::category::{pullback, unique_map_to_pullback, PullbackSquare};
use crate::homomorphism::{check_homomorphism, compose, is_total, merge_agreeing, preimages, IgnoreAttrs, Mapping};
use crate::model::{Graph, GraphId, NodeId};
use crate::rule::{Rule, RuleApplication};
use crate::tx::Transaction;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteOptions {
    /// Fail instead of downgrading a total typing that became partial.
    pub strict_totality: bool,
}

impl RewriteOptions {
    pub fn strict() -> Self {
        Self { strict_totality: true }
    }
}

/// Maps of the local rewrite plus what propagation touched.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteResult {
    pub graph_id: GraphId,
    pub g_m_g: Mapping,
    pub g_m_g_prime: Mapping,
    pub rhs_g_prime: Mapping,
    /// Edges that were total before the rewrite and are partial now.
    pub downgraded: Vec<(GraphId, GraphId)>,
    /// Predecessors rebuilt by propagation, successors first.
    pub propagated: Vec<GraphId>,
}

/// A predecessor rebuilt by pulling it back along `G_m → G`.
enum Pulled {
    Graph(PullbackSquare),
    Rule {
        rule: Rule,
        lhs: PullbackSquare,
        rhs: PullbackSquare,
    },
}

/// Everything one rewrite replaces.
struct Plan {
    order: Vec<GraphId>,
    pulled: BTreeMap<GraphId, Pulled>,
    edges: Vec<(GraphId, GraphId, HierarchyEdge)>,
    downgraded: Vec<(GraphId, GraphId)>,
}

impl Hierarchy {
    /// Rewrite graph `graph_id` with `rule` at `instance`.
    ///
    /// `lhs_typing` and `rhs_typing` type the rule's sides by ancestors of
    /// the graph. The whole hierarchy is updated or, on any error, left
    /// untouched.
    pub fn rewrite(
        &mut self,
        graph_id: &GraphId,
        rule: &Rule,
        instance: &Mapping,
        lhs_typing: &BTreeMap<GraphId, Mapping>,
        rhs_typing: &BTreeMap<GraphId, Mapping>,
        options: &RewriteOptions,
    ) -> Result<RewriteResult> {
        let composites = self.graph_composites()?;
        self.check_instance(graph_id, rule, instance, lhs_typing, rhs_typing, &composites)?;

        let app = rule.apply_to(self.graph(graph_id)?, instance)?;
        debug!(
            graph = %graph_id,
            before = app.g_m_g.len(),
            after = app.g_prime.node_count(),
            "local rewrite"
        );

        let mut plan = Plan {
            order: Vec::new(),
            pulled: BTreeMap::new(),
            edges: Vec::new(),
            downgraded: Vec::new(),
        };
        self.retype_successors(graph_id, &app, rhs_typing, &composites, options, &mut plan)?;
        self.propagate(graph_id, &app, &composites, options, &mut plan)?;

        let Plan { order, pulled, edges, downgraded } = plan;
        let touched: Vec<(GraphId, GraphId)> = edges.iter().map(|(s, t, _)| (s.clone(), t.clone())).collect();

        let mut tx = Transaction::begin(self);
        tx.set_graph(graph_id, app.g_prime.clone())?;
        for (id, node) in pulled {
            match node {
                Pulled::Graph(square) => tx.set_graph(&id, square.a)?,
                Pulled::Rule { rule, .. } => tx.set_rule(&id, rule)?,
            }
        }
        for (source, target, edge) in edges {
            tx.put_edge(source, target, edge);
        }

        let verdict = touched
            .iter()
            .try_for_each(|(s, t)| tx.hierarchy().check_edge(s, t))
            .and_then(|()| tx.hierarchy().check_consistency());
        if let Err(err) = verdict {
            warn!(graph = %graph_id, error = %err, "rewrite rolled back");
            tx.rollback();
            return Err(err);
        }
        let tx_id = tx.id();
        tx.commit();
        info!(
            graph = %graph_id,
            tx = %tx_id,
            propagated = order.len(),
            downgraded = downgraded.len(),
            "rewrite committed"
        );

        Ok(RewriteResult {
            graph_id: graph_id.clone(),
            g_m_g: app.g_m_g,
            g_m_g_prime: app.g_m_g_prime,
            rhs_g_prime: app.rhs_g_prime,
            downgraded,
            propagated: order,
        })
    }

    /// Rewrite with a rule stored in the hierarchy, typed by its own edges.
    pub fn apply_rule(
        &mut self,
        graph_id: &GraphId,
        rule_id: &GraphId,
        instance: &Mapping,
        options: &RewriteOptions,
    ) -> Result<RewriteResult> {
        let rule = self.rule(rule_id)?.clone();
        let mut lhs_typing = BTreeMap::new();
        let mut rhs_typing = BTreeMap::new();
        for target in self.successors(rule_id) {
            let typing = self.rule_typing(rule_id, &target)?;
            lhs_typing.insert(target.clone(), typing.lhs_mapping.clone());
            rhs_typing.insert(target, typing.rhs_mapping.clone());
        }
        self.rewrite(graph_id, &rule, instance, &lhs_typing, &rhs_typing, options)
    }

    // ========================================================================
    // Instance check
    // ========================================================================

    fn check_instance(
        &self,
        graph_id: &GraphId,
        rule: &Rule,
        instance: &Mapping,
        lhs_typing: &BTreeMap<GraphId, Mapping>,
        rhs_typing: &BTreeMap<GraphId, Mapping>,
        composites: &Composites,
    ) -> Result<()> {
        let graph = self.graph(graph_id)?;
        check_homomorphism(rule.lhs(), graph, instance, &IgnoreAttrs::none(), true)?;
        let empty = BTreeMap::new();
        let ancestors = composites.get(graph_id).unwrap_or(&empty);

        for (type_graph, typing) in lhs_typing {
            let Some(ancestor) = ancestors.get(type_graph) else {
                return Err(not_ancestor(type_graph, graph_id));
            };
            check_homomorphism(rule.lhs(), self.graph(type_graph)?, typing, &IgnoreAttrs::all(), false)?;
            for (l, ty) in typing {
                let matched = instance
                    .get(l)
                    .ok_or_else(|| Error::Rewriting(format!("lhs node '{l}' is not matched")))?;
                if ancestor.get(matched) != Some(ty) {
                    return Err(Error::Rewriting(format!(
                        "lhs node '{l}' is typed by '{ty}' in '{type_graph}', but '{matched}' is not"
                    )));
                }
            }
        }
        for (type_graph, typing) in rhs_typing {
            if !ancestors.contains_key(type_graph) {
                return Err(not_ancestor(type_graph, graph_id));
            }
            check_homomorphism(rule.rhs(), self.graph(type_graph)?, typing, &IgnoreAttrs::all(), false)?;
        }
        Ok(())
    }

    // ========================================================================
    // Successors of the rewritten graph
    // ========================================================================

    fn retype_successors(
        &self,
        graph_id: &GraphId,
        app: &RuleApplication,
        rhs_typing: &BTreeMap<GraphId, Mapping>,
        composites: &Composites,
        options: &RewriteOptions,
        plan: &mut Plan,
    ) -> Result<()> {
        let over_gm = preimages(&app.g_m_g_prime);
        let over_rhs = preimages(&app.rhs_g_prime);

        for target in self.successors(graph_id) {
            let old = self.typing(graph_id, &target)?;
            let requested = completed_rhs_typing(&target, rhs_typing, composites);
            let mut mapping = Mapping::new();

            for n in app.g_prime.nodes() {
                let existing: BTreeSet<&NodeId> = over_gm
                    .get(n)
                    .into_iter()
                    .flatten()
                    .filter_map(|m| app.g_m_g.get(m))
                    .filter_map(|g| old.mapping.get(g))
                    .collect();
                let wanted: BTreeSet<&NodeId> = over_rhs
                    .get(n)
                    .into_iter()
                    .flatten()
                    .filter_map(|r| requested.get(r))
                    .collect();
                if existing.len() > 1 {
                    return Err(Error::Rewriting(format!(
                        "merged node '{n}' would have several types in '{target}': {}",
                        join(&existing)
                    )));
                }
                if wanted.len() > 1 {
                    return Err(Error::Rewriting(format!(
                        "rhs typing gives node '{n}' several types in '{target}': {}",
                        join(&wanted)
                    )));
                }
                let ty = match (existing.first(), wanted.first()) {
                    (Some(e), Some(w)) if e != w => {
                        return Err(Error::Rewriting(format!(
                            "node '{n}' is typed by '{e}' in '{target}', rhs typing asks for '{w}'"
                        )));
                    }
                    (Some(ty), _) | (None, Some(ty)) => Some(*ty),
                    (None, None) => None,
                };
                if let Some(ty) = ty {
                    mapping.insert(n.clone(), ty.clone());
                }
            }

            let ignore_attrs = match &old.ignore_attrs {
                IgnoreAttrs::Nodes(set) => IgnoreAttrs::Nodes(
                    over_gm
                        .iter()
                        .filter(|(_, pre)| pre.iter().any(|m| app.g_m_g.get(m).is_some_and(|g| set.contains(g))))
                        .map(|(n, _)| n.clone())
                        .collect(),
                ),
                other => other.clone(),
            };
            check_homomorphism(&app.g_prime, self.graph(&target)?, &mapping, &ignore_attrs, false)
                .map_err(|e| e.between(graph_id, &target))?;
            let now_total = is_total(&mapping, &app.g_prime);
            let total = settle_totality(old.total, now_total, graph_id, &target, options, &mut plan.downgraded)?;
            plan.edges.push((
                graph_id.clone(),
                target,
                HierarchyEdge::Typing(Typing { mapping, total, ignore_attrs, attrs: old.attrs.clone() }),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Predecessors
    // ========================================================================

    fn propagate(
        &self,
        origin: &GraphId,
        app: &RuleApplication,
        composites: &Composites,
        options: &RewriteOptions,
        plan: &mut Plan,
    ) -> Result<()> {
        let order = self.affected_order(origin);
        if order.is_empty() {
            return Ok(());
        }
        let rule_composites = self.rule_composites(composites)?;
        let origin_graph = self.graph(origin)?;

        // attribute policy of each node's composite typing into `origin`
        let mut policies: BTreeMap<&GraphId, IgnoreAttrs> = BTreeMap::new();
        for id in &order {
            let mut policy = IgnoreAttrs::none();
            for next in self.successors(id) {
                let edge = self.edge(id, &next)?;
                let via = if &next == origin {
                    edge.ignore_attrs().clone()
                } else if let Some(downstream) = policies.get(&next) {
                    match edge {
                        HierarchyEdge::Typing(t) => chain_ignore(&t.ignore_attrs, downstream, &t.mapping),
                        HierarchyEdge::RuleTyping(t) => widen(
                            chain_ignore(&t.ignore_attrs, downstream, &t.lhs_mapping),
                            chain_ignore(&t.ignore_attrs, downstream, &t.rhs_mapping),
                        ),
                    }
                } else {
                    continue;
                };
                policy = widen(policy, via);
            }
            policies.insert(id, policy);
        }

        for id in &order {
            let policy = &policies[id];
            let pull = |graph: &Graph, typing: &Mapping, policy: &IgnoreAttrs| {
                pullback(graph, &app.g_m, origin_graph, typing, &app.g_m_g, policy, &IgnoreAttrs::none())
                    .map_err(|e| e.between(id, origin))
            };
            let pulled = match self.node(id)? {
                HierarchyNode::Graph(g) => {
                    let typing = composite_to(composites.get(id), origin, id)?;
                    Pulled::Graph(pull(&g.graph, typing, policy)?)
                }
                HierarchyNode::Rule(r) => {
                    let (lhs_typing, rhs_typing) = rule_composites
                        .get(id)
                        .and_then(|c| c.get(origin))
                        .ok_or_else(|| not_ancestor(origin, id))?;
                    let rule = &r.rule;
                    let mut p_typing = compose(rule.p_lhs(), lhs_typing);
                    merge_agreeing(&mut p_typing, &compose(rule.p_rhs(), rhs_typing)).map_err(|p| {
                        Error::Hierarchy(format!("rule '{id}' types preserved node '{p}' inconsistently"))
                    })?;
                    let p_policy = widen(policy.pull_back(rule.p_lhs()), policy.pull_back(rule.p_rhs()));
                    let lhs = pull(rule.lhs(), lhs_typing, policy)?;
                    let p = pull(rule.p(), &p_typing, &p_policy)?;
                    let rhs = pull(rule.rhs(), rhs_typing, policy)?;
                    let p_lhs = induced(&lhs, &p, rule.p_lhs(), id)?;
                    let p_rhs = induced(&rhs, &p, rule.p_rhs(), id)?;
                    let rebuilt = Rule::new(lhs.a.clone(), p.a, rhs.a.clone(), p_lhs, p_rhs)
                        .map_err(|e| Error::Hierarchy(format!("cannot rebuild rule '{id}': {e}")))?;
                    Pulled::Rule { rule: rebuilt, lhs, rhs }
                }
            };
            debug!(node = %id, "pulled back");
            plan.pulled.insert(id.clone(), pulled);
        }

        for id in &order {
            for next in self.successors(id) {
                let edge =
                    self.rederive_edge(id, &next, origin, app, options, &plan.pulled, &mut plan.downgraded)?;
                plan.edges.push((id.clone(), next, edge));
            }
        }
        plan.order = order;
        Ok(())
    }

    /// Every node with a path to `origin`, each after all of its affected
    /// successors.
    fn affected_order(&self, origin: &GraphId) -> Vec<GraphId> {
        let mut affected: BTreeSet<GraphId> = BTreeSet::new();
        let mut queue = VecDeque::from([origin.clone()]);
        while let Some(current) = queue.pop_front() {
            for p in self.predecessors(&current) {
                if affected.insert(p.clone()) {
                    queue.push_back(p);
                }
            }
        }

        let mut pending: BTreeMap<GraphId, usize> = affected
            .iter()
            .map(|id| {
                let waiting = self.successors(id).iter().filter(|s| affected.contains(*s)).count();
                (id.clone(), waiting)
            })
            .collect();
        let mut ready: VecDeque<GraphId> = pending
            .iter()
            .filter(|(_, w)| **w == 0)
            .map(|(id, _)| id.clone())
            .collect();
        let mut order = Vec::with_capacity(affected.len());
        while let Some(id) = ready.pop_front() {
            for p in self.predecessors(&id) {
                if let Some(w) = pending.get_mut(&p) {
                    *w -= 1;
                    if *w == 0 {
                        ready.push_back(p);
                    }
                }
            }
            order.push(id);
        }
        order
    }

    /// New version of the edge `source → target` after `source` was pulled
    /// back.
    fn rederive_edge(
        &self,
        source: &GraphId,
        target: &GraphId,
        origin: &GraphId,
        app: &RuleApplication,
        options: &RewriteOptions,
        pulled: &BTreeMap<GraphId, Pulled>,
        downgraded: &mut Vec<(GraphId, GraphId)>,
    ) -> Result<HierarchyEdge> {
        let target_square = match pulled.get(target) {
            Some(Pulled::Graph(square)) => Some(square),
            _ => None,
        };
        let rederive = |square: &PullbackSquare, old: &Mapping| -> Result<Mapping> {
            if target == origin {
                return Ok(compose(&square.a_c, &app.g_m_g_prime));
            }
            let via_old = compose(&square.a_b, old);
            match target_square {
                Some(target_square) => {
                    let typed = square.a.nodes().filter(|n| via_old.contains_key(*n)).cloned();
                    unique_map_to_pullback(target_square, typed, &via_old, &square.a_c)
                        .map_err(|e| Error::Hierarchy(format!("cannot re-derive '{source}' -> '{target}': {e}")))
                }
                None => Ok(via_old),
            }
        };

        match (pulled.get(source), self.edge(source, target)?) {
            (Some(Pulled::Graph(square)), HierarchyEdge::Typing(old)) => {
                let mapping = rederive(square, &old.mapping)?;
                let now_total = is_total(&mapping, &square.a);
                let ignore_attrs = old.ignore_attrs.pull_back(&square.a_b);
                let total = settle_totality(old.total, now_total, source, target, options, downgraded)?;
                Ok(HierarchyEdge::Typing(Typing { mapping, total, ignore_attrs, attrs: old.attrs.clone() }))
            }
            (Some(Pulled::Rule { lhs, rhs, .. }), HierarchyEdge::RuleTyping(old)) => {
                let lhs_mapping = rederive(lhs, &old.lhs_mapping)?;
                let rhs_mapping = rederive(rhs, &old.rhs_mapping)?;
                let lhs_now = is_total(&lhs_mapping, &lhs.a);
                let rhs_now = is_total(&rhs_mapping, &rhs.a);
                let ignore_attrs = match (
                    old.ignore_attrs.pull_back(&lhs.a_b),
                    old.ignore_attrs.pull_back(&rhs.a_b),
                ) {
                    (IgnoreAttrs::Nodes(mut l), IgnoreAttrs::Nodes(r)) => {
                        l.extend(r);
                        IgnoreAttrs::Nodes(l)
                    }
                    (flag, _) => flag,
                };
                let lhs_total = settle_totality(old.lhs_total, lhs_now, source, target, options, downgraded)?;
                let rhs_total = settle_totality(old.rhs_total, rhs_now, source, target, options, downgraded)?;
                Ok(HierarchyEdge::RuleTyping(RuleTyping {
                    lhs_mapping,
                    rhs_mapping,
                    lhs_total,
                    rhs_total,
                    ignore_attrs,
                    attrs: old.attrs.clone(),
                }))
            }
            _ => Err(Error::Hierarchy(format!(
                "edge '{source}' -> '{target}' does not match its source"
            ))),
        }
    }
}

/// `rhs_typing[target]`, completed from every other typed ancestor that
/// itself reaches `target`.
fn completed_rhs_typing(
    target: &GraphId,
    rhs_typing: &BTreeMap<GraphId, Mapping>,
    composites: &Composites,
) -> Mapping {
    let mut out = rhs_typing.get(target).cloned().unwrap_or_default();
    for (other, typing) in rhs_typing {
        if other == target {
            continue;
        }
        let Some(path) = composites.get(other).and_then(|c| c.get(target)) else {
            continue;
        };
        for (r, ty) in typing {
            if out.contains_key(r) {
                continue;
            }
            if let Some(lifted) = path.get(ty) {
                out.insert(r.clone(), lifted.clone());
            }
        }
    }
    out
}

/// Map of the pulled-back `P` into a pulled-back side.
fn induced(side: &PullbackSquare, p: &PullbackSquare, leg: &Mapping, rule_id: &GraphId) -> Result<Mapping> {
    unique_map_to_pullback(side, p.a.nodes().cloned(), &compose(&p.a_b, leg), &p.a_c)
        .map_err(|e| Error::Hierarchy(format!("cannot rebuild rule '{rule_id}': {e}")))
}

/// Exempt everything either policy exempts.
fn widen(first: IgnoreAttrs, second: IgnoreAttrs) -> IgnoreAttrs {
    match (first, second) {
        (IgnoreAttrs::Flag(true), _) | (_, IgnoreAttrs::Flag(true)) => IgnoreAttrs::all(),
        (IgnoreAttrs::Nodes(mut a), IgnoreAttrs::Nodes(b)) => {
            a.extend(b);
            IgnoreAttrs::Nodes(a)
        }
        (IgnoreAttrs::Nodes(set), IgnoreAttrs::Flag(false)) | (IgnoreAttrs::Flag(false), IgnoreAttrs::Nodes(set)) => {
            IgnoreAttrs::Nodes(set)
        }
        (IgnoreAttrs::Flag(false), IgnoreAttrs::Flag(false)) => IgnoreAttrs::none(),
    }
}

fn composite_to<'a>(
    reach: Option<&'a BTreeMap<GraphId, Mapping>>,
    origin: &GraphId,
    id: &GraphId,
) -> Result<&'a Mapping> {
    reach
        .and_then(|r| r.get(origin))
        .ok_or_else(|| not_ancestor(origin, id))
}

fn settle_totality(
    was_total: bool,
    now_total: bool,
    source: &GraphId,
    target: &GraphId,
    options: &RewriteOptions,
    downgraded: &mut Vec<(GraphId, GraphId)>,
) -> Result<bool> {
    if was_total && !now_total {
        if options.strict_totality {
            return Err(Error::Rewriting(format!(
                "typing '{source}' -> '{target}' would no longer be total"
            )));
        }
        warn!(%source, %target, "total typing downgraded to partial");
        let key = (source.clone(), target.clone());
        if !downgraded.contains(&key) {
            downgraded.push(key);
        }
    }
    Ok(was_total && now_total)
}

fn not_ancestor(ancestor: &GraphId, id: &GraphId) -> Error {
    Error::Hierarchy(format!("'{ancestor}' is not an ancestor of '{id}'"))
}

fn join(ids: &BTreeSet<&NodeId>) -> String {
    ids.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
}
