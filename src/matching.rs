//! Pattern matching: instances of a pattern graph inside a host graph.
//!
//! Matches are injective, edge-preserving node maps (non-induced), with
//! pattern attributes contained in the host's. The search is exact
//! backtracking over attribute- and type-filtered candidates; its cost is
//! exponential in the worst case, which is why every search runs under a
//! [`SearchBudget`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;
use tracing::debug;

use crate::homomorphism::{check_homomorphism, IgnoreAttrs, Mapping};
use crate::model::{Attrs, Graph, NodeId};
use crate::{Error, Result};

// ============================================================================
// Budget and cancellation
// ============================================================================

/// Shared flag that aborts a running search from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Limits for one search. The default is unbounded.
#[derive(Debug, Clone, Default)]
pub struct SearchBudget {
    /// Maximum number of candidate assignments tried.
    pub max_steps: Option<u64>,
    pub cancel: Option<CancellationToken>,
}

impl SearchBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Typings of the host and the pattern by one common typing graph. A
/// pattern node and a host node that are both typed must share the type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeConstraint {
    pub graph_typing: Mapping,
    pub pattern_typing: Mapping,
}

// ============================================================================
// Public entry points
// ============================================================================

/// All instances of `pattern` in `graph`, in deterministic order.
pub fn find_matching(
    graph: &Graph,
    pattern: &Graph,
    constraints: &[TypeConstraint],
    budget: &SearchBudget,
) -> Result<Vec<Mapping>> {
    let mut search = Search::new(graph, pattern, Fit::Subset, constraints, budget, None);
    search.run()?;
    let steps = search.steps;
    let mut out = Vec::with_capacity(search.results.len());
    for m in search.results {
        if check_homomorphism(pattern, graph, &m, &IgnoreAttrs::none(), true).is_ok() {
            out.push(m);
        }
    }
    debug!(matches = out.len(), steps, "pattern matching");
    Ok(out)
}

/// Structural and attribute-exact isomorphism.
pub fn are_isomorphic(a: &Graph, b: &Graph) -> bool {
    if a.is_directed() != b.is_directed()
        || a.node_count() != b.node_count()
        || a.edge_count() != b.edge_count()
    {
        return false;
    }
    let budget = SearchBudget::unlimited();
    let mut search = Search::new(b, a, Fit::Exact, &[], &budget, Some(1));
    matches!(search.run(), Ok(())) && !search.results.is_empty()
}

// ============================================================================
// Backtracking search
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fit {
    Subset,
    Exact,
}

impl Fit {
    fn accepts(self, pattern: &Attrs, host: &Attrs) -> bool {
        match self {
            Fit::Subset => pattern.is_subset_of(host),
            Fit::Exact => pattern == host,
        }
    }
}

/// Pattern edge between the node placed at some depth and an earlier one.
struct Link<'a> {
    earlier: usize,
    outgoing: bool,
    attrs: &'a Attrs,
}

struct Search<'a> {
    graph: &'a Graph,
    budget: &'a SearchBudget,
    fit: Fit,
    order: Vec<&'a NodeId>,
    candidates: Vec<SmallVec<[&'a NodeId; 8]>>,
    links: Vec<Vec<Link<'a>>>,
    placed: Vec<&'a NodeId>,
    used: HashSet<&'a NodeId>,
    steps: u64,
    results: Vec<Mapping>,
    limit: Option<usize>,
}

impl<'a> Search<'a> {
    fn new(
        graph: &'a Graph,
        pattern: &'a Graph,
        fit: Fit,
        constraints: &[TypeConstraint],
        budget: &'a SearchBudget,
        limit: Option<usize>,
    ) -> Self {
        let order = placement_order(pattern);
        let position: HashMap<&NodeId, usize> =
            order.iter().enumerate().map(|(i, n)| (*n, i)).collect();

        let mut links: Vec<Vec<Link<'a>>> = order.iter().map(|_| Vec::new()).collect();
        for (s, t, attrs) in pattern.edges() {
            if s == t {
                continue;
            }
            let (ps, pt) = (position[s], position[t]);
            if ps > pt {
                links[ps].push(Link { earlier: pt, outgoing: true, attrs });
            } else {
                links[pt].push(Link { earlier: ps, outgoing: false, attrs });
            }
        }

        let candidates = order
            .iter()
            .map(|p| {
                graph
                    .nodes()
                    .filter(|v| node_fits(graph, pattern, p, v, fit, constraints))
                    .collect()
            })
            .collect();

        Self {
            graph,
            budget,
            fit,
            order,
            candidates,
            links,
            placed: Vec::new(),
            used: HashSet::new(),
            steps: 0,
            results: Vec::new(),
            limit,
        }
    }

    fn run(&mut self) -> Result<()> {
        self.extend(0).map(|_| ())
    }

    /// Returns `true` once the result limit is reached.
    fn extend(&mut self, depth: usize) -> Result<bool> {
        if depth == self.order.len() {
            let m = self
                .order
                .iter()
                .zip(&self.placed)
                .map(|(p, v)| ((*p).clone(), (*v).clone()))
                .collect();
            self.results.push(m);
            return Ok(self.limit.is_some_and(|l| self.results.len() >= l));
        }
        for i in 0..self.candidates[depth].len() {
            let v = self.candidates[depth][i];
            self.tick()?;
            if self.used.contains(v) || !self.consistent(depth, v) {
                continue;
            }
            self.used.insert(v);
            self.placed.push(v);
            let done = self.extend(depth + 1)?;
            self.placed.pop();
            self.used.remove(v);
            if done {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn tick(&mut self) -> Result<()> {
        if self.budget.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::Cancelled);
        }
        self.steps += 1;
        match self.budget.max_steps {
            Some(max) if self.steps > max => Err(Error::BudgetExhausted { steps: max }),
            _ => Ok(()),
        }
    }

    fn consistent(&self, depth: usize, v: &NodeId) -> bool {
        self.links[depth].iter().all(|link| {
            let other = self.placed[link.earlier];
            let host = if link.outgoing {
                self.graph.edge_attrs(v, other)
            } else {
                self.graph.edge_attrs(other, v)
            };
            host.is_some_and(|h| self.fit.accepts(link.attrs, h))
        })
    }
}

fn node_fits(
    graph: &Graph,
    pattern: &Graph,
    p: &NodeId,
    v: &NodeId,
    fit: Fit,
    constraints: &[TypeConstraint],
) -> bool {
    let (Some(pa), Some(va)) = (pattern.node_attrs(p.as_str()), graph.node_attrs(v.as_str())) else {
        return false;
    };
    if !fit.accepts(pa, va) {
        return false;
    }
    for c in constraints {
        if let (Some(tp), Some(tg)) = (c.pattern_typing.get(p), c.graph_typing.get(v)) {
            if tp != tg {
                return false;
            }
        }
    }
    if let Some(loop_attrs) = pattern.edge_attrs(p, p) {
        match graph.edge_attrs(v, v) {
            Some(h) if fit.accepts(loop_attrs, h) => {}
            _ => return false,
        }
    }
    let (p_out, p_in) = (pattern.successors(p).count(), pattern.predecessors(p).count());
    let (v_out, v_in) = (graph.successors(v).count(), graph.predecessors(v).count());
    match fit {
        Fit::Subset => p_out <= v_out && p_in <= v_in,
        Fit::Exact => p_out == v_out && p_in == v_in,
    }
}

/// Most-constrained-first: each next node has the most already placed
/// neighbours, ties broken by degree then id.
fn placement_order(pattern: &Graph) -> Vec<&NodeId> {
    let mut remaining: Vec<&NodeId> = pattern.nodes().collect();
    let mut order: Vec<&NodeId> = Vec::with_capacity(remaining.len());
    let mut placed: HashSet<&NodeId> = HashSet::new();
    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_key = (0usize, 0usize);
        for (i, n) in remaining.iter().enumerate() {
            let connected = pattern
                .successors(n)
                .chain(pattern.predecessors(n))
                .filter(|m| placed.contains(m))
                .count();
            let key = (connected, pattern.degree(n));
            if i == 0 || key > best_key {
                best = i;
                best_key = key;
            }
        }
        let next = remaining.remove(best);
        placed.insert(next);
        order.push(next);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn host() -> Graph {
        let mut g = Graph::new(true);
        g.add_node("alice", Attrs::new().with("kind", "person")).unwrap();
        g.add_node("bob", Attrs::new().with("kind", "person")).unwrap();
        g.add_node("acme", Attrs::new().with("kind", "company")).unwrap();
        g.add_edges_from([("alice", "acme"), ("bob", "acme"), ("alice", "bob")]).unwrap();
        g
    }

    #[test]
    fn test_finds_all_edge_matches() {
        let mut p = Graph::new(true);
        p.add_node("x", Attrs::new().with("kind", "person")).unwrap();
        p.add_nodes_from(["y"]).unwrap();
        p.add_edges_from([("x", "y")]).unwrap();
        let found = find_matching(&host(), &p, &[], &SearchBudget::unlimited()).unwrap();
        let pairs: Vec<(NodeId, NodeId)> =
            found.iter().map(|m| (m[&id("x")].clone(), m[&id("y")].clone())).collect();
        assert_eq!(pairs.len(), 3);
        assert!(pairs.contains(&(id("alice"), id("bob"))));
        assert!(pairs.contains(&(id("bob"), id("acme"))));
    }

    #[test]
    fn test_matching_is_injective() {
        let mut p = Graph::new(true);
        p.add_nodes_from(["x", "y"]).unwrap();
        let found = find_matching(&host(), &p, &[], &SearchBudget::unlimited()).unwrap();
        assert_eq!(found.len(), 6);
        assert!(found.iter().all(|m| m[&id("x")] != m[&id("y")]));
    }

    #[test]
    fn test_type_constraint_filters() {
        let mut p = Graph::new(true);
        p.add_nodes_from(["x"]).unwrap();
        let c = TypeConstraint {
            graph_typing: [(id("alice"), id("P")), (id("bob"), id("P")), (id("acme"), id("C"))]
                .into_iter()
                .collect(),
            pattern_typing: [(id("x"), id("C"))].into_iter().collect(),
        };
        let found = find_matching(&host(), &p, &[c], &SearchBudget::unlimited()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0][&id("x")], id("acme"));
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut p = Graph::new(true);
        p.add_nodes_from(["x", "y", "z"]).unwrap();
        let budget = SearchBudget::unlimited().with_max_steps(2);
        let err = find_matching(&host(), &p, &[], &budget).unwrap_err();
        assert!(matches!(err, Error::BudgetExhausted { steps: 2 }));
    }

    #[test]
    fn test_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let budget = SearchBudget::unlimited().with_cancel(token);
        let mut p = Graph::new(true);
        p.add_nodes_from(["x"]).unwrap();
        assert!(matches!(find_matching(&host(), &p, &[], &budget), Err(Error::Cancelled)));
    }

    #[test]
    fn test_isomorphism() {
        let a = host();
        let mut b = Graph::new(true);
        b.add_node("1", Attrs::new().with("kind", "person")).unwrap();
        b.add_node("2", Attrs::new().with("kind", "person")).unwrap();
        b.add_node("3", Attrs::new().with("kind", "company")).unwrap();
        b.add_edges_from([("1", "3"), ("2", "3"), ("1", "2")]).unwrap();
        assert!(are_isomorphic(&a, &b));
        b.set_node_attrs(&id("3"), Attrs::new()).unwrap();
        assert!(!are_isomorphic(&a, &b));
    }

    #[test]
    fn test_undirected_matching() {
        let mut g = Graph::new(false);
        g.add_nodes_from(["a", "b"]).unwrap();
        g.add_edges_from([("a", "b")]).unwrap();
        let mut p = Graph::new(false);
        p.add_nodes_from(["x", "y"]).unwrap();
        p.add_edges_from([("y", "x")]).unwrap();
        let found = find_matching(&g, &p, &[], &SearchBudget::unlimited()).unwrap();
        assert_eq!(found.len(), 2);
    }
}
