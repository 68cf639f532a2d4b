//! # regraph-rs: Categorical Graph Rewriting
//!
//! Double-pushout (DPO) rewriting of attributed graphs, and hierarchies of
//! graphs and rules connected by typing homomorphisms that stay globally
//! consistent under rewriting.
//!
//! ## Design Principles
//!
//! 1. **Values, not handles**: graphs, rules and homomorphisms are plain
//!    data; category operations borrow their inputs and build new graphs
//! 2. **Closed sum types**: hierarchy nodes and edges are enums, so a rule
//!    can never be passed where a graph is expected
//! 3. **Total attribute algebra**: `AttributeSet` merges never fail
//! 4. **All-or-nothing rewrites**: every change a rewrite implies is staged
//!    and validated before it becomes visible
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use regraph_rs::{Attrs, Graph, Hierarchy, NodeId, Rule, RewriteOptions, Typing};
//! use std::collections::BTreeMap;
//!
//! # fn example() -> regraph_rs::Result<()> {
//! let mut meta = Graph::new(true);
//! meta.add_nodes_from(["Person", "Company"])?;
//! meta.add_edges_from([("Person", "Company")])?;
//!
//! let mut g = Graph::new(true);
//! g.add_node("alice", Attrs::new())?;
//! g.add_node("acme", Attrs::new())?;
//! g.add_edges_from([("alice", "acme")])?;
//!
//! let mut h = Hierarchy::new(true);
//! h.add_graph("T", meta, Attrs::new())?;
//! h.add_graph("G", g, Attrs::new())?;
//! let typing = [("alice", "Person"), ("acme", "Company")]
//!     .into_iter()
//!     .map(|(a, b)| (NodeId::from(a), NodeId::from(b)))
//!     .collect();
//! h.add_typing("G", "T", Typing::new(typing).total())?;
//!
//! // delete alice
//! let mut pattern = Graph::new(true);
//! pattern.add_node("x", Attrs::new())?;
//! let mut rule = Rule::from_pattern(pattern);
//! rule.inject_remove_node(&NodeId::from("x"))?;
//! let instance = [(NodeId::from("x"), NodeId::from("alice"))].into_iter().collect();
//! h.rewrite(&"G".into(), &rule, &instance, &BTreeMap::new(), &BTreeMap::new(), &RewriteOptions::default())?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod homomorphism;
pub mod category;
pub mod rule;
pub mod matching;
pub mod hierarchy;
pub mod tx;
pub mod export;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{AttrValue, AttributeSet, Attrs, Graph, GraphId, IntervalSet, MergeMethod, NodeId};

// ============================================================================
// Re-exports: Homomorphisms and category operations
// ============================================================================

pub use homomorphism::{check_homomorphism, IgnoreAttrs, Mapping};
pub use category::{
    pullback, pushout, pullback_complement, nary_pullback, pullback_pushout,
    ComplementSquare, PullbackSquare, PushoutSquare,
};

// ============================================================================
// Re-exports: Rules, matching, hierarchy
// ============================================================================

pub use rule::{Rule, RuleApplication};
pub use matching::{are_isomorphic, find_matching, CancellationToken, SearchBudget, TypeConstraint};
pub use hierarchy::{
    Hierarchy, HierarchyConfig, HierarchyEdge, HierarchyNode, GraphNode, RuleNode,
    Typing, RuleTyping, PathTyping, RewriteOptions, RewriteResult,
};
pub use tx::{Transaction, TxId};
pub use export::HierarchyJson;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Invalid homomorphism{between}: {reason}", between = describe_between(.domain, .codomain))]
    InvalidHomomorphism {
        domain: Option<GraphId>,
        codomain: Option<GraphId>,
        reason: String,
    },

    #[error("Rewriting error: {0}")]
    Rewriting(String),

    #[error("Hierarchy error: {0}")]
    Hierarchy(String),

    #[error("Search budget exhausted after {steps} steps")]
    BudgetExhausted { steps: u64 },

    #[error("Search cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Attach graph identifiers to an `InvalidHomomorphism` that lacks them.
    pub fn between(self, domain: &GraphId, codomain: &GraphId) -> Error {
        match self {
            Error::InvalidHomomorphism { domain: d, codomain: c, reason } => {
                Error::InvalidHomomorphism {
                    domain: d.or_else(|| Some(domain.clone())),
                    codomain: c.or_else(|| Some(codomain.clone())),
                    reason,
                }
            }
            other => other,
        }
    }
}

fn describe_between(domain: &Option<GraphId>, codomain: &Option<GraphId>) -> String {
    match (domain, codomain) {
        (Some(d), Some(c)) => format!(" '{d}' -> '{c}'"),
        (Some(d), None) => format!(" from '{d}'"),
        (None, Some(c)) => format!(" into '{c}'"),
        (None, None) => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
