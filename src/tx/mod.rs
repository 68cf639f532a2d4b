//! Transaction management.
//!
//! A [`Transaction`] writes straight into the hierarchy and records an undo
//! entry for every change. `commit` keeps the changes; `rollback`, or
//! dropping the transaction uncommitted, restores the previous state.

use std::fmt;

use tracing::{debug, warn};

use crate::hierarchy::{GraphNode, Hierarchy, HierarchyEdge, HierarchyNode, RuleNode};
use crate::model::{Graph, GraphId};
use crate::rule::Rule;
use crate::{Error, Result};

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

enum Undo {
    Node {
        id: GraphId,
        previous: HierarchyNode,
    },
    Edge {
        source: GraphId,
        target: GraphId,
        previous: Option<HierarchyEdge>,
    },
}

/// Exclusive write access to a hierarchy with auto-rollback on drop.
pub struct Transaction<'h> {
    hierarchy: &'h mut Hierarchy,
    id: TxId,
    undo: Vec<Undo>,
    finished: bool,
}

impl<'h> Transaction<'h> {
    pub fn begin(hierarchy: &'h mut Hierarchy) -> Self {
        hierarchy.next_tx += 1;
        let id = TxId(hierarchy.next_tx);
        debug!(%id, "transaction started");
        Self { hierarchy, id, undo: Vec::new(), finished: false }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    /// Read access to the hierarchy as currently staged.
    pub fn hierarchy(&self) -> &Hierarchy {
        self.hierarchy
    }

    /// Number of recorded changes.
    pub fn changes(&self) -> usize {
        self.undo.len()
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Mutable access to a node; the current value is saved first.
    pub fn node_mut(&mut self, id: &GraphId) -> Result<&mut HierarchyNode> {
        let previous = self
            .hierarchy
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Hierarchy(format!("Node '{id}' not found")))?;
        self.undo.push(Undo::Node { id: id.clone(), previous });
        self.hierarchy
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::Hierarchy(format!("Node '{id}' not found")))
    }

    /// Replace the graph stored at `id`, keeping its attributes.
    pub fn set_graph(&mut self, id: &GraphId, graph: Graph) -> Result<()> {
        match self.node_mut(id)? {
            HierarchyNode::Graph(GraphNode { graph: slot, .. }) => {
                *slot = graph;
                Ok(())
            }
            HierarchyNode::Rule(_) => Err(Error::Hierarchy(format!("'{id}' is a rule, not a graph"))),
        }
    }

    /// Replace the rule stored at `id`, keeping its attributes.
    pub fn set_rule(&mut self, id: &GraphId, rule: Rule) -> Result<()> {
        match self.node_mut(id)? {
            HierarchyNode::Rule(RuleNode { rule: slot, .. }) => {
                *slot = rule;
                Ok(())
            }
            HierarchyNode::Graph(_) => Err(Error::Hierarchy(format!("'{id}' is a graph, not a rule"))),
        }
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &GraphId) -> Result<HierarchyNode> {
        let incident: Vec<(GraphId, GraphId)> = self
            .hierarchy
            .edges
            .keys()
            .filter(|(s, t)| s == id || t == id)
            .cloned()
            .collect();
        for (s, t) in incident {
            self.remove_edge(&s, &t)?;
        }
        let node = self
            .hierarchy
            .nodes
            .remove(id)
            .ok_or_else(|| Error::Hierarchy(format!("Node '{id}' not found")))?;
        self.undo.push(Undo::Node { id: id.clone(), previous: node.clone() });
        Ok(node)
    }

    // ========================================================================
    // Edges
    // ========================================================================

    pub fn put_edge(&mut self, source: GraphId, target: GraphId, edge: HierarchyEdge) {
        let previous = self.hierarchy.edges.insert((source.clone(), target.clone()), edge);
        self.undo.push(Undo::Edge { source, target, previous });
    }

    pub fn edge_mut(&mut self, source: &GraphId, target: &GraphId) -> Result<&mut HierarchyEdge> {
        let key = (source.clone(), target.clone());
        let previous = self
            .hierarchy
            .edges
            .get(&key)
            .cloned()
            .ok_or_else(|| edge_missing(source, target))?;
        self.undo.push(Undo::Edge {
            source: source.clone(),
            target: target.clone(),
            previous: Some(previous),
        });
        self.hierarchy.edges.get_mut(&key).ok_or_else(|| edge_missing(source, target))
    }

    pub fn remove_edge(&mut self, source: &GraphId, target: &GraphId) -> Result<HierarchyEdge> {
        let edge = self
            .hierarchy
            .edges
            .remove(&(source.clone(), target.clone()))
            .ok_or_else(|| edge_missing(source, target))?;
        self.undo.push(Undo::Edge {
            source: source.clone(),
            target: target.clone(),
            previous: Some(edge.clone()),
        });
        Ok(edge)
    }

    // ========================================================================
    // Completion
    // ========================================================================

    pub fn commit(mut self) {
        self.finished = true;
        debug!(id = %self.id, changes = self.undo.len(), "transaction committed");
    }

    pub fn rollback(mut self) {
        self.undo_all();
        self.finished = true;
        debug!(id = %self.id, "transaction rolled back");
    }

    fn undo_all(&mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Node { id, previous } => {
                    self.hierarchy.nodes.insert(id, previous);
                }
                Undo::Edge { source, target, previous: Some(edge) } => {
                    self.hierarchy.edges.insert((source, target), edge);
                }
                Undo::Edge { source, target, previous: None } => {
                    self.hierarchy.edges.remove(&(source, target));
                }
            }
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(id = %self.id, changes = self.undo.len(), "transaction dropped uncommitted, rolling back");
            self.undo_all();
        }
    }
}

fn edge_missing(source: &GraphId, target: &GraphId) -> Error {
    Error::Hierarchy(format!("No typing edge '{source}' -> '{target}'"))
}
