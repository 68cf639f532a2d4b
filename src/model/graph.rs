//! Attributed graph.
//!
//! Nodes and edges carry [`Attrs`]. Directedness is fixed at construction;
//! an undirected edge `{s, t}` is stored once under its ordered key and is
//! answered in either orientation. All primitives check existence and
//! absence up front and leave the graph untouched when they fail.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{Attrs, NodeId};
use crate::homomorphism::Mapping;
use crate::{Error, Result};

/// How attributes are combined when nodes or edges are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    #[default]
    Union,
    Intersection,
}

impl MergeMethod {
    fn apply(self, acc: &Attrs, next: &Attrs) -> Attrs {
        match self {
            MergeMethod::Union => acc.union(next),
            MergeMethod::Intersection => acc.intersection(next),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    directed: bool,
    nodes: BTreeMap<NodeId, Attrs>,
    edges: BTreeMap<(NodeId, NodeId), Attrs>,
    succ: BTreeMap<NodeId, BTreeSet<NodeId>>,
    pred: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

// Adjacency indexes may hold empty sets after removals; compare content only.
impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.directed == other.directed && self.nodes == other.nodes && self.edges == other.edges
    }
}

fn node_missing(id: &NodeId) -> Error {
    Error::Graph(format!("Node '{id}' does not exist"))
}

fn edge_missing(s: &NodeId, t: &NodeId) -> Error {
    Error::Graph(format!("Edge '{s}'->'{t}' does not exist"))
}

impl Graph {
    pub fn new(directed: bool) -> Self {
        Self { directed, ..Default::default() }
    }

    /// Build a graph from node and edge lists in one go.
    pub fn from_parts<N, E>(directed: bool, nodes: N, edges: E) -> Result<Self>
    where
        N: IntoIterator<Item = (NodeId, Attrs)>,
        E: IntoIterator<Item = (NodeId, NodeId, Attrs)>,
    {
        let mut g = Graph::new(directed);
        for (id, attrs) in nodes {
            g.add_node(id, attrs)?;
        }
        for (s, t, attrs) in edges {
            g.add_edge(&s, &t, attrs)?;
        }
        Ok(g)
    }

    /// Empty graph with the same directedness.
    pub fn empty_like(&self) -> Self {
        Graph::new(self.directed)
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn node_entries(&self) -> impl Iterator<Item = (&NodeId, &Attrs)> {
        self.nodes.iter()
    }

    /// Edges under their stored orientation.
    pub fn edges(&self) -> impl Iterator<Item = (&NodeId, &NodeId, &Attrs)> {
        self.edges.iter().map(|((s, t), a)| (s, t, a))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn has_edge(&self, s: &NodeId, t: &NodeId) -> bool {
        self.edges.contains_key(&self.edge_key(s, t))
    }

    pub fn node_attrs(&self, id: &str) -> Option<&Attrs> {
        self.nodes.get(id)
    }

    pub fn edge_attrs(&self, s: &NodeId, t: &NodeId) -> Option<&Attrs> {
        self.edges.get(&self.edge_key(s, t))
    }

    pub fn node(&self, id: &NodeId) -> Result<&Attrs> {
        self.nodes.get(id).ok_or_else(|| node_missing(id))
    }

    pub fn edge(&self, s: &NodeId, t: &NodeId) -> Result<&Attrs> {
        self.edge_attrs(s, t).ok_or_else(|| edge_missing(s, t))
    }

    /// Out-neighbours; every neighbour for undirected graphs.
    pub fn successors<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.succ.get(id).into_iter().flatten()
    }

    /// In-neighbours; every neighbour for undirected graphs.
    pub fn predecessors<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.pred.get(id).into_iter().flatten()
    }

    pub fn degree(&self, id: &NodeId) -> usize {
        let out = self.succ.get(id).map_or(0, BTreeSet::len);
        if self.directed {
            out + self.pred.get(id).map_or(0, BTreeSet::len)
        } else {
            out
        }
    }

    /// First free id among `prefix`, `prefix_1`, `prefix_2`, ...
    pub fn fresh_id(&self, prefix: &str) -> NodeId {
        if !self.has_node(prefix) {
            return NodeId::from(prefix);
        }
        let mut i = 1usize;
        loop {
            let candidate = format!("{prefix}_{i}");
            if !self.has_node(&candidate) {
                return NodeId::from(candidate);
            }
            i += 1;
        }
    }

    fn edge_key(&self, s: &NodeId, t: &NodeId) -> (NodeId, NodeId) {
        if self.directed || s <= t {
            (s.clone(), t.clone())
        } else {
            (t.clone(), s.clone())
        }
    }

    /// Every edge touching `id`, each listed once.
    fn incident_edges(&self, id: &NodeId) -> Vec<(NodeId, NodeId, Attrs)> {
        let mut keys: BTreeSet<(NodeId, NodeId)> = BTreeSet::new();
        for t in self.successors(id) {
            keys.insert(self.edge_key(id, t));
        }
        for s in self.predecessors(id) {
            keys.insert(self.edge_key(s, id));
        }
        keys.into_iter()
            .filter_map(|k| self.edges.get(&k).cloned().map(|a| (k.0, k.1, a)))
            .collect()
    }

    // ========================================================================
    // Node primitives
    // ========================================================================

    pub fn add_node(&mut self, id: impl Into<NodeId>, attrs: Attrs) -> Result<()> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(Error::Graph(format!("Node '{id}' already exists")));
        }
        self.nodes.insert(id, attrs);
        Ok(())
    }

    pub fn add_nodes_from<I, T>(&mut self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeId>,
    {
        for id in ids {
            self.add_node(id, Attrs::new())?;
        }
        Ok(())
    }

    pub fn remove_node(&mut self, id: &NodeId) -> Result<Attrs> {
        let attrs = self.nodes.remove(id).ok_or_else(|| node_missing(id))?;
        for (s, t, _) in self.incident_edges(id) {
            self.unlink(&s, &t);
        }
        self.succ.remove(id);
        self.pred.remove(id);
        Ok(attrs)
    }

    pub fn set_node_attrs(&mut self, id: &NodeId, attrs: Attrs) -> Result<()> {
        let slot = self.nodes.get_mut(id).ok_or_else(|| node_missing(id))?;
        *slot = attrs;
        Ok(())
    }

    pub fn add_node_attrs(&mut self, id: &NodeId, attrs: &Attrs) -> Result<()> {
        let slot = self.nodes.get_mut(id).ok_or_else(|| node_missing(id))?;
        *slot = slot.union(attrs);
        Ok(())
    }

    pub fn remove_node_attrs(&mut self, id: &NodeId, attrs: &Attrs) -> Result<()> {
        let slot = self.nodes.get_mut(id).ok_or_else(|| node_missing(id))?;
        *slot = slot.difference(attrs);
        Ok(())
    }

    /// Rename a node, carrying its attributes and incident edges.
    pub fn relabel_node(&mut self, id: &NodeId, new_id: impl Into<NodeId>) -> Result<()> {
        let new_id = new_id.into();
        if *id == new_id {
            return self.node(id).map(|_| ());
        }
        if self.has_node(new_id.as_str()) {
            return Err(Error::Graph(format!("Node '{new_id}' already exists")));
        }
        let incident = self.incident_edges(id);
        let attrs = self.remove_node(id)?;
        self.nodes.insert(new_id.clone(), attrs);
        let rename = |n: NodeId| if n == *id { new_id.clone() } else { n };
        for (s, t, a) in incident {
            self.link(rename(s), rename(t), a);
        }
        Ok(())
    }

    /// Copy a node together with all its incident edges. A self-loop on the
    /// original yields a loop on the clone plus edges between the two.
    pub fn clone_node(&mut self, id: &NodeId, new_id: Option<NodeId>) -> Result<NodeId> {
        let attrs = self.node(id)?.clone();
        let new_id = match new_id {
            Some(n) if self.has_node(n.as_str()) => {
                return Err(Error::Graph(format!("Node '{n}' already exists")));
            }
            Some(n) => n,
            None => self.fresh_id(id.as_str()),
        };
        let incident = self.incident_edges(id);
        self.nodes.insert(new_id.clone(), attrs);
        for (s, t, a) in incident {
            let mut copies = Vec::with_capacity(3);
            match (s == *id, t == *id) {
                (true, true) => {
                    copies.push((new_id.clone(), new_id.clone()));
                    copies.push((id.clone(), new_id.clone()));
                    copies.push((new_id.clone(), id.clone()));
                }
                (true, false) => copies.push((new_id.clone(), t)),
                (false, true) => copies.push((s, new_id.clone())),
                (false, false) => {}
            }
            for (cs, ct) in copies {
                if !self.has_edge(&cs, &ct) {
                    self.link(cs, ct, a.clone());
                }
            }
        }
        Ok(new_id)
    }

    /// Collapse `ids` into one node. Edges between merged nodes become a
    /// self-loop; parallel edges created by the merge combine their
    /// attributes with `edge_method`.
    pub fn merge_nodes(
        &mut self,
        ids: &[NodeId],
        new_id: Option<NodeId>,
        node_method: MergeMethod,
        edge_method: MergeMethod,
    ) -> Result<NodeId> {
        let members: BTreeSet<NodeId> = ids.iter().cloned().collect();
        let Some(first) = members.iter().next().cloned() else {
            return Err(Error::Graph("Cannot merge an empty set of nodes".into()));
        };
        for id in &members {
            self.node(id)?;
        }
        if members.len() == 1 {
            if let Some(n) = new_id {
                self.relabel_node(&first, n.clone())?;
                return Ok(n);
            }
            return Ok(first);
        }

        let target = match new_id {
            Some(n) if self.has_node(n.as_str()) && !members.contains(&n) => {
                return Err(Error::Graph(format!(
                    "Node '{n}' already exists and is not being merged"
                )));
            }
            Some(n) => n,
            None => {
                let joined = members.iter().map(NodeId::as_str).collect::<Vec<_>>().join("_");
                if self.has_node(&joined) && !members.contains(joined.as_str()) {
                    self.fresh_id(&joined)
                } else {
                    NodeId::from(joined)
                }
            }
        };

        let mut attrs: Option<Attrs> = None;
        for id in &members {
            let next = &self.nodes[id];
            attrs = Some(match attrs {
                None => next.clone(),
                Some(acc) => node_method.apply(&acc, next),
            });
        }

        let mut new_edges: BTreeMap<(NodeId, NodeId), Attrs> = BTreeMap::new();
        for id in &members {
            for (s, t, a) in self.incident_edges(id) {
                let s = if members.contains(&s) { target.clone() } else { s };
                let t = if members.contains(&t) { target.clone() } else { t };
                let key = self.edge_key(&s, &t);
                let merged = match new_edges.remove(&key) {
                    None => a,
                    Some(acc) => edge_method.apply(&acc, &a),
                };
                new_edges.insert(key, merged);
            }
        }
        // The same edge between two members is seen from both endpoints;
        // recombining it with itself is idempotent for both methods.

        for id in &members {
            self.remove_node(id)?;
        }
        self.nodes.insert(target.clone(), attrs.unwrap_or_default());
        for ((s, t), a) in new_edges {
            self.link(s, t, a);
        }
        Ok(target)
    }

    // ========================================================================
    // Edge primitives
    // ========================================================================

    pub fn add_edge(&mut self, s: &NodeId, t: &NodeId, attrs: Attrs) -> Result<()> {
        self.node(s)?;
        self.node(t)?;
        if self.has_edge(s, t) {
            return Err(Error::Graph(format!("Edge '{s}'->'{t}' already exists")));
        }
        self.link(s.clone(), t.clone(), attrs);
        Ok(())
    }

    pub fn add_edges_from<I, T>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (T, T)>,
        T: Into<NodeId>,
    {
        for (s, t) in pairs {
            self.add_edge(&s.into(), &t.into(), Attrs::new())?;
        }
        Ok(())
    }

    pub fn remove_edge(&mut self, s: &NodeId, t: &NodeId) -> Result<Attrs> {
        if !self.has_edge(s, t) {
            return Err(edge_missing(s, t));
        }
        Ok(self.unlink(s, t).unwrap_or_default())
    }

    pub fn set_edge_attrs(&mut self, s: &NodeId, t: &NodeId, attrs: Attrs) -> Result<()> {
        let key = self.edge_key(s, t);
        let slot = self.edges.get_mut(&key).ok_or_else(|| edge_missing(s, t))?;
        *slot = attrs;
        Ok(())
    }

    pub fn add_edge_attrs(&mut self, s: &NodeId, t: &NodeId, attrs: &Attrs) -> Result<()> {
        let key = self.edge_key(s, t);
        let slot = self.edges.get_mut(&key).ok_or_else(|| edge_missing(s, t))?;
        *slot = slot.union(attrs);
        Ok(())
    }

    fn link(&mut self, s: NodeId, t: NodeId, attrs: Attrs) {
        self.succ.entry(s.clone()).or_default().insert(t.clone());
        self.pred.entry(t.clone()).or_default().insert(s.clone());
        if !self.directed {
            self.succ.entry(t.clone()).or_default().insert(s.clone());
            self.pred.entry(s.clone()).or_default().insert(t.clone());
        }
        let key = self.edge_key(&s, &t);
        self.edges.insert(key, attrs);
    }

    fn unlink(&mut self, s: &NodeId, t: &NodeId) -> Option<Attrs> {
        let key = self.edge_key(s, t);
        let attrs = self.edges.remove(&key)?;
        let (s, t) = key;
        if let Some(set) = self.succ.get_mut(&s) { set.remove(&t); }
        if let Some(set) = self.pred.get_mut(&t) { set.remove(&s); }
        if !self.directed {
            if let Some(set) = self.succ.get_mut(&t) { set.remove(&s); }
            if let Some(set) = self.pred.get_mut(&s) { set.remove(&t); }
        }
        Some(attrs)
    }

    // ========================================================================
    // Whole-graph operations
    // ========================================================================

    /// `self` minus the image of `other` under `mapping` (other → self),
    /// keeping every edge whose endpoints both survive.
    pub fn subtract(&self, other: &Graph, mapping: &Mapping) -> Result<Graph> {
        for (k, v) in mapping {
            other.node(k)?;
            self.node(v)?;
        }
        let removed: BTreeSet<&NodeId> = mapping.values().collect();
        let kept = self.nodes().filter(|n| !removed.contains(n)).cloned().collect::<Vec<_>>();
        Ok(self.subgraph(&kept))
    }

    /// Induced subgraph on `ids`; unknown ids are ignored.
    pub fn subgraph(&self, ids: &[NodeId]) -> Graph {
        let keep: BTreeSet<&NodeId> = ids.iter().filter(|n| self.has_node(n.as_str())).collect();
        let mut g = self.empty_like();
        for n in &keep {
            g.nodes.insert((*n).clone(), self.nodes[*n].clone());
        }
        for ((s, t), a) in &self.edges {
            if keep.contains(s) && keep.contains(t) {
                g.link(s.clone(), t.clone(), a.clone());
            }
        }
        g
    }
}
