//! JSON persistence for graphs, rules and whole hierarchies.
//!
//! ```text
//! { "graphs":      [{id, graph: {nodes, edges}, attrs}],
//!   "rules":       [{id, rule: {lhs, p, rhs, p_lhs, p_rhs}, attrs}],
//!   "typing":      [{from, to, mapping, total, ignore_attrs, attrs}],
//!   "rule_typing": [{from, to, lhs_mapping, rhs_mapping, lhs_total, rhs_total, ignore_attrs, attrs}] }
//! ```
//!
//! Loading replays `add_graph`, `add_rule`, `add_typing` and
//! `add_rule_typing` in that order, so a loaded hierarchy passes the same
//! checks as one built by hand.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::hierarchy::{Hierarchy, HierarchyConfig, HierarchyEdge, HierarchyNode, RuleTyping, Typing};
use crate::homomorphism::{IgnoreAttrs, Mapping};
use crate::model::{Attrs, Graph, GraphId, NodeId};
use crate::rule::Rule;
use crate::Result;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeJson {
    pub id: NodeId,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EdgeJson {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphJson {
    #[serde(default)]
    pub nodes: Vec<NodeJson>,
    #[serde(default)]
    pub edges: Vec<EdgeJson>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleJson {
    pub lhs: GraphJson,
    pub p: GraphJson,
    pub rhs: GraphJson,
    #[serde(default)]
    pub p_lhs: Mapping,
    #[serde(default)]
    pub p_rhs: Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEntry {
    pub id: GraphId,
    pub graph: GraphJson,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub id: GraphId,
    pub rule: RuleJson,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingEntry {
    pub from: GraphId,
    pub to: GraphId,
    pub mapping: Mapping,
    #[serde(default)]
    pub total: bool,
    #[serde(default)]
    pub ignore_attrs: IgnoreAttrs,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTypingEntry {
    pub from: GraphId,
    pub to: GraphId,
    pub lhs_mapping: Mapping,
    pub rhs_mapping: Mapping,
    #[serde(default)]
    pub lhs_total: bool,
    #[serde(default)]
    pub rhs_total: bool,
    #[serde(default)]
    pub ignore_attrs: IgnoreAttrs,
    #[serde(default)]
    pub attrs: Attrs,
}

/// A whole hierarchy in its JSON layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HierarchyJson {
    #[serde(default)]
    pub graphs: Vec<GraphEntry>,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
    #[serde(default)]
    pub typing: Vec<TypingEntry>,
    #[serde(default)]
    pub rule_typing: Vec<RuleTypingEntry>,
}

// ============================================================================
// Graphs and rules
// ============================================================================

impl GraphJson {
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            nodes: graph
                .node_entries()
                .map(|(id, attrs)| NodeJson { id: id.clone(), attrs: attrs.clone() })
                .collect(),
            edges: graph
                .edges()
                .map(|(s, t, attrs)| EdgeJson { from: s.clone(), to: t.clone(), attrs: attrs.clone() })
                .collect(),
        }
    }

    pub fn into_graph(self, directed: bool) -> Result<Graph> {
        Graph::from_parts(
            directed,
            self.nodes.into_iter().map(|n| (n.id, n.attrs)),
            self.edges.into_iter().map(|e| (e.from, e.to, e.attrs)),
        )
    }
}

impl RuleJson {
    pub fn from_rule(rule: &Rule) -> Self {
        Self {
            lhs: GraphJson::from_graph(rule.lhs()),
            p: GraphJson::from_graph(rule.p()),
            rhs: GraphJson::from_graph(rule.rhs()),
            p_lhs: rule.p_lhs().clone(),
            p_rhs: rule.p_rhs().clone(),
        }
    }

    pub fn into_rule(self, directed: bool) -> Result<Rule> {
        Rule::new(
            self.lhs.into_graph(directed)?,
            self.p.into_graph(directed)?,
            self.rhs.into_graph(directed)?,
            self.p_lhs,
            self.p_rhs,
        )
    }
}

impl Graph {
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(GraphJson::from_graph(self))?)
    }

    pub fn from_json(value: serde_json::Value, directed: bool) -> Result<Graph> {
        serde_json::from_value::<GraphJson>(value)?.into_graph(directed)
    }
}

impl Rule {
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(RuleJson::from_rule(self))?)
    }

    pub fn from_json(value: serde_json::Value, directed: bool) -> Result<Rule> {
        serde_json::from_value::<RuleJson>(value)?.into_rule(directed)
    }
}

// ============================================================================
// Hierarchies
// ============================================================================

impl HierarchyJson {
    pub fn from_hierarchy(hierarchy: &Hierarchy) -> Self {
        let mut out = Self::default();
        for (id, node) in &hierarchy.nodes {
            match node {
                HierarchyNode::Graph(g) => out.graphs.push(GraphEntry {
                    id: id.clone(),
                    graph: GraphJson::from_graph(&g.graph),
                    attrs: g.attrs.clone(),
                }),
                HierarchyNode::Rule(r) => out.rules.push(RuleEntry {
                    id: id.clone(),
                    rule: RuleJson::from_rule(&r.rule),
                    attrs: r.attrs.clone(),
                }),
            }
        }
        for ((from, to), edge) in &hierarchy.edges {
            match edge {
                HierarchyEdge::Typing(t) => out.typing.push(TypingEntry {
                    from: from.clone(),
                    to: to.clone(),
                    mapping: t.mapping.clone(),
                    total: t.total,
                    ignore_attrs: t.ignore_attrs.clone(),
                    attrs: t.attrs.clone(),
                }),
                HierarchyEdge::RuleTyping(t) => out.rule_typing.push(RuleTypingEntry {
                    from: from.clone(),
                    to: to.clone(),
                    lhs_mapping: t.lhs_mapping.clone(),
                    rhs_mapping: t.rhs_mapping.clone(),
                    lhs_total: t.lhs_total,
                    rhs_total: t.rhs_total,
                    ignore_attrs: t.ignore_attrs.clone(),
                    attrs: t.attrs.clone(),
                }),
            }
        }
        out
    }

    /// Rebuild a hierarchy through the checked construction API.
    pub fn into_hierarchy(self, config: HierarchyConfig) -> Result<Hierarchy> {
        let directed = config.directed;
        let mut hierarchy = Hierarchy::with_config(config);
        for entry in self.graphs {
            hierarchy.add_graph(entry.id, entry.graph.into_graph(directed)?, entry.attrs)?;
        }
        for entry in self.rules {
            hierarchy.add_rule(entry.id, entry.rule.into_rule(directed)?, entry.attrs)?;
        }
        for entry in self.typing {
            let typing = Typing {
                mapping: entry.mapping,
                total: entry.total,
                ignore_attrs: entry.ignore_attrs,
                attrs: entry.attrs,
            };
            hierarchy.add_typing(entry.from, entry.to, typing)?;
        }
        for entry in self.rule_typing {
            let typing = RuleTyping {
                lhs_mapping: entry.lhs_mapping,
                rhs_mapping: entry.rhs_mapping,
                lhs_total: entry.lhs_total,
                rhs_total: entry.rhs_total,
                ignore_attrs: entry.ignore_attrs,
                attrs: entry.attrs,
            };
            hierarchy.add_rule_typing(entry.from, entry.to, typing)?;
        }
        Ok(hierarchy)
    }
}

impl Hierarchy {
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(HierarchyJson::from_hierarchy(self))?)
    }

    pub fn from_json(value: serde_json::Value, config: HierarchyConfig) -> Result<Hierarchy> {
        serde_json::from_value::<HierarchyJson>(value)?.into_hierarchy(config)
    }

    /// Write the JSON document to `writer`.
    pub fn export_to_writer(&self, writer: &mut dyn Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *writer, &HierarchyJson::from_hierarchy(self))?;
        writeln!(writer)?;
        Ok(())
    }

    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.export_to_writer(&mut writer)?;
        writer.flush()?;
        info!(path = %path.display(), nodes = self.nodes.len(), edges = self.edges.len(), "hierarchy exported");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>, config: HierarchyConfig) -> Result<Hierarchy> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let document: HierarchyJson = serde_json::from_reader(reader)?;
        let hierarchy = document.into_hierarchy(config)?;
        info!(path = %path.display(), nodes = hierarchy.nodes.len(), "hierarchy loaded");
        Ok(hierarchy)
    }
}
