//! Diagnostic views of a proof graph: the textual dump, an indented tree
//! view, and a JSON-ready export.
//!
//! All three cover expanded states and interpreter edges only; synthetic
//! restart and true-loop edges are implied and left out.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

use super::{ProofGraph, StateId};

/// Expanded edges of the graph in state order.
fn expanded_edges(graph: &mut dyn ProofGraph) -> Result<Vec<(StateId, super::Outlink)>, GraphError> {
    let mut edges = Vec::new();
    for id in 0..graph.node_count() {
        if !graph.is_expanded(id) {
            continue;
        }
        for outlink in graph.outlinks(id)? {
            edges.push((id, outlink));
        }
    }
    Ok(edges)
}

/// Textual dump: `nodes\tedges\tf1:f2:…\tsrc->dst:fid@value,…\t…`.
///
/// Feature ids index the colon-separated feature list, which holds the
/// features used by the dumped edges in sorted order.
pub fn serialize(graph: &mut dyn ProofGraph) -> Result<String, GraphError> {
    let edges = expanded_edges(graph)?;
    let mut names: Vec<String> = edges
        .iter()
        .flat_map(|(_, o)| o.features.keys().map(|f| f.to_string()))
        .collect();
    names.sort();
    names.dedup();
    let ids: BTreeMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    let mut out = format!(
        "{}\t{}\t{}",
        graph.node_count(),
        edges.len(),
        names.join(":")
    );
    for (src, outlink) in &edges {
        let features: Vec<String> = outlink
            .features
            .iter()
            .map(|(f, v)| format!("{}@{v}", ids.get(f.as_str()).copied().unwrap_or(0)))
            .collect();
        let _ = write!(out, "\t{src}->{}:{}", outlink.child, features.join(","));
    }
    Ok(out)
}

/// Indented tree of states reachable from `root`, `depth` levels deep.
///
/// Expands states as it goes. A state already printed higher up the current
/// path is shown once more, marked `(cycle)`, and not descended into.
pub fn tree_view(
    graph: &mut dyn ProofGraph,
    depth: usize,
    root: StateId,
) -> Result<String, GraphError> {
    if graph.state(root).is_none() {
        return Err(GraphError::UnknownState {
            id: root,
            size: graph.node_count(),
        });
    }
    let mut out = String::new();
    let mut path = Vec::new();
    write_tree(graph, root, None, 0, depth, &mut path, &mut out)?;
    Ok(out)
}

fn write_tree(
    graph: &mut dyn ProofGraph,
    id: StateId,
    features: Option<String>,
    level: usize,
    depth: usize,
    path: &mut Vec<StateId>,
    out: &mut String,
) -> Result<(), GraphError> {
    let constants = std::sync::Arc::clone(graph.constants());
    let description = graph
        .state(id)
        .map(|s| s.describe(&constants))
        .unwrap_or_default();
    let cycle = path.contains(&id);
    let _ = write!(out, "{}{id}: {description}", "  ".repeat(level));
    if let Some(features) = features {
        let _ = write!(out, "  {features}");
    }
    if cycle {
        out.push_str("  (cycle)");
    }
    out.push('\n');
    if cycle || level >= depth {
        return Ok(());
    }
    path.push(id);
    for outlink in graph.outlinks(id)? {
        let label = crate::weight::describe_features(&outlink.features);
        write_tree(graph, outlink.child, Some(label), level + 1, depth, path, out)?;
    }
    path.pop();
    Ok(())
}

/// One node of a [`GraphExport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExport {
    pub id: StateId,
    pub description: String,
    pub completed: bool,
    pub expanded: bool,
}

/// One interpreter edge of a [`GraphExport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeExport {
    pub src: StateId,
    pub dst: StateId,
    pub features: BTreeMap<String, f64>,
}

/// Serializable snapshot of a proof graph, mirroring [`serialize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub query: String,
    pub nodes: Vec<NodeExport>,
    pub edges: Vec<EdgeExport>,
}

impl GraphExport {
    pub fn from_graph(graph: &mut dyn ProofGraph) -> Result<Self, GraphError> {
        let edges = expanded_edges(graph)?
            .into_iter()
            .map(|(src, outlink)| EdgeExport {
                src,
                dst: outlink.child,
                features: outlink
                    .features
                    .into_iter()
                    .map(|(f, v)| (f.to_string(), v))
                    .collect(),
            })
            .collect();
        let constants = std::sync::Arc::clone(graph.constants());
        let nodes = (0..graph.node_count())
            .filter_map(|id| {
                let state = graph.state(id)?;
                Some(NodeExport {
                    id,
                    description: state.describe(&constants),
                    completed: state.is_completed(),
                    expanded: graph.is_expanded(id),
                })
            })
            .collect();
        Ok(Self {
            query: graph.query().query().to_string(),
            nodes,
            edges,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StateProofGraph;
    use crate::graph::test_support::{FRIENDS, query};

    fn expanded_graph() -> StateProofGraph {
        let (query, context) = query(FRIENDS, "main(X)");
        let mut g = StateProofGraph::new(query, &context).unwrap();
        let mut id = 0;
        while id < g.node_count() {
            g.outlinks(id).unwrap();
            id += 1;
        }
        g
    }

    #[test]
    fn serialize_lists_expanded_edges() {
        let mut g = expanded_graph();
        let dump = serialize(&mut g).unwrap();
        let fields: Vec<&str> = dump.split('\t').collect();
        assert_eq!(fields[0], "4");
        assert_eq!(fields[1], "3");
        assert_eq!(fields[2], "id(defaultRule)");
        assert_eq!(&fields[3..], ["0->1:0@1", "1->2:0@1", "1->3:0@1"]);
    }

    #[test]
    fn tree_view_indents_by_depth() {
        let mut g = expanded_graph();
        let tree = tree_view(&mut g, 5, 0).unwrap();
        let lines: Vec<&str> = tree.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("0: main(_"));
        assert!(lines[1].starts_with("  1: friend("));
        assert!(lines[2].starts_with("    2: done [alice]"));
        assert!(lines[3].starts_with("    3: done [bob]"));

        let shallow = tree_view(&mut g, 1, 0).unwrap();
        assert_eq!(shallow.lines().count(), 2);
        assert!(tree_view(&mut g, 1, 99).is_err());
    }

    #[test]
    fn export_round_trips_through_json() {
        let mut g = expanded_graph();
        let export = GraphExport::from_graph(&mut g).unwrap();
        assert_eq!(export.query, "main(X)");
        assert_eq!(export.nodes.len(), 4);
        assert_eq!(export.edges.len(), 3);
        let json = export.to_json().unwrap();
        let back: GraphExport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, export);
    }
}
