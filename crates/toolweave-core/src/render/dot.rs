//! Graphviz DOT output

use std::fmt::Write as _;

use crate::dag::{Dag, DagError, DagNode, NodeStatus};

fn fill_color(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Pending => "lightgrey",
        NodeStatus::Processing => "lightyellow",
        NodeStatus::Completed => "lightgreen",
        NodeStatus::Failed => "lightcoral",
        NodeStatus::Skipped => "lightblue",
    }
}

/// Quote a DOT identifier or attribute value.
pub fn quote_dot(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl<T: DagNode> Dag<T> {
    /// Render as a `digraph`, one filled box per node coloured by status
    pub fn to_dot(&self, graph_name: &str) -> Result<String, DagError> {
        if self.is_empty() {
            return Err(DagError::EmptyDag);
        }
        let edges = self.edges()?;

        let mut out = String::new();
        let _ = writeln!(out, "digraph {} {{", graph_name);
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=filled];\n");
        for node in self.nodes() {
            let status = self.status(node.id()).unwrap_or_default();
            let _ = writeln!(
                out,
                "    {} [label={}, fillcolor={}];",
                quote_dot(node.id()),
                quote_dot(&node.label()),
                quote_dot(fill_color(status))
            );
        }
        for (from, to) in edges {
            let _ = writeln!(out, "    {} -> {};", quote_dot(from), quote_dot(to));
        }
        out.push_str("}\n");
        Ok(out)
    }
}
