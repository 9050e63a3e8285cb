//! Node/edge JSON export for chart front-ends

use serde::Serialize;

use super::RenderError;
use crate::dag::{Dag, DagError, DagNode, NodeStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub status: NodeStatus,
    /// Index into [`GraphJson::categories`]
    pub category: usize,
    pub stage: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphCategory {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphJson {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub categories: Vec<GraphCategory>,
}

impl<T: DagNode> Dag<T> {
    pub fn graph_json(&self) -> Result<GraphJson, DagError> {
        let edges = self
            .edges()?
            .into_iter()
            .map(|(source, target)| GraphEdge {
                source: source.to_string(),
                target: target.to_string(),
            })
            .collect();

        let nodes = self
            .nodes()
            .enumerate()
            .map(|(idx, node)| {
                let status = self.status_at(idx);
                GraphNode {
                    id: node.id().to_string(),
                    name: node.label(),
                    status,
                    category: status.category(),
                    stage: self.stage_at(idx),
                }
            })
            .collect();

        let categories = NodeStatus::ALL
            .iter()
            .map(|status| GraphCategory {
                name: status.to_string(),
            })
            .collect();

        Ok(GraphJson {
            nodes,
            edges,
            categories,
        })
    }

    pub fn graph_json_string(&self) -> Result<String, RenderError> {
        let graph = self.graph_json()?;
        Ok(serde_json::to_string(&graph)?)
    }
}
