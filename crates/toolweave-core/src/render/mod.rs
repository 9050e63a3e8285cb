//! Text renderers for built DAGs: Mermaid flowcharts, Graphviz DOT and a
//! node/edge JSON document.

mod dot;
mod graph_json;
mod mermaid;

use thiserror::Error;

use crate::dag::DagError;

pub use dot::quote_dot;
pub use graph_json::{GraphCategory, GraphEdge, GraphJson, GraphNode};
pub use mermaid::{
    escape_mermaid_label, sanitize_mermaid_id, validate_mermaid_id, MermaidDirection,
    MermaidOptions,
};

/// Rendering errors
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Dag(#[from] DagError),

    #[error("graph json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
