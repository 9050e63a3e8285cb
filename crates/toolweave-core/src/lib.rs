//! # Toolweave Core
//!
//! Deterministic graph logic for tool-call plans.
//!
//! This crate contains:
//! - A generic dependency DAG with tolerant edge resolution
//! - A concurrent, failure-policy aware executor
//! - Tool-call plan parsing and the tool-call DAG built on top
//! - Mermaid / DOT / JSON renderers
//!
//! This crate does NOT care about:
//! - What a tool actually does (that is the caller's handler)
//! - Where plans come from or where diagrams are written

pub mod dag;
pub mod executor;
pub mod render;
pub mod toolcall;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::dag::{CyclePolicy, Dag, DagError, DagNode, NodeStatus};
    pub use crate::executor::{
        CancellationToken, DagExecutor, ExecuteError, ExecutionProgressEvent,
        ExecutionProgressReporter, ExecutionReport, HandlerError, NodeContext, NodeHandler,
        NodeOutcome,
    };
    pub use crate::render::{
        escape_mermaid_label, sanitize_mermaid_id, validate_mermaid_id, GraphJson,
        MermaidDirection, MermaidOptions, RenderError,
    };
    pub use crate::toolcall::{
        build_tool_call_dag, parse_tool_call_bytes, parse_tool_call_nodes, ParseError,
        ToolCallDag, ToolCallError, ToolCallNode,
    };
}

// Re-export key types at crate root
pub use dag::{CyclePolicy, Dag, DagError, DagNode, NodeStatus};
pub use executor::{DagExecutor, ExecuteError, ExecutionReport, NodeContext, NodeHandler};
pub use toolcall::{build_tool_call_dag, ToolCallDag, ToolCallError, ToolCallNode};
