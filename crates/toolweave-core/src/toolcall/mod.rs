//! Tool-call plans
//!
//! A plan is parsed into [`ToolCallNode`]s, placed in a cycle-tolerant
//! [`Dag`] and driven by a caller-supplied [`NodeHandler`].

mod node;
mod parser;

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::dag::{CyclePolicy, Dag, DagError, NodeStatus};
use crate::executor::{DagExecutor, ExecuteError, ExecutionReport, NodeHandler};
use crate::render::{GraphJson, MermaidOptions, RenderError};

pub use node::ToolCallNode;
pub use parser::{parse_tool_call_bytes, parse_tool_call_nodes, ParseError};

/// Graph name used for DOT output
pub const DOT_GRAPH_NAME: &str = "ToolCallDAG";

/// Errors while turning a plan into a DAG
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Dag(#[from] DagError),
}

/// Parse `input` and build a ready-to-run DAG
pub fn build_tool_call_dag(input: &str) -> Result<ToolCallDag, ToolCallError> {
    let nodes = parse_tool_call_nodes(input)?;
    ToolCallDag::from_nodes(nodes)
}

/// A built, executable tool-call graph
#[derive(Debug)]
pub struct ToolCallDag {
    dag: Dag<ToolCallNode>,
    executor: DagExecutor,
}

impl ToolCallDag {
    /// Build from already-parsed nodes. Cycles are broken, not rejected.
    pub fn from_nodes(nodes: Vec<ToolCallNode>) -> Result<Self, ToolCallError> {
        let mut dag = Dag::with_cycle_policy(CyclePolicy::Break);
        dag.add_nodes(nodes)?;
        dag.build()?;
        Ok(Self {
            dag,
            executor: DagExecutor::new(),
        })
    }

    /// Replace the executor (parallelism, progress reporting)
    pub fn with_executor(mut self, executor: DagExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn dag(&self) -> &Dag<ToolCallNode> {
        &self.dag
    }

    /// Run every call through `handler`
    pub async fn execute_with_handler<H>(&self, handler: &H) -> Result<ExecutionReport, ExecuteError>
    where
        H: NodeHandler<ToolCallNode> + ?Sized,
    {
        self.execute_with_cancellation(&CancellationToken::new(), handler)
            .await
    }

    /// Run every call through `handler`, stopping early when `cancel` fires
    pub async fn execute_with_cancellation<H>(
        &self,
        cancel: &CancellationToken,
        handler: &H,
    ) -> Result<ExecutionReport, ExecuteError>
    where
        H: NodeHandler<ToolCallNode> + ?Sized,
    {
        self.executor.execute(&self.dag, cancel, handler).await
    }

    pub fn node_count(&self) -> usize {
        self.dag.node_count()
    }

    pub fn node_by_call_id(&self, call_id: &str) -> Option<&Arc<ToolCallNode>> {
        self.dag.node(call_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<ToolCallNode>> + '_ {
        self.dag.nodes()
    }

    pub fn status(&self, call_id: &str) -> Option<NodeStatus> {
        self.dag.status(call_id)
    }

    /// Error text of a failed call
    pub fn error(&self, call_id: &str) -> Option<String> {
        self.dag.error(call_id)
    }

    /// Calls nothing else waits on
    pub fn entries(&self) -> Vec<&Arc<ToolCallNode>> {
        self.dag.entries().unwrap_or_default()
    }

    pub fn stage(&self, call_id: &str) -> Option<usize> {
        self.dag.stage(call_id).ok()
    }

    pub fn stages(&self) -> Vec<Vec<&Arc<ToolCallNode>>> {
        self.dag.stages().unwrap_or_default()
    }

    /// Dependency cycles that were broken at build time
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        self.dag.find_cycles().unwrap_or_default()
    }

    /// Forget previous runs so the plan can execute again
    pub fn reset(&self) {
        self.dag.reset();
    }

    pub fn mermaid_flowchart(&self, options: &MermaidOptions) -> Result<String, DagError> {
        self.dag.mermaid_flowchart(options)
    }

    pub fn to_dot(&self) -> Result<String, DagError> {
        self.dag.to_dot(DOT_GRAPH_NAME)
    }

    pub fn graph_json(&self) -> Result<GraphJson, DagError> {
        self.dag.graph_json()
    }

    pub fn graph_json_string(&self) -> Result<String, RenderError> {
        self.dag.graph_json_string()
    }
}
