//! Executor module
//!
//! The executor drives a built [`Dag`]:
//! - ready-set scheduling, lowest insertion index first
//! - up to `max_parallel` handlers in flight
//! - per-node failure policy via [`DagNode::allow_failed`]
//! - cooperative cancellation through a [`CancellationToken`]

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
pub use tokio_util::sync::CancellationToken;

use crate::dag::{Dag, DagError, DagNode, NodeStatus};

const MAX_LOG_TEXT_CHARS: usize = 2_000;
const DEFAULT_MAX_PARALLEL: usize = 4;

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

/// Error type handlers report failures with
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Execution errors
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Dag(#[from] DagError),

    #[error("node '{node_id}' failed: {source}")]
    NodeFailed {
        node_id: String,
        source: HandlerError,
    },

    #[error("execution cancelled")]
    Cancelled,
}

impl ExecuteError {
    /// Id of the node whose failure stopped the run
    pub fn node_id(&self) -> Option<&str> {
        match self {
            ExecuteError::NodeFailed { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Per-invocation context handed to a [`NodeHandler`]
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub node_id: String,
    /// Fresh id for every handler invocation
    pub execution_id: String,
    /// Fires when the run is cancelled
    pub cancellation_token: CancellationToken,
}

impl NodeContext {
    pub fn new(node_id: impl Into<String>, cancellation_token: CancellationToken) -> Self {
        Self {
            node_id: node_id.into(),
            execution_id: uuid::Uuid::new_v4().to_string(),
            cancellation_token,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// What "executing a node" means. Plain async closures implement it too.
#[async_trait]
pub trait NodeHandler<T>: Send + Sync {
    async fn handle(&self, ctx: NodeContext, node: Arc<T>) -> Result<(), HandlerError>;
}

#[async_trait]
impl<T, F, Fut> NodeHandler<T> for F
where
    T: Send + Sync + 'static,
    F: Fn(NodeContext, Arc<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, ctx: NodeContext, node: Arc<T>) -> Result<(), HandlerError> {
        (self)(ctx, node).await
    }
}

/// Terminal state of one node after a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutcome {
    pub node_id: String,
    pub status: NodeStatus,
    pub error: Option<String>,
}

/// Outcomes of a run, in the order nodes finished
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub outcomes: Vec<NodeOutcome>,
}

impl ExecutionReport {
    fn ids_with(&self, status: NodeStatus) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.status == status)
            .map(|o| o.node_id.as_str())
            .collect()
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.ids_with(NodeStatus::Completed)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.ids_with(NodeStatus::Failed)
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.ids_with(NodeStatus::Skipped)
    }

    pub fn outcome(&self, node_id: &str) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| o.node_id == node_id)
    }
}

/// Realtime execution progress event.
#[derive(Debug, Clone)]
pub struct ExecutionProgressEvent {
    pub node_id: Option<String>,
    /// Phase label, e.g. node_started/node_completed/run_completed.
    pub phase: String,
    pub message: Option<String>,
    /// Extra structured metadata.
    pub metadata: serde_json::Value,
}

impl ExecutionProgressEvent {
    pub fn new(node_id: Option<String>, phase: impl Into<String>) -> Self {
        Self {
            node_id,
            phase: phase.into(),
            message: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Sink interface for execution progress reporting.
#[async_trait]
pub trait ExecutionProgressReporter: Send + Sync {
    async fn report(&self, event: ExecutionProgressEvent) -> Result<(), String>;
}

enum Halt {
    Failed { node_id: String, source: HandlerError },
    Cancelled,
}

/// The executor - orchestrates DAG execution
#[derive(Clone)]
pub struct DagExecutor {
    /// Maximum handlers in flight
    pub max_parallel: usize,
    progress_reporter: Option<Arc<dyn ExecutionProgressReporter>>,
}

impl std::fmt::Debug for DagExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagExecutor")
            .field("max_parallel", &self.max_parallel)
            .field("progress_reporter", &self.progress_reporter.is_some())
            .finish()
    }
}

impl Default for DagExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl DagExecutor {
    pub fn new() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            progress_reporter: None,
        }
    }

    /// Set maximum parallel executions (0 is treated as 1)
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max.max(1);
        self
    }

    /// Attach a realtime execution progress reporter.
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ExecutionProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Run every node of `dag` through `handler`.
    ///
    /// Returns once all reachable nodes finished, a strict node failed, or
    /// `cancel` fired. In the last two cases in-flight handlers are awaited
    /// and nodes that never started are marked [`NodeStatus::Skipped`].
    pub async fn execute<T, H>(
        &self,
        dag: &Dag<T>,
        cancel: &CancellationToken,
        handler: &H,
    ) -> Result<ExecutionReport, ExecuteError>
    where
        T: DagNode + 'static,
        H: NodeHandler<T> + ?Sized,
    {
        if !dag.is_built() {
            return Err(DagError::NotBuilt.into());
        }

        let count = dag.node_count();
        let mut remaining: Vec<usize> = (0..count)
            .map(|idx| dag.schedule_dependencies_at(idx).len())
            .collect();
        let mut ready: BTreeSet<usize> = (0..count).filter(|&idx| remaining[idx] == 0).collect();
        let mut in_flight = FuturesUnordered::new();
        let mut report = ExecutionReport::default();
        let mut halt: Option<Halt> = None;

        tracing::info!(
            nodes = count,
            max_parallel = self.max_parallel,
            "dag execution started"
        );

        loop {
            if halt.is_none() && cancel.is_cancelled() {
                halt = Some(Halt::Cancelled);
            }

            if halt.is_none() {
                while in_flight.len() < self.max_parallel {
                    let Some(idx) = ready.pop_first() else {
                        break;
                    };
                    let node = dag.node_at(idx).clone();
                    if !dag.try_execute_at(idx) {
                        let status = dag.status_at(idx);
                        tracing::debug!(
                            node_id = %node.id(),
                            status = %status,
                            "node already executed; skipping"
                        );
                        match status {
                            NodeStatus::Completed => {
                                release(dag, idx, &mut remaining, &mut ready);
                            }
                            NodeStatus::Failed if node.allow_failed() => {
                                release(dag, idx, &mut remaining, &mut ready);
                            }
                            NodeStatus::Failed => {
                                // A strict failure from an earlier run still blocks its dependents.
                                let message = dag
                                    .error(node.id())
                                    .unwrap_or_else(|| "failed in an earlier run".to_string());
                                halt = Some(Halt::Failed {
                                    node_id: node.id().to_string(),
                                    source: message.into(),
                                });
                                break;
                            }
                            _ => {}
                        }
                        continue;
                    }

                    let ctx = NodeContext::new(node.id(), cancel.clone());
                    dag.record_at(idx, NodeStatus::Processing, None);
                    tracing::info!(
                        node_id = %node.id(),
                        execution_id = %ctx.execution_id,
                        stage = dag.stage_at(idx),
                        "node execution started"
                    );
                    self.report_progress(
                        ExecutionProgressEvent::new(Some(node.id().to_string()), "node_started")
                            .with_metadata(serde_json::json!({
                                "execution_id": ctx.execution_id,
                                "stage": dag.stage_at(idx),
                            })),
                    )
                    .await;

                    in_flight.push(async move {
                        let result = handler.handle(ctx, node).await;
                        (idx, result)
                    });
                }
            }

            if in_flight.is_empty() {
                break;
            }

            let (idx, result) = tokio::select! {
                Some(done) = in_flight.next() => done,
                _ = cancel.cancelled(), if halt.is_none() => {
                    tracing::warn!("dag execution cancelled; waiting for in-flight nodes");
                    halt = Some(Halt::Cancelled);
                    continue;
                }
            };

            let node = dag.node_at(idx);
            match result {
                Ok(()) => {
                    dag.record_at(idx, NodeStatus::Completed, None);
                    tracing::info!(node_id = %node.id(), "node execution completed");
                    self.report_progress(ExecutionProgressEvent::new(
                        Some(node.id().to_string()),
                        "node_completed",
                    ))
                    .await;
                    report.outcomes.push(NodeOutcome {
                        node_id: node.id().to_string(),
                        status: NodeStatus::Completed,
                        error: None,
                    });
                    release(dag, idx, &mut remaining, &mut ready);
                }
                Err(err) => {
                    let message = err.to_string();
                    dag.record_at(idx, NodeStatus::Failed, Some(message.clone()));
                    self.report_progress(
                        ExecutionProgressEvent::new(Some(node.id().to_string()), "node_failed")
                            .with_message(message.clone()),
                    )
                    .await;
                    report.outcomes.push(NodeOutcome {
                        node_id: node.id().to_string(),
                        status: NodeStatus::Failed,
                        error: Some(message.clone()),
                    });

                    if node.allow_failed() {
                        tracing::warn!(
                            node_id = %node.id(),
                            error = %truncate_for_log(&message, MAX_LOG_TEXT_CHARS),
                            "node execution failed; failure tolerated"
                        );
                        release(dag, idx, &mut remaining, &mut ready);
                    } else {
                        tracing::error!(
                            node_id = %node.id(),
                            error = %truncate_for_log(&message, MAX_LOG_TEXT_CHARS),
                            "node execution failed"
                        );
                        if halt.is_none() {
                            halt = Some(Halt::Failed {
                                node_id: node.id().to_string(),
                                source: err,
                            });
                        }
                    }
                }
            }
        }

        let Some(halt) = halt else {
            tracing::info!(
                completed = report.succeeded().len(),
                failed = report.failed().len(),
                "dag execution completed"
            );
            self.report_progress(ExecutionProgressEvent::new(None, "run_completed"))
                .await;
            return Ok(report);
        };

        for idx in 0..count {
            if dag.status_at(idx) != NodeStatus::Pending {
                continue;
            }
            let node_id = dag.node_at(idx).id().to_string();
            dag.record_at(idx, NodeStatus::Skipped, None);
            tracing::debug!(node_id = %node_id, "node skipped");
            self.report_progress(ExecutionProgressEvent::new(
                Some(node_id.clone()),
                "node_skipped",
            ))
            .await;
            report.outcomes.push(NodeOutcome {
                node_id,
                status: NodeStatus::Skipped,
                error: None,
            });
        }

        let error = match halt {
            Halt::Failed { node_id, source } => ExecuteError::NodeFailed { node_id, source },
            Halt::Cancelled => ExecuteError::Cancelled,
        };
        self.report_progress(
            ExecutionProgressEvent::new(error.node_id().map(str::to_string), "run_failed")
                .with_message(error.to_string())
                .with_metadata(serde_json::json!({
                    "skipped": report.skipped(),
                    "failed": report.failed(),
                })),
        )
        .await;
        Err(error)
    }

    async fn report_progress(&self, event: ExecutionProgressEvent) {
        if let Some(reporter) = &self.progress_reporter {
            if let Err(err) = reporter.report(event).await {
                tracing::warn!("failed to report execution progress: {}", err);
            }
        }
    }
}

fn release<T: DagNode>(
    dag: &Dag<T>,
    idx: usize,
    remaining: &mut [usize],
    ready: &mut BTreeSet<usize>,
) {
    for &next in dag.schedule_dependents_at(idx) {
        remaining[next] = remaining[next].saturating_sub(1);
        if remaining[next] == 0 {
            ready.insert(next);
        }
    }
}
