use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use toolweave_config::ToolweaveConfig;
use toolweave_core::executor::{
    ExecutionProgressEvent, ExecutionProgressReporter, HandlerError, NodeContext, NodeHandler,
};
use toolweave_core::render::MermaidDirection;
use toolweave_core::{build_tool_call_dag, DagExecutor, NodeStatus, ToolCallDag, ToolCallNode};

use crate::cli::{PlanFileArgs, RenderArgs, RenderFormat, RunArgs};

const INTENT_LOG_CHARS: usize = 120;

async fn load_plan(path: &Path) -> anyhow::Result<ToolCallDag> {
    let text = if path == Path::new("-") {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("failed to read plan from stdin")?;
        text
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read plan '{}'", path.display()))?
    };
    let dag = build_tool_call_dag(&text)
        .with_context(|| format!("invalid plan '{}'", path.display()))?;
    tracing::debug!(path = %path.display(), calls = dag.node_count(), "plan loaded");
    Ok(dag)
}

pub async fn validate(args: &PlanFileArgs) -> anyhow::Result<()> {
    let dag = load_plan(&args.file).await?;
    print!("{}", summarize(&dag));
    Ok(())
}

pub async fn render(config: &ToolweaveConfig, args: &RenderArgs) -> anyhow::Result<()> {
    let dag = load_plan(&args.plan.file).await?;
    println!("{}", render_plan(&dag, config, args)?);
    Ok(())
}

pub async fn run(config: &ToolweaveConfig, args: &RunArgs) -> anyhow::Result<()> {
    let max_parallel = args.max_parallel.unwrap_or(config.executor.max_parallel);
    let dag = load_plan(&args.plan.file).await?.with_executor(
        DagExecutor::new()
            .with_max_parallel(max_parallel)
            .with_progress_reporter(Arc::new(LogProgressReporter)),
    );
    let handler = DryRunHandler::new(args.fail.iter().cloned());

    let result = dag.execute_with_handler(&handler).await;
    print!("{}", status_table(&dag));
    match result {
        Ok(report) => {
            println!(
                "run completed: {} succeeded, {} failed, {} skipped",
                report.succeeded().len(),
                report.failed().len(),
                report.skipped().len()
            );
            Ok(())
        }
        Err(err) => Err(anyhow::Error::new(err).context("plan run failed")),
    }
}

fn summarize(dag: &ToolCallDag) -> String {
    let mut out = String::new();
    let stages = dag.stages();
    let _ = writeln!(out, "calls: {}", dag.node_count());
    let _ = writeln!(out, "stages: {}", stages.len());
    for (index, stage) in stages.iter().enumerate() {
        let names: Vec<String> = stage.iter().map(|node| node.display_name()).collect();
        let _ = writeln!(out, "  stage {}: {}", index, names.join(", "));
    }
    let entries: Vec<&str> = dag
        .entries()
        .into_iter()
        .map(|node| node.call_id.as_str())
        .collect();
    let _ = writeln!(out, "entries: {}", entries.join(", "));

    let cycles = dag.find_cycles();
    if cycles.is_empty() {
        let _ = writeln!(out, "cycles: none");
    } else {
        let _ = writeln!(out, "cycles: {}", cycles.len());
        for cycle in cycles {
            let mut path = cycle.clone();
            if let Some(first) = cycle.first() {
                path.push(first.clone());
            }
            let _ = writeln!(out, "  {}", path.join(" -> "));
        }
    }
    out
}

fn render_plan(
    dag: &ToolCallDag,
    config: &ToolweaveConfig,
    args: &RenderArgs,
) -> anyhow::Result<String> {
    let rendered = match args.format {
        RenderFormat::Mermaid => {
            let mut options = config.render.mermaid_options()?;
            if let Some(direction) = &args.direction {
                options.direction = MermaidDirection::parse(direction)
                    .with_context(|| format!("unknown mermaid direction '{}'", direction))?;
            }
            if let Some(title) = &args.title {
                options = options.with_title(title.clone());
            }
            if args.styles {
                options = options.with_styles();
            }
            dag.mermaid_flowchart(&options)?
        }
        RenderFormat::Dot => dag.to_dot()?,
        RenderFormat::Json => dag.graph_json_string()?,
    };
    Ok(rendered)
}

fn status_table(dag: &ToolCallDag) -> String {
    let mut out = String::new();
    for node in dag.nodes() {
        let status = dag.status(&node.call_id).unwrap_or(NodeStatus::Pending);
        match dag.error(&node.call_id) {
            Some(error) => {
                let _ = writeln!(out, "{:<32} {:<10} {}", node.display_name(), status.as_str(), error);
            }
            None => {
                let _ = writeln!(out, "{:<32} {}", node.display_name(), status);
            }
        }
    }
    out
}

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str("...");
    preview
}

/// Logs each call instead of invoking a tool. Calls listed in `fail` error out.
struct DryRunHandler {
    fail: HashSet<String>,
}

impl DryRunHandler {
    fn new(fail: impl IntoIterator<Item = String>) -> Self {
        Self {
            fail: fail.into_iter().collect(),
        }
    }
}

#[async_trait]
impl NodeHandler<ToolCallNode> for DryRunHandler {
    async fn handle(&self, ctx: NodeContext, node: Arc<ToolCallNode>) -> Result<(), HandlerError> {
        tracing::info!(
            call_id = %node.call_id,
            tool = %node.tool_name,
            execution_id = %ctx.execution_id,
            intent = %truncate_for_log(&node.call_intent, INTENT_LOG_CHARS),
            "dry-run tool call"
        );
        if self.fail.contains(&node.call_id) {
            return Err(format!("injected failure for '{}'", node.call_id).into());
        }
        Ok(())
    }
}

struct LogProgressReporter;

#[async_trait]
impl ExecutionProgressReporter for LogProgressReporter {
    async fn report(&self, event: ExecutionProgressEvent) -> Result<(), String> {
        tracing::debug!(
            node_id = event.node_id.as_deref().unwrap_or("-"),
            phase = %event.phase,
            message = event.message.as_deref().unwrap_or(""),
            "execution progress"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use toolweave_core::ExecuteError;

    use super::*;

    const PLAN: &str = r#"[
        {"call_id": "fetch", "tool_name": "http_get", "depends_on": []},
        {"call_id": "parse", "tool_name": "html_parse", "depends_on": ["fetch"]},
        {"call_id": "store", "tool_name": "db_write", "depends_on": ["parse"]}
    ]"#;

    fn render_args(format: RenderFormat) -> RenderArgs {
        RenderArgs {
            plan: PlanFileArgs {
                file: PathBuf::from("plan.json"),
            },
            format,
            direction: None,
            title: None,
            styles: false,
        }
    }

    #[test]
    fn test_summarize_chain() {
        let dag = build_tool_call_dag(PLAN).unwrap();
        let summary = summarize(&dag);
        assert!(summary.contains("calls: 3\n"));
        assert!(summary.contains("stages: 3\n"));
        assert!(summary.contains("  stage 1: parse(html_parse)\n"));
        assert!(summary.contains("entries: store\n"));
        assert!(summary.contains("cycles: none\n"));
    }

    #[test]
    fn test_summarize_reports_cycles() {
        let dag = build_tool_call_dag(
            r#"[
                {"call_id": "a", "tool_name": "t", "depends_on": ["b"]},
                {"call_id": "b", "tool_name": "t", "depends_on": ["a"]}
            ]"#,
        )
        .unwrap();
        let summary = summarize(&dag);
        assert!(summary.contains("cycles: 1\n"));
        assert!(summary.contains("  a -> b -> a\n"), "{summary}");
    }

    #[test]
    fn test_render_formats() {
        let dag = build_tool_call_dag(PLAN).unwrap();
        let config = ToolweaveConfig::default();

        let mermaid = render_plan(&dag, &config, &render_args(RenderFormat::Mermaid)).unwrap();
        assert!(mermaid.starts_with("flowchart TB\n"));
        assert!(mermaid.contains("fetch --> parse"));

        let mut args = render_args(RenderFormat::Mermaid);
        args.direction = Some("lr".to_string());
        args.title = Some("Crawl".to_string());
        let mermaid = render_plan(&dag, &config, &args).unwrap();
        assert!(mermaid.starts_with("%% Crawl\nflowchart LR\n"));

        let dot = render_plan(&dag, &config, &render_args(RenderFormat::Dot)).unwrap();
        assert!(dot.starts_with("digraph ToolCallDAG {"));

        let json = render_plan(&dag, &config, &render_args(RenderFormat::Json)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["nodes"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_render_rejects_unknown_direction() {
        let dag = build_tool_call_dag(PLAN).unwrap();
        let mut args = render_args(RenderFormat::Mermaid);
        args.direction = Some("sideways".to_string());
        assert!(render_plan(&dag, &ToolweaveConfig::default(), &args).is_err());
    }

    #[test]
    fn test_dry_run_completes_plan() {
        tokio_test::block_on(async {
            let dag = build_tool_call_dag(PLAN).unwrap();
            let report = dag
                .execute_with_handler(&DryRunHandler::new(Vec::new()))
                .await
                .unwrap();
            assert_eq!(report.succeeded(), vec!["fetch", "parse", "store"]);
            assert!(status_table(&dag).contains("completed"));
        });
    }

    #[test]
    fn test_injected_failure_skips_dependents() {
        tokio_test::block_on(async {
            let dag = build_tool_call_dag(PLAN).unwrap();
            let handler = DryRunHandler::new(vec!["parse".to_string()]);
            let err = dag.execute_with_handler(&handler).await.unwrap_err();
            assert!(matches!(err, ExecuteError::NodeFailed { ref node_id, .. } if node_id == "parse"));
            assert_eq!(dag.status("fetch"), Some(NodeStatus::Completed));
            assert_eq!(dag.status("parse"), Some(NodeStatus::Failed));
            assert_eq!(dag.status("store"), Some(NodeStatus::Skipped));

            let table = status_table(&dag);
            assert!(table.contains("injected failure for 'parse'"));
        });
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("abcdefghijkl", 4), "abcd...");
    }
}
