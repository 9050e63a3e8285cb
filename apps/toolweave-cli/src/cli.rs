use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use toolweave_config::{load_config, ToolweaveConfig, DEFAULT_CONFIG_FILE};

#[derive(Debug, Parser)]
#[command(name = "toolweave", about = "Tool-call plan scheduling and stream framing")]
pub struct Cli {
    /// Config file (defaults to ./toolweave.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug-level logging unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Inspect, render or dry-run a tool-call plan
    #[command(subcommand)]
    Plan(PlanCommand),
    /// Cut a byte stream into frames and tag their protocol
    Split(SplitArgs),
}

#[derive(Debug, Subcommand)]
pub enum PlanCommand {
    /// Parse and build the plan, then summarize it
    Validate(PlanFileArgs),
    /// Print the plan as a diagram
    Render(RenderArgs),
    /// Execute the plan with a handler that only logs each call
    Run(RunArgs),
}

#[derive(Debug, Args, Clone)]
pub struct PlanFileArgs {
    /// Plan file; `-` reads stdin
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RenderFormat {
    Mermaid,
    Dot,
    Json,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub plan: PlanFileArgs,
    #[arg(long, value_enum, default_value = "mermaid")]
    pub format: RenderFormat,
    /// Mermaid direction (TB, TD, BT, LR, RL)
    #[arg(long)]
    pub direction: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    /// Emit status classes
    #[arg(long)]
    pub styles: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub plan: PlanFileArgs,
    #[arg(long)]
    pub max_parallel: Option<usize>,
    /// Make the handler fail for this call id (repeatable)
    #[arg(long = "fail", value_name = "CALL_ID")]
    pub fail: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct SplitArgs {
    /// Input file; stdin when omitted
    #[arg(long)]
    pub input: Option<PathBuf>,
    /// time_gap, fixed_size, by_direction or passthrough
    #[arg(long)]
    pub strategy: Option<String>,
    #[arg(long)]
    pub time_gap_ms: Option<u64>,
    #[arg(long)]
    pub max_buffer_size: Option<usize>,
    /// Cut where a read opens with a recognizable protocol message
    #[arg(long)]
    pub protocol_aware: bool,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = resolve_config(self.config.as_deref())?;
        crate::logging::init_tracing_if_needed(&config.observability, self.verbose);

        match self.command {
            Command::Plan(PlanCommand::Validate(args)) => crate::plan::validate(&args).await,
            Command::Plan(PlanCommand::Render(args)) => crate::plan::render(&config, &args).await,
            Command::Plan(PlanCommand::Run(args)) => crate::plan::run(&config, &args).await,
            Command::Split(args) => crate::split::run(&config, &args).await,
        }
    }
}

fn resolve_config(explicit: Option<&Path>) -> anyhow::Result<ToolweaveConfig> {
    if let Some(path) = explicit {
        return load_config(path)
            .with_context(|| format!("failed to load config '{}'", path.display()));
    }
    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return load_config(default_path)
            .with_context(|| format!("failed to load config '{}'", default_path.display()));
    }
    Ok(ToolweaveConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_run_flags() {
        let cli = Cli::try_parse_from([
            "toolweave",
            "--verbose",
            "plan",
            "run",
            "plan.json",
            "--max-parallel",
            "2",
            "--fail",
            "a",
            "--fail",
            "b",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Plan(PlanCommand::Run(args)) => {
                assert_eq!(args.plan.file, PathBuf::from("plan.json"));
                assert_eq!(args.max_parallel, Some(2));
                assert_eq!(args.fail, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_render_defaults_to_mermaid() {
        let cli = Cli::try_parse_from(["toolweave", "plan", "render", "plan.json", "--styles"]).unwrap();
        match cli.command {
            Command::Plan(PlanCommand::Render(args)) => {
                assert_eq!(args.format, RenderFormat::Mermaid);
                assert!(args.styles);
                assert!(args.direction.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_split_with_global_config() {
        let cli = Cli::try_parse_from([
            "toolweave",
            "split",
            "--strategy",
            "fixed_size",
            "--max-buffer-size",
            "512",
            "--protocol-aware",
            "--config",
            "custom.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        match cli.command {
            Command::Split(args) => {
                assert_eq!(args.strategy.as_deref(), Some("fixed_size"));
                assert_eq!(args.max_buffer_size, Some(512));
                assert!(args.protocol_aware);
                assert!(args.input.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["toolweave", "plan", "render", "p.json", "--format", "svg"]).is_err());
    }
}
