//! CLI command definitions for agent-evals.
//!
//! Two subcommands: `eval-tasks` runs an agent against task files and appends
//! answer records, `autograde` grades a predictions file and writes the
//! graded frame.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::info;

use crate::agents::{AgentActionType, AgentConfig};
use crate::grader::autograde_file;
use crate::llm::{build_provider, LlmProvider, ModelKind};
use crate::runner::{EvalRunConfig, EvalRunner};

/// Default main model for evaluation.
const DEFAULT_MODEL_ID: &str = "openai/gpt-4o";

/// Default model backing the `search` tool.
const DEFAULT_SEARCH_MODEL_ID: &str = "openai/gpt-4o-mini";

/// Default root for answer files.
const DEFAULT_OUTPUT_DIR: &str = "./evals";

/// Task files evaluated when `--eval-tasks` is not given.
const DEFAULT_TASK_FILES: [&str; 2] = ["data/frames_test.csv", "data/simpleqa_test.csv"];

/// Default agent step cap per trial.
const DEFAULT_MAX_STEPS: u32 = 10;

/// Default per-trial wall-clock timeout in seconds.
const DEFAULT_TASK_TIMEOUT_SECS: u64 = 600;

/// Parallel evaluation harness for LLM agents on QA benchmarks.
#[derive(Parser)]
#[command(name = "agent-evals")]
#[command(about = "Evaluate LLM agents on QA task files and autograde the results")]
#[command(version)]
#[command(
    long_about = "agent-evals runs LLM agents against CSV task files of question/answer rows,\nappends one JSONL answer record per (row, trial), and autogrades prediction files.\n\nExample usage:\n  agent-evals eval-tasks --model-id openai/gpt-4o --agent-action-type codeact\n  agent-evals autograde --csv-path evals/answers.jsonl --output-path graded.csv"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run an agent against task files and append answer records.
    ///
    /// Each task row is evaluated for `--num-trials` trials across
    /// `--parallel-workers` concurrent workers. Answers land under
    /// `<output-dir>/answers/`; re-running the same configuration skips
    /// (question, trial) pairs that already have a record.
    #[command(name = "eval-tasks", alias = "eval")]
    EvalTasks(EvalTasksArgs),

    /// Grade a predictions file and write the graded frame.
    #[command(alias = "grade")]
    Autograde(AutogradeArgs),
}

/// Arguments for `agent-evals eval-tasks`.
#[derive(Parser, Debug)]
pub struct EvalTasksArgs {
    /// Run date stamped into answer file names (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long)]
    pub date: Option<String>,

    /// Task CSV files to evaluate.
    #[arg(long = "eval-tasks", num_args = 1.., default_values = DEFAULT_TASK_FILES)]
    pub eval_tasks: Vec<PathBuf>,

    /// Model backing the `search` tool.
    #[arg(long, default_value = DEFAULT_SEARCH_MODEL_ID)]
    pub search_model_id: String,

    /// Provider kind for both the main and search models.
    #[arg(long, value_enum, default_value_t = ModelKind::LiteLlm)]
    pub model_type: ModelKind,

    /// Main model identifier.
    #[arg(long, default_value = DEFAULT_MODEL_ID)]
    pub model_id: String,

    /// Agent loop used per trial.
    #[arg(long, value_enum, default_value_t = AgentActionType::Codeact)]
    pub agent_action_type: AgentActionType,

    /// Number of concurrently running trials.
    #[arg(long, default_value_t = 8)]
    pub parallel_workers: usize,

    /// Trials per task row.
    #[arg(long, default_value_t = 1)]
    pub num_trials: usize,

    /// Root directory for answer files.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// LiteLLM API key (can also be set via LITELLM_API_KEY env var).
    #[arg(long, env = "LITELLM_API_KEY")]
    pub api_key: Option<String>,

    /// Hugging Face token for HfApiModel (can also be set via HF_TOKEN env var).
    #[arg(long, env = "HF_TOKEN")]
    pub hf_token: Option<String>,

    /// Maximum agent steps per trial.
    #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
    pub max_steps: u32,

    /// Per-trial timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TASK_TIMEOUT_SECS)]
    pub task_timeout: u64,

    /// Print the run summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `agent-evals autograde`.
#[derive(Parser, Debug)]
pub struct AutogradeArgs {
    /// Predictions file to grade (.csv or .jsonl).
    #[arg(long, alias = "csv_path")]
    pub csv_path: PathBuf,

    /// Destination for the graded frame (.csv or .jsonl).
    #[arg(long, alias = "output_path")]
    pub output_path: PathBuf,

    /// Print the grade report as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// This is a convenience function that parses CLI args and runs the command.
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the agent-evals CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::EvalTasks(args) => run_eval_tasks_command(args).await,
        Commands::Autograde(args) => run_autograde_command(args).await,
    }
}

// ============================================================================
// eval-tasks
// ============================================================================

async fn run_eval_tasks_command(args: EvalTasksArgs) -> anyhow::Result<()> {
    for path in &args.eval_tasks {
        if !path.exists() {
            anyhow::bail!("Task file does not exist: {}", path.display());
        }
    }

    let date = match &args.date {
        Some(raw) => validate_date(raw)?,
        None => Utc::now().format("%Y-%m-%d").to_string(),
    };

    let api_key = match args.model_type {
        ModelKind::LiteLlm => args.api_key.clone(),
        ModelKind::HfApi => args.hf_token.clone(),
    };
    let llm_client: Arc<dyn LlmProvider> =
        build_provider(args.model_type, &args.model_id, api_key.clone()).map_err(|e| {
            anyhow::anyhow!(
                "Failed to initialize {} client: {e}. \
                 Provide --api-key / --hf-token or set the matching env var.",
                args.model_type
            )
        })?;
    let search_client: Arc<dyn LlmProvider> =
        build_provider(args.model_type, &args.search_model_id, api_key)
            .context("Failed to initialize search model client")?;
    info!(
        model_id = %args.model_id,
        search_model_id = %args.search_model_id,
        model_type = %args.model_type,
        "Initialized model clients"
    );

    let config = EvalRunConfig {
        date,
        model_id: args.model_id.clone(),
        agent_action: args.agent_action_type,
        parallel_workers: args.parallel_workers,
        num_trials: args.num_trials,
        output_dir: args.output_dir.clone(),
        task_timeout: Duration::from_secs(args.task_timeout),
        agent: AgentConfig::default().with_max_steps(args.max_steps),
    };

    let runner = EvalRunner::new(llm_client, search_client, &args.search_model_id, config);
    let summary = runner.run(&args.eval_tasks).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("\n=== Evaluation Results ===");
    println!("Model:    {}", summary.model_id);
    println!("Agent:    {}", summary.agent_action);
    println!("Answered: {}", summary.answered);
    println!("Failed:   {}", summary.failed);
    println!("Skipped:  {}", summary.skipped);
    println!("Duration: {:.1}s", summary.duration_secs);
    for report in &summary.task_files {
        println!(
            "  {} answered={} failed={} skipped={} ({})",
            report.task_name,
            report.answered,
            report.failed,
            report.skipped,
            report.answers_path.display()
        );
    }
    Ok(())
}

/// Reject malformed `--date` values before they end up in file names.
fn validate_date(raw: &str) -> anyhow::Result<String> {
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid --date '{raw}', expected YYYY-MM-DD"))?;
    Ok(raw.to_string())
}

// ============================================================================
// autograde
// ============================================================================

async fn run_autograde_command(args: AutogradeArgs) -> anyhow::Result<()> {
    if !args.csv_path.exists() {
        anyhow::bail!("Input file does not exist: {}", args.csv_path.display());
    }

    let report = autograde_file(&args.csv_path, &args.output_path)
        .with_context(|| format!("Grading {}", args.csv_path.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n=== Autograde Results ===");
    println!("Graded:   {}", args.output_path.display());
    println!("Total:    {}", report.total);
    println!("Correct:  {}", report.correct);
    println!("Accuracy: {:.1}%", report.accuracy * 100.0);
    print_breakdown("By source", &report.by_source);
    print_breakdown("By model", &report.by_model);
    print_breakdown("By agent action", &report.by_action_type);
    Ok(())
}

fn print_breakdown(
    label: &str,
    groups: &std::collections::BTreeMap<String, crate::grader::GroupAccuracy>,
) {
    if groups.is_empty() {
        return;
    }
    println!("  {label}:");
    for (key, group) in groups {
        println!(
            "    {}: {}/{} ({:.1}%)",
            key,
            group.correct,
            group.total,
            group.accuracy * 100.0
        );
    }
}
