use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use promptgrid_core::{
	load_suite, EvaluateOptions, Evaluator, JsonLatestResults, LatestResultsWriter, OutputPath,
	SqliteLatestResults,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "promptgrid", about = "Evaluate prompts against LLM providers")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	Eval(EvalArgs),
}

#[derive(Debug, Clone, Parser)]
struct EvalArgs {
	/// Suite file (.yaml, .yml or .json) with providers, prompts and tests
	#[arg(long, short)]
	config: PathBuf,

	/// Write results here (.json, .yaml, .yml or .txt). Repeatable; replaces the suite's output_path
	#[arg(long, short)]
	output: Vec<PathBuf>,

	/// Disable the response cache for this run
	#[arg(long, action = ArgAction::SetTrue)]
	no_cache: bool,

	/// Persist this run as the latest results
	#[arg(long, action = ArgAction::SetTrue)]
	write_latest: bool,

	/// Store latest results in this SQLite database instead of .promptgrid/latest.json
	#[arg(long)]
	db: Option<PathBuf>,

	/// Cells in flight
	#[arg(long, default_value_t = 4)]
	max_concurrency: usize,

	/// Print the per-cell summary table
	#[arg(long, action = ArgAction::SetTrue)]
	table: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

	let cli = Cli::parse();
	match cli.command {
		Commands::Eval(args) => eval(args).await?,
	}
	Ok(())
}

async fn eval(args: EvalArgs) -> Result<()> {
	let config = tokio::fs::canonicalize(&args.config)
		.await
		.with_context(|| format!("Suite file {:?} not found", args.config))?;
	let mut suite = load_suite(&config)
		.await
		.with_context(|| format!("Failed to load suite {:?}", config))?;
	tracing::debug!(config = %config.display(), "loaded suite");

	if !args.output.is_empty() {
		suite.output_path = Some(OutputPath::Multiple(args.output.clone()));
	}
	if args.write_latest {
		suite.write_latest_results = true;
	}

	let latest: Arc<dyn LatestResultsWriter> = match &args.db {
		Some(path) => Arc::new(SqliteLatestResults::open(path)?),
		None => Arc::new(JsonLatestResults::default()),
	};

	let mut builder = Evaluator::builder().latest_results(latest);
	if let Some(dir) = config.parent() {
		builder = builder.test_base_dir(dir);
	}
	let evaluator = builder.build();

	let options = EvaluateOptions {
		cache: args.no_cache.then_some(false),
		max_concurrency: args.max_concurrency.max(1),
	};
	let result = evaluator.evaluate(&suite, &options).await?;

	if args.table {
		println!("{}", result.summary_table());
	} else {
		println!(
			"Successes: {}  Failures: {}  Pass rate: {:.1}%",
			result.stats.successes,
			result.stats.failures,
			result.stats.pass_rate() * 100.0
		);
	}

	if result.stats.failures > 0 {
		anyhow::bail!("{} of {} cells failed", result.stats.failures, result.stats.total());
	}
	Ok(())
}
