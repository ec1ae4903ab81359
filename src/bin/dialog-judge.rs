//! dialog-judge CLI - run the judgment pipeline over a dataset directory
//!
//! Phases read and write JSON files in the data directory, so they can be
//! run together (`run`) or one at a time (`analyze`, `verify`, `merge`).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use dialog_judge::config::{ConfigError, PipelineConfig};
use dialog_judge::core::extract::extract_response;
use dialog_judge::core::validate::validate_judgment;
use dialog_judge::core::pipeline::merge_phase;
use dialog_judge::core::{
    CancellationToken, EscalationOnly, Phase, PhaseOutcome, Pipeline, PipelineError,
};
use dialog_judge::events::observers::{LoggingObserver, Metrics, MetricsObserver};
use dialog_judge::events::EventBus;
use dialog_judge::store::{Distribution, Store};
use serde::Serialize;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Exit code of an interrupted run
const EXIT_INTERRUPTED: u8 = 130;

/// Ensemble LLM judgments for customer-support dialogs
#[derive(Parser)]
#[command(name = "dialog-judge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding the configuration
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write Prometheus metrics of the run to this file
    #[arg(long, global = true)]
    metrics: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses
#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for programmatic use
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum PhaseArg {
    Consensus,
    Verified,
    Hybrid,
}

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Consensus => Phase::Consensus,
            PhaseArg::Verified => Phase::Verified,
            PhaseArg::Hybrid => Phase::Hybrid,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Vote over every dialog and write consensus records
    Analyze {
        /// Voting rounds per dialog
        #[arg(short, long)]
        rounds: Option<usize>,

        /// Concurrent dialogs
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Verify consensus records with the auditor oracle
    Verify {
        /// Concurrent dialogs
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Merge consensus and verified records (escalation only)
    Merge,

    /// Analyze, verify and merge
    Run {
        /// Voting rounds per dialog
        #[arg(short, long)]
        rounds: Option<usize>,

        /// Concurrent dialogs
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Extract and validate a judgment from one oracle reply
    Extract {
        /// The reply text (or - for stdin)
        reply: Option<String>,
    },

    /// Label distribution of a record set
    Summary {
        #[arg(short, long, value_enum, default_value = "consensus")]
        phase: PhaseArg,
    },

    /// Validate the configuration and exit
    ValidateConfig,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            if let Some(PipelineError::Interrupted { .. }) = e.downcast_ref::<PipelineError>() {
                eprintln!("Interrupted: {}", e);
                return ExitCode::from(EXIT_INTERRUPTED);
            }
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Extract { reply } => {
            execute_extract(cli.format, reply).map(|_| ExitCode::SUCCESS)
        }
        Commands::ValidateConfig => Ok(execute_validate_config(cli.config)),
        Commands::Summary { phase } => {
            let config = load_config(&cli.config, &cli.data_dir, None, None)?;
            execute_summary(cli.format, &Store::new(&config.data_dir), phase.into()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Analyze { rounds, workers } => {
            let config = load_config(&cli.config, &cli.data_dir, rounds, workers)?;
            run_phases(cli.format, cli.metrics, config, &[Phase::Consensus]).await
        }
        Commands::Verify { workers } => {
            let config = load_config(&cli.config, &cli.data_dir, None, workers)?;
            run_phases(cli.format, cli.metrics, config, &[Phase::Verified]).await
        }
        Commands::Merge => {
            let config = load_config(&cli.config, &cli.data_dir, None, None)?;
            run_phases(cli.format, cli.metrics, config, &[Phase::Hybrid]).await
        }
        Commands::Run { rounds, workers } => {
            let config = load_config(&cli.config, &cli.data_dir, rounds, workers)?;
            run_phases(cli.format, cli.metrics, config, &Phase::ALL).await
        }
    }
}

fn load_config(
    path: &Option<PathBuf>,
    data_dir: &Option<PathBuf>,
    rounds: Option<usize>,
    workers: Option<usize>,
) -> anyhow::Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(rounds) = rounds {
        config.rounds = rounds;
        // A configured quorum above the new round count is clamped
        config.min_votes = config.min_votes.map(|m| m.min(rounds.max(1)));
    }
    if let Some(workers) = workers {
        config.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn run_phases(
    format: OutputFormat,
    metrics_path: Option<PathBuf>,
    config: PipelineConfig,
    phases: &[Phase],
) -> anyhow::Result<ExitCode> {
    let store = Store::new(&config.data_dir);
    let bus = EventBus::with_default_capacity();
    let logging = tokio::spawn(LoggingObserver::new(&bus).run());
    let metrics_observer = MetricsObserver::new(&bus);
    let metrics = metrics_observer.metrics();
    let collecting = tokio::spawn(metrics_observer.run());

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, stopping after in-flight dialogs are cancelled");
                token.cancel();
            }
        });
    }

    // Merging alone needs no oracle
    let pipeline = if phases.iter().any(|phase| *phase != Phase::Hybrid) {
        let pipeline = Pipeline::from_config(Arc::new(config), bus.clone())
            .context("failed to set up oracle providers")?;
        Some(pipeline.with_cancel_token(token))
    } else {
        None
    };

    let mut outcomes = Vec::new();
    let mut result = Ok(());
    for phase in phases {
        let outcome = match (phase, &pipeline) {
            (Phase::Consensus, Some(pipeline)) => pipeline.run_analyze(&store).await,
            (Phase::Verified, Some(pipeline)) => pipeline.run_verify(&store).await,
            (Phase::Hybrid, Some(pipeline)) => pipeline.run_merge(&store).await,
            (_, None) => merge_phase(&store, &EscalationOnly, &bus).await,
        };
        match outcome {
            Ok(outcome) => {
                info!(phase = %outcome.phase, records = outcome.records, "Phase complete");
                outcomes.push(outcome);
            }
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }

    drop(pipeline);
    drop(bus);
    let _ = collecting.await;
    let _ = logging.await;
    if let Some(path) = metrics_path {
        write_metrics(&path, &metrics).await?;
    }

    print_outcomes(format, &outcomes)?;
    if let (OutputFormat::Text, Ok(metrics)) = (format, metrics.lock()) {
        print!("{}", metrics.report());
    }
    result?;
    Ok(ExitCode::SUCCESS)
}

async fn write_metrics(path: &PathBuf, metrics: &Arc<Mutex<Metrics>>) -> anyhow::Result<()> {
    let text = match metrics.lock() {
        Ok(metrics) => metrics.to_prometheus(),
        Err(_) => bail!("metrics collector panicked"),
    };
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("failed to write metrics to {}", path.display()))
}

fn print_outcomes(format: OutputFormat, outcomes: &[PhaseOutcome]) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcomes)?),
        OutputFormat::Text => {
            for outcome in outcomes {
                println!("=== {} ===", outcome.phase);
                if let Some(overrides) = outcome.overrides {
                    println!("Escalated: {}", overrides);
                }
                println!("{}\n", outcome.distribution);
            }
        }
    }
    Ok(())
}

/// Response from the extract command
#[derive(Serialize)]
struct ExtractResponse {
    /// Extraction strategy output, before validation
    raw: serde_json::Value,
    /// Canonicalized judgment
    judgment: dialog_judge::Judgment,
}

fn execute_extract(format: OutputFormat, reply: Option<String>) -> anyhow::Result<()> {
    let text = get_input(reply)?;
    let raw = extract_response(&text)?;
    let judgment = validate_judgment(&raw);

    match format {
        OutputFormat::Json => {
            let response = ExtractResponse {
                raw: serde_json::Value::Object(raw),
                judgment,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("Category:  {}", judgment.category);
            println!("Sentiment: {}", judgment.sentiment);
            println!("Score:     {}", judgment.score);
            let flags: Vec<&str> = judgment.flags.iter().map(|f| f.as_str()).collect();
            println!(
                "Flags:     {}",
                if flags.is_empty() { "none".to_string() } else { flags.join(", ") }
            );
        }
    }
    Ok(())
}

async fn execute_summary(format: OutputFormat, store: &Store, phase: Phase) -> anyhow::Result<()> {
    let records = store.load_records(phase).await?;
    let distribution = Distribution::from_records(&records);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&distribution)?),
        OutputFormat::Text => println!("=== {} ===\n{}", phase, distribution),
    }
    Ok(())
}

fn execute_validate_config(path: Option<PathBuf>) -> ExitCode {
    match PipelineConfig::resolve(path.as_deref()) {
        Ok(_) => {
            println!("Configuration is valid.");
            ExitCode::SUCCESS
        }
        Err(ConfigError::Invalid { problems }) => {
            eprintln!("Configuration errors:");
            for problem in problems {
                eprintln!("  - {}", problem);
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Argument text, or stdin when absent or `-`
fn get_input(arg: Option<String>) -> anyhow::Result<String> {
    match arg.as_deref() {
        Some("-") | None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read reply from stdin")?;
            Ok(buffer)
        }
        Some(text) => Ok(text.to_string()),
    }
}
