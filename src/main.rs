//! Skein CLI - workflow execution engine

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use skein::error::{FixSuggestion, SkeinError};
use skein::event::{EventKind, TraceWriter};
use skein::graph::GraphDescription;
use skein::runtime::RunStatus;
use skein::{Engine, EngineConfig};

#[derive(Parser)]
#[command(name = "skein")]
#[command(about = "Skein - workflow execution engine for block graphs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a graph description file
    Run {
        /// Path to the graph description (.json)
        file: PathBuf,

        /// Initial run input as inline JSON
        #[arg(short, long)]
        input: Option<String>,

        /// Export the run's event trace as NDJSON
        #[arg(short, long)]
        trace: Option<PathBuf>,
    },

    /// Validate a graph description (parse + static checks only)
    Check {
        /// Path to the graph description (.json)
        file: PathBuf,
    },

    /// Inspect an exported run trace
    Trace {
        /// Path to an NDJSON trace file
        file: PathBuf,

        /// Show only events for this block id
        #[arg(short, long)]
        block: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { file, input, trace } => run_graph(&file, input.as_deref(), trace).await,
        Commands::Check { file } => check_graph(&file),
        Commands::Trace { file, block } => show_trace(&file, block.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            if let Some(suggestion) = err.fix_suggestion() {
                eprintln!("  {} {}", "hint:".yellow(), suggestion);
            }
            ExitCode::FAILURE
        }
    }
}

fn load_description(path: &PathBuf) -> Result<GraphDescription, SkeinError> {
    let content = std::fs::read_to_string(path).map_err(|_| SkeinError::GraphNotFound {
        path: path.display().to_string(),
    })?;
    GraphDescription::from_json(&content)
}

async fn run_graph(
    path: &PathBuf,
    input: Option<&str>,
    trace: Option<PathBuf>,
) -> Result<ExitCode, SkeinError> {
    let description = load_description(path)?;
    let graph = Engine::validate(&description)?;

    let initial_input: serde_json::Value = match input {
        Some(raw) => serde_json::from_str(raw)?,
        None => serde_json::Value::Null,
    };

    let engine = Engine::new(EngineConfig::load()?);
    let mut handle = engine.start_run(graph, initial_input)?;
    let log = handle.log().clone();

    println!(
        "{} Running {} ({} blocks)...\n",
        "→".cyan(),
        path.display(),
        description.blocks.len()
    );

    // Print block progress from the pushed event stream
    let mut events = handle.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event.kind {
                EventKind::BlockStarted { block_id, kind, .. } => {
                    println!("  {} {} {}", "[⟳]".yellow(), block_id, kind.dimmed());
                }
                EventKind::BlockSucceeded {
                    block_id,
                    duration_ms,
                    ..
                } => {
                    println!(
                        "  {} {} {}",
                        "✓".green(),
                        block_id,
                        format!("({}ms)", duration_ms).dimmed()
                    );
                }
                EventKind::BlockFailed {
                    block_id, error, ..
                } => {
                    println!("  {} {}", "✗".red(), block_id);
                    println!("      {} {}", "error:".red(), error);
                }
                EventKind::BlockSkipped { block_id, .. } => {
                    println!("  {} {} {}", "-".dimmed(), block_id, "skipped".dimmed());
                }
                EventKind::RunCompleted { .. }
                | EventKind::RunFailed { .. }
                | EventKind::RunCancelled { .. } => break,
                _ => {}
            }
        }
    });

    let result = handle.result().await;
    let _ = printer.await;

    if let Some(trace_path) = trace {
        TraceWriter::export(&log, &trace_path)?;
        println!("\n{} Trace written to {}", "→".cyan(), trace_path.display());
    }

    let result = result?;

    match result.status {
        RunStatus::Succeeded => {
            println!("\n{} Done ({:.1}s)", "✓".green(), result.duration.as_secs_f32());
            if let Some(output) = &result.output {
                println!("{}", serde_json::to_string_pretty(output)?);
            }
            Ok(ExitCode::SUCCESS)
        }
        RunStatus::Failed => {
            println!("\n{} Run finished with failures:", "✗".red());
            for failure in &result.failures {
                println!("  {} [{}] {}", failure.block_id, failure.kind, failure.message);
            }
            if let Some(output) = &result.output {
                println!("\nPartial output:\n{}", serde_json::to_string_pretty(output)?);
            }
            Ok(ExitCode::FAILURE)
        }
        RunStatus::Cancelled => {
            println!("\n{} Run cancelled", "✗".yellow());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn check_graph(path: &PathBuf) -> Result<ExitCode, SkeinError> {
    let description = load_description(path)?;
    let graph = Engine::validate(&description)?;

    println!(
        "{} {} is valid ({} blocks, fingerprint {})",
        "✓".green(),
        path.display(),
        graph.len(),
        graph.fingerprint()
    );
    Ok(ExitCode::SUCCESS)
}

fn show_trace(path: &PathBuf, block: Option<&str>) -> Result<ExitCode, SkeinError> {
    let events = TraceWriter::load(path)?;

    for event in &events {
        if let Some(block) = block {
            if event.kind.block_id() != Some(block) {
                continue;
            }
        }
        println!(
            "{:>6}ms  #{:<4} {}",
            event.timestamp_ms,
            event.id,
            serde_json::to_string(&event.kind)?
        );
    }
    Ok(ExitCode::SUCCESS)
}
