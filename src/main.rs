//! CLI entry point for break-daq.
//!
//! Provides a command-line interface for:
//! - Running a full break-junction session against the configured
//!   instrument (`run`)
//! - Performing a single resistance probe and printing the estimate
//!   (`probe`)
//!
//! Only the simulated source-meter ships in the headless build; real
//! drivers implement the same capability traits and slot in behind the
//! configuration.

use anyhow::{Context, Result};
use break_daq::config::Config;
use break_daq::data::storage::{CsvSink, CsvTraceSnapshot, MemorySink, SessionMetadata};
use break_daq::hardware::mock::{CurrentModel, MockSourceMeter};
use break_daq::procedures::{AbortFlag, BreakJunctionController};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "break-daq")]
#[command(about = "Break-junction electromigration controller", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, default_value = "config/break_daq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full electromigration session.
    Run,

    /// Probe the junction resistance once and print it.
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    config.validate().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.application.log_level.clone())),
        )
        .init();

    match cli.command {
        Commands::Run => run_session(config).await,
        Commands::Probe => probe_once(config).await,
    }
}

fn build_meter(config: &Config) -> Arc<MockSourceMeter> {
    let model = match config.instrument.mock_break_at_volts {
        Some(break_at_volts) => CurrentModel::OhmicWithBreak {
            resistance: config.instrument.mock_resistance_ohms,
            break_at_volts,
            broken_resistance: config.instrument.mock_broken_resistance_ohms,
        },
        None => CurrentModel::Ohmic {
            resistance: config.instrument.mock_resistance_ohms,
        },
    };
    Arc::new(MockSourceMeter::new(model).with_noise(config.instrument.mock_noise))
}

async fn run_session(config: Config) -> Result<()> {
    let meter = build_meter(&config);

    let metadata = SessionMetadata {
        run_id: Uuid::new_v4(),
        started: Utc::now(),
        params: serde_json::to_value(&config.junction)?,
    };
    let sink = CsvSink::create(&config.storage.output_dir, &metadata)?;
    let output_path = sink.path().to_path_buf();

    let abort = AbortFlag::new();
    {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                abort.trigger("Ctrl-C");
            }
        });
    }

    let mut controller = BreakJunctionController::new(
        config.junction.clone(),
        meter.clone(),
        meter,
        Box::new(sink),
    )
    .with_abort(abort);

    if config.storage.snapshot_traces {
        controller = controller.with_snapshots(Box::new(CsvTraceSnapshot::new(
            config.storage.output_dir.clone(),
        )));
    }

    let report = controller.run().await?;

    println!("Session ended: {}", report.outcome.message());
    println!(
        "Final resistance: {:.3} ohm after {} cycle(s)",
        report.final_resistance, report.cycles
    );
    println!("Records written to {}", output_path.display());
    Ok(())
}

async fn probe_once(config: Config) -> Result<()> {
    let meter = build_meter(&config);

    let mut controller = BreakJunctionController::new(
        config.junction.clone(),
        meter.clone(),
        meter,
        Box::new(MemorySink::default()),
    );

    let outcome = controller.measure_resistance().await?;
    println!("Estimated resistance: {:.3} ohm", controller.resistance());
    if let Some(outcome) = outcome {
        println!("Probe hit a terminal condition: {}", outcome.message());
    }
    Ok(())
}
