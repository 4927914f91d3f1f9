use std::io::Read;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use verdict::pipeline::{PipelineMode, PipelineOutcome};
use verdict::{DecideInput, PositionInput};

#[derive(Parser, Debug)]
#[command(name = "verdict", about = "Resilient LLM trading decisions")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/verdict.toml", global = true)]
    config: String,

    /// Read input JSON from a file instead of stdin
    #[arg(short, long, global = true)]
    input: Option<String>,

    /// Pretty-print the output JSON
    #[arg(long, global = true)]
    pretty: bool,

    /// Use the deep-reasoning profile, falling back to the fast profile once
    #[arg(long, global = true)]
    reasoning: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open/hold/close decision from a market and account snapshot
    Decide,
    /// Close/hold decision for an open position
    EvaluatePosition,
}

fn init_tracing(json: bool) {
    // Respects RUST_LOG
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }
}

fn read_input<T: DeserializeOwned>(path: Option<&str>) -> Result<T> {
    let json = if let Some(path) = path {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read input: {path}"))?
    } else {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    };
    serde_json::from_str(&json).context("Failed to parse input JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let config = verdict::load_config(&cli.config)?;
    let pipeline = verdict::build_pipeline(&config).context("Failed to build pipeline")?;
    let mode = if cli.reasoning {
        PipelineMode::DeepReasoning
    } else {
        PipelineMode::Standard
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling");
            shutdown.cancel();
        }
    });

    let outcome = match cli.command {
        Command::Decide => {
            let input: DecideInput = read_input(cli.input.as_deref())?;
            verdict::decide(&pipeline, &input, mode, &cancel).await
        }
        Command::EvaluatePosition => {
            let input: PositionInput = read_input(cli.input.as_deref())?;
            verdict::evaluate_position(&pipeline, &input, mode, &cancel).await
        }
    };

    if let PipelineOutcome::FailedSafe { reason, .. } = &outcome {
        warn!(reason = %reason, "Returning fallback decision");
    }
    let decision = outcome.into_decision();

    let output = if cli.pretty {
        serde_json::to_string_pretty(&decision)?
    } else {
        serde_json::to_string(&decision)?
    };
    println!("{output}");

    Ok(())
}
