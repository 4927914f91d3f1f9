//! Verdict - resilient LLM trading decisions
//!
//! Turns market and position snapshots into a bounded, validated trading
//! `Decision` by calling a chat-completion model. Any failure along the way
//! (timeouts, HTTP errors, unparseable replies, missing fields) resolves to a
//! conservative HOLD instead of an error.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use verdict::models::{MarketSnapshot, AccountSnapshot, VerdictConfig};
//! use verdict::pipeline::{DecisionPipeline, PipelineMode, PipelineOutcome};
//! use verdict::risk::RiskContext;
//! ```

pub use verdict_models as models;
pub use verdict_pipeline as pipeline;
pub use verdict_risk as risk;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use verdict_models::{
    AccountSnapshot, MarketSnapshot, PositionSnapshot, PromptsConfig, TradeRecord, VerdictConfig,
};
use verdict_pipeline::{
    ChatTransport, DecisionPipeline, HttpChatTransport, PipelineMode, PipelineOutcome,
    PipelineSettings, PromptSource, PromptTask, RollTracker,
};

/// Read and validate a TOML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<VerdictConfig, anyhow::Error> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: VerdictConfig = toml::from_str(&text).context("Failed to parse config")?;
    validate_config(&config)?;
    Ok(config)
}

/// Startup checks for values serde cannot reject on its own.
pub fn validate_config(config: &VerdictConfig) -> Result<(), anyhow::Error> {
    config.policy.check().context("Invalid [policy]")?;
    ensure!(
        (0.0..1.0).contains(&config.risk.maintenance_margin_rate),
        "Invalid [risk]: maintenance_margin_rate must be in [0, 1), got {}",
        config.risk.maintenance_margin_rate
    );
    for (name, profile) in [
        ("fast", &config.profiles.fast),
        ("reasoning", &config.profiles.reasoning),
    ] {
        ensure!(
            profile.timeout_seconds > 0,
            "Invalid [profiles.{name}]: timeout_seconds must be positive"
        );
        ensure!(
            !profile.model.trim().is_empty(),
            "Invalid [profiles.{name}]: model is empty"
        );
    }
    Ok(())
}

/// System prompts read from the files named in `[prompts]`.
#[derive(Debug, Clone)]
pub struct FilePromptSource {
    market_analysis: String,
    position_evaluation: String,
}

impl FilePromptSource {
    pub fn load(config: &PromptsConfig) -> Result<Self, anyhow::Error> {
        let read = |path: &str| {
            std::fs::read_to_string(path).with_context(|| {
                format!("Failed to read prompt: {path} (point [prompts] at your own prompt files)")
            })
        };
        Ok(Self {
            market_analysis: read(&config.market_analysis)?,
            position_evaluation: read(&config.position_evaluation)?,
        })
    }
}

impl PromptSource for FilePromptSource {
    fn system_prompt(&self, task: PromptTask) -> &str {
        match task {
            PromptTask::MarketAnalysis => &self.market_analysis,
            PromptTask::PositionEvaluation => &self.position_evaluation,
        }
    }
}

/// Build a pipeline over an arbitrary transport.
pub fn build_pipeline_with(
    config: &VerdictConfig,
    transport: Arc<dyn ChatTransport>,
    prompts: Arc<dyn PromptSource>,
) -> Result<DecisionPipeline, anyhow::Error> {
    validate_config(config)?;
    Ok(DecisionPipeline::new(
        transport,
        prompts,
        PipelineSettings::from_config(config),
    ))
}

/// Build a pipeline talking to the configured HTTP endpoint.
///
/// The API key comes from the environment variable named by `api.api_key_env`.
pub fn build_pipeline(config: &VerdictConfig) -> Result<DecisionPipeline, anyhow::Error> {
    let api_key = std::env::var(&config.api.api_key_env)
        .with_context(|| format!("Environment variable {} is not set", config.api.api_key_env))?;
    ensure!(
        !api_key.trim().is_empty(),
        "Environment variable {} is empty",
        config.api.api_key_env
    );

    let transport = Arc::new(HttpChatTransport::new(config.api.base_url.clone(), api_key));
    let prompts = Arc::new(FilePromptSource::load(&config.prompts)?);
    build_pipeline_with(config, transport, prompts)
}

/// Input for a market analysis decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecideInput {
    pub market: MarketSnapshot,
    pub account: AccountSnapshot,
    #[serde(default)]
    pub history: Vec<TradeRecord>,
}

/// ROLL state of one symbol, as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RollState {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub original_entry_price: Option<f64>,
}

/// Read-only ROLL state keyed by symbol, taken from the input document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct SnapshotRollTracker(pub HashMap<String, RollState>);

impl RollTracker for SnapshotRollTracker {
    fn roll_count(&self, symbol: &str) -> u32 {
        self.0.get(symbol).map_or(0, |s| s.count)
    }

    fn original_entry_price(&self, symbol: &str) -> Option<f64> {
        self.0.get(symbol).and_then(|s| s.original_entry_price)
    }
}

/// Input for a position evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInput {
    pub position: PositionSnapshot,
    #[serde(default)]
    pub market: Option<MarketSnapshot>,
    #[serde(default)]
    pub rolls: SnapshotRollTracker,
}

/// Run a market analysis decision.
pub async fn decide(
    pipeline: &DecisionPipeline,
    input: &DecideInput,
    mode: PipelineMode,
    cancel: &CancellationToken,
) -> PipelineOutcome {
    pipeline
        .analyze_market(&input.market, &input.account, &input.history, mode, cancel)
        .await
}

/// Run a position evaluation.
pub async fn evaluate_position(
    pipeline: &DecisionPipeline,
    input: &PositionInput,
    mode: PipelineMode,
    cancel: &CancellationToken,
) -> PipelineOutcome {
    pipeline
        .evaluate_position(
            &input.position,
            input.market.as_ref(),
            &input.rolls,
            mode,
            cancel,
        )
        .await
}
