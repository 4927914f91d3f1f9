use tracing::{debug, info, warn};
use verdict_models::Action;

use crate::invoker::{CacheStats, InvocationFailure};
use crate::parser::ExtractionStrategy;

/// Something observable that happened while producing a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    AttemptStarted {
        model: String,
        attempt: u32,
        max_attempts: u32,
    },
    AttemptFailed {
        model: String,
        attempt: u32,
        max_attempts: u32,
        failure: InvocationFailure,
        will_retry: bool,
    },
    Completed {
        model: String,
        attempt: u32,
        elapsed_ms: u64,
    },
    CacheEfficiency(CacheStats),
    Parsed {
        strategy: ExtractionStrategy,
    },
    Decided {
        action: Action,
        confidence: u8,
    },
    /// The first pass failed and the request is re-run with its alternate profile.
    FallbackChain {
        from_model: String,
        to_model: String,
        reason: String,
    },
    FailedSafe {
        reason: String,
    },
}

/// Structured event sink injected into the pipeline.
pub trait DecisionObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Default sink: renders every event as a `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DecisionObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::AttemptStarted {
                model,
                attempt,
                max_attempts,
            } => {
                info!(model = %model, attempt, max_attempts, "API call attempt");
            }
            PipelineEvent::AttemptFailed {
                model,
                attempt,
                max_attempts,
                failure,
                will_retry,
            } => {
                warn!(
                    model = %model,
                    attempt,
                    max_attempts,
                    failure = %failure,
                    will_retry,
                    "API call attempt failed"
                );
            }
            PipelineEvent::Completed {
                model,
                attempt,
                elapsed_ms,
            } => {
                info!(model = %model, attempt, elapsed_ms, "API call succeeded");
            }
            PipelineEvent::CacheEfficiency(stats) => {
                info!(
                    hit_tokens = stats.hit_tokens,
                    miss_tokens = stats.miss_tokens,
                    hit_rate_pct = %format!("{:.1}", stats.hit_rate_pct),
                    estimated_savings_usd = %format!("{:.6}", stats.estimated_savings_usd),
                    "Prompt cache efficiency"
                );
            }
            PipelineEvent::Parsed { strategy } => {
                debug!(strategy = strategy.label(), "Extracted structured payload");
            }
            PipelineEvent::Decided { action, confidence } => {
                info!(action = %action, confidence, "Decision validated");
            }
            PipelineEvent::FallbackChain {
                from_model,
                to_model,
                reason,
            } => {
                warn!(from = %from_model, to = %to_model, reason = %reason, "Retrying decision with alternate profile");
            }
            PipelineEvent::FailedSafe { reason } => {
                warn!(reason = %reason, "Issuing fallback HOLD decision");
            }
        }
    }
}
