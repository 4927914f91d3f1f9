use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use verdict_models::{CachePricing, ProfileConfig};

use crate::chat::{ChatMessage, ChatRequest, ChatResponse, Usage};
use crate::error::DecisionError;
use crate::observer::{DecisionObserver, PipelineEvent, TracingObserver};
use crate::transport::{ChatTransport, TransportError};

/// Generation parameters and timeout for one class of call.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationProfile {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl From<&ProfileConfig> for InvocationProfile {
    fn from(config: &ProfileConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

/// Classified failure of a whole invocation, after retries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvocationFailure {
    #[error("timeout after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("HTTP error status {status}")]
    Http { status: u16 },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("cancelled")]
    Cancelled,
}

/// Raw model text plus what the envelope said about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub model: Option<String>,
    pub usage: Option<Usage>,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    Completed(Completion),
    Failed {
        failure: InvocationFailure,
        attempts: u32,
    },
}

/// Prompt cache statistics for one response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub hit_tokens: u64,
    pub miss_tokens: u64,
    pub hit_rate_pct: f64,
    pub estimated_savings_usd: f64,
}

impl CacheStats {
    /// `None` unless the envelope reported both counters with a non-zero,
    /// representable total.
    pub fn from_usage(usage: &Usage, pricing: &CachePricing) -> Option<Self> {
        let hit = usage.prompt_cache_hit_tokens?;
        let miss = usage.prompt_cache_miss_tokens?;
        let total = hit.checked_add(miss)?;
        if total == 0 {
            return None;
        }
        let per_token_saving = (pricing.cache_miss_usd_per_million
            - pricing.cache_hit_usd_per_million)
            / 1_000_000.0;
        Some(Self {
            hit_tokens: hit,
            miss_tokens: miss,
            hit_rate_pct: hit as f64 / total as f64 * 100.0,
            estimated_savings_usd: hit as f64 * per_token_saving,
        })
    }
}

/// Performs one logical call with immediate, bounded retries.
pub struct RetryingInvoker {
    transport: Arc<dyn ChatTransport>,
    max_retries: u32,
    pricing: CachePricing,
    observer: Arc<dyn DecisionObserver>,
}

impl RetryingInvoker {
    pub fn new(transport: Arc<dyn ChatTransport>, max_retries: u32) -> Self {
        Self {
            transport,
            max_retries,
            pricing: CachePricing::default(),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_pricing(mut self, pricing: CachePricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DecisionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Classified failures come back as `Ok(InvocationOutcome::Failed)`; only
    /// an unreadable envelope on a 2xx response is an `Err`.
    pub async fn invoke(
        &self,
        messages: &[ChatMessage],
        profile: &InvocationProfile,
        cancel: &CancellationToken,
    ) -> Result<InvocationOutcome, DecisionError> {
        let request = ChatRequest {
            model: profile.model.clone(),
            messages: messages.to_vec(),
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
        };
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Ok(self.cancelled(profile, attempt, max_attempts));
            }

            self.observer.on_event(&PipelineEvent::AttemptStarted {
                model: profile.model.clone(),
                attempt,
                max_attempts,
            });
            let start = Instant::now();

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(self.cancelled(profile, attempt, max_attempts));
                }
                result = tokio::time::timeout(
                    profile.timeout,
                    self.transport.send(&request, profile.timeout),
                ) => result,
            };

            let failure = match result {
                Ok(Ok(response)) => {
                    let completion = self.complete(response, profile, attempt, start)?;
                    return Ok(InvocationOutcome::Completed(completion));
                }
                Err(_) | Ok(Err(TransportError::Timeout)) => {
                    InvocationFailure::Timeout(profile.timeout)
                }
                Ok(Err(TransportError::Http { status, .. })) => InvocationFailure::Http { status },
                Ok(Err(TransportError::Network(message))) => InvocationFailure::Transport(message),
                Ok(Err(TransportError::Envelope(message))) => {
                    return Err(DecisionError::Envelope(message));
                }
            };

            let will_retry = attempt < max_attempts;
            self.observer.on_event(&PipelineEvent::AttemptFailed {
                model: profile.model.clone(),
                attempt,
                max_attempts,
                failure: failure.clone(),
                will_retry,
            });
            if !will_retry {
                return Ok(InvocationOutcome::Failed {
                    failure,
                    attempts: attempt,
                });
            }
        }
    }

    fn complete(
        &self,
        response: ChatResponse,
        profile: &InvocationProfile,
        attempt: u32,
        start: Instant,
    ) -> Result<Completion, DecisionError> {
        let content = response
            .first_content()
            .ok_or_else(|| DecisionError::Envelope("no message content in choices".to_string()))?
            .to_string();

        self.observer.on_event(&PipelineEvent::Completed {
            model: profile.model.clone(),
            attempt,
            elapsed_ms: start.elapsed().as_millis() as u64,
        });
        if let Some(stats) = response
            .usage
            .as_ref()
            .and_then(|usage| CacheStats::from_usage(usage, &self.pricing))
        {
            self.observer.on_event(&PipelineEvent::CacheEfficiency(stats));
        }

        Ok(Completion {
            content,
            model: response.model,
            usage: response.usage,
            attempts: attempt,
        })
    }

    fn cancelled(
        &self,
        profile: &InvocationProfile,
        attempt: u32,
        max_attempts: u32,
    ) -> InvocationOutcome {
        self.observer.on_event(&PipelineEvent::AttemptFailed {
            model: profile.model.clone(),
            attempt,
            max_attempts,
            failure: InvocationFailure::Cancelled,
            will_retry: false,
        });
        InvocationOutcome::Failed {
            failure: InvocationFailure::Cancelled,
            attempts: attempt,
        }
    }
}
