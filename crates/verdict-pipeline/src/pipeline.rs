use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;
use verdict_models::{
    AccountSnapshot, CachePricing, Decision, DecisionPolicy, MarketSnapshot, PositionSnapshot,
    RiskConfig, TradeRecord, VerdictConfig,
};
use verdict_risk::RiskContext;

use crate::chat::ChatMessage;
use crate::error::DecisionError;
use crate::invoker::{InvocationFailure, InvocationOutcome, InvocationProfile, RetryingInvoker};
use crate::observer::{DecisionObserver, PipelineEvent, TracingObserver};
use crate::parser::parse_response;
use crate::prompts::{
    market_analysis_prompt, position_evaluation_prompt, PromptSource, PromptTask, RollStatus,
    RollTracker,
};
use crate::transport::ChatTransport;
use crate::validator::DecisionValidator;

/// Which invocation profile a request starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineMode {
    /// Fast chat profile, no fallback chain.
    #[default]
    Standard,
    /// Reasoning profile first, then the fast profile once if that fails.
    DeepReasoning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRequest {
    pub messages: Vec<ChatMessage>,
    pub profile: InvocationProfile,
    /// Profile for a single re-run when the first pass fails safe.
    pub fallback_profile: Option<InvocationProfile>,
}

/// Why the pipeline issued the fallback decision.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    Invocation {
        failure: InvocationFailure,
        attempts: u32,
    },
    Envelope(String),
    Format {
        excerpt: String,
    },
    MissingField(&'static str),
}

impl FallbackReason {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            FallbackReason::Invocation {
                failure: InvocationFailure::Cancelled,
                ..
            }
        )
    }
}

impl From<DecisionError> for FallbackReason {
    fn from(err: DecisionError) -> Self {
        match err {
            DecisionError::Format { excerpt } => FallbackReason::Format { excerpt },
            DecisionError::MissingField(field) => FallbackReason::MissingField(field),
            DecisionError::Envelope(message) => FallbackReason::Envelope(message),
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Invocation { failure, attempts } => {
                write!(f, "{failure} ({attempts} attempts)")
            }
            FallbackReason::Envelope(message) => {
                write!(f, "malformed response envelope: {message}")
            }
            FallbackReason::Format { excerpt } => {
                write!(f, "no structured payload in response: {excerpt}")
            }
            FallbackReason::MissingField(field) => write!(f, "missing required field: {field}"),
        }
    }
}

/// Terminal state of one pipeline run. Either way a `Decision` is available.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Succeeded(Decision),
    FailedSafe {
        decision: Decision,
        reason: FallbackReason,
    },
}

impl PipelineOutcome {
    fn failed_safe(reason: FallbackReason) -> Self {
        PipelineOutcome::FailedSafe {
            decision: Decision::fallback(&reason),
            reason,
        }
    }

    pub fn decision(&self) -> &Decision {
        match self {
            PipelineOutcome::Succeeded(decision) => decision,
            PipelineOutcome::FailedSafe { decision, .. } => decision,
        }
    }

    pub fn into_decision(self) -> Decision {
        match self {
            PipelineOutcome::Succeeded(decision) => decision,
            PipelineOutcome::FailedSafe { decision, .. } => decision,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Succeeded(_))
    }
}

/// Everything the pipeline reads from configuration, resolved once.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub fast: InvocationProfile,
    pub reasoning: InvocationProfile,
    pub max_retries: u32,
    pub policy: DecisionPolicy,
    pub risk: RiskConfig,
    pub pricing: CachePricing,
}

impl PipelineSettings {
    pub fn from_config(config: &VerdictConfig) -> Self {
        Self {
            fast: InvocationProfile::from(&config.profiles.fast),
            reasoning: InvocationProfile::from(&config.profiles.reasoning),
            max_retries: config.retry.max_retries,
            policy: config.policy.clone(),
            risk: config.risk.clone(),
            pricing: config.pricing.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&VerdictConfig::default())
    }
}

/// Turns snapshots into a `Decision`: prompt, invoke, parse, validate.
///
/// Never returns an error. Every failure ends in
/// [`PipelineOutcome::FailedSafe`] carrying the fallback HOLD decision.
pub struct DecisionPipeline {
    invoker: RetryingInvoker,
    validator: DecisionValidator,
    prompts: Arc<dyn PromptSource>,
    observer: Arc<dyn DecisionObserver>,
    settings: PipelineSettings,
}

impl DecisionPipeline {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        prompts: Arc<dyn PromptSource>,
        settings: PipelineSettings,
    ) -> Self {
        let invoker = RetryingInvoker::new(transport, settings.max_retries)
            .with_pricing(settings.pricing.clone());
        Self {
            invoker,
            validator: DecisionValidator::new(settings.policy.clone()),
            prompts,
            observer: Arc::new(TracingObserver),
            settings,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DecisionObserver>) -> Self {
        self.invoker = self.invoker.with_observer(Arc::clone(&observer));
        self.observer = observer;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Assemble a request for `task` in `mode` around the given user content.
    pub fn request(
        &self,
        task: PromptTask,
        mode: PipelineMode,
        user_content: String,
    ) -> DecisionRequest {
        let messages = vec![
            ChatMessage::system(self.prompts.system_prompt(task)),
            ChatMessage::user(user_content),
        ];
        match mode {
            PipelineMode::Standard => DecisionRequest {
                messages,
                profile: self.settings.fast.clone(),
                fallback_profile: None,
            },
            PipelineMode::DeepReasoning => DecisionRequest {
                messages,
                profile: self.settings.reasoning.clone(),
                fallback_profile: Some(self.settings.fast.clone()),
            },
        }
    }

    /// Open/hold/close decision for a symbol.
    pub async fn analyze_market(
        &self,
        market: &MarketSnapshot,
        account: &AccountSnapshot,
        history: &[TradeRecord],
        mode: PipelineMode,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let content = market_analysis_prompt(market, account, history);
        let request = self.request(PromptTask::MarketAnalysis, mode, content);
        self.run(&request, cancel).await
    }

    /// Close/hold decision for an open position.
    pub async fn evaluate_position(
        &self,
        position: &PositionSnapshot,
        market: Option<&MarketSnapshot>,
        rolls: &dyn RollTracker,
        mode: PipelineMode,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let risk = match RiskContext::compute(position, &self.settings.risk) {
            Ok(risk) => Some(risk),
            Err(e) => {
                warn!(symbol = %position.symbol, error = %e, "Risk context unavailable, omitting from prompt");
                None
            }
        };
        let roll_status = RollStatus::lookup(rolls, &position.symbol, self.settings.risk.max_rolls);
        let content =
            position_evaluation_prompt(position, market, risk.as_ref(), &roll_status, Utc::now());
        let request = self.request(PromptTask::PositionEvaluation, mode, content);
        self.run(&request, cancel).await
    }

    /// Run a prepared request to a terminal state, taking the fallback chain at most once.
    pub async fn run(&self, request: &DecisionRequest, cancel: &CancellationToken) -> PipelineOutcome {
        let span = info_span!(
            "decision",
            request_id = %Uuid::new_v4(),
            model = %request.profile.model
        );

        async move {
            let mut result = self.attempt(&request.messages, &request.profile, cancel).await;

            if let Some(alternate) = &request.fallback_profile {
                let chain_reason = match &result {
                    Err(reason) if !reason.is_cancelled() => Some(reason.to_string()),
                    _ => None,
                };
                if let Some(reason) = chain_reason {
                    self.observer.on_event(&PipelineEvent::FallbackChain {
                        from_model: request.profile.model.clone(),
                        to_model: alternate.model.clone(),
                        reason,
                    });
                    result = self.attempt(&request.messages, alternate, cancel).await;
                }
            }

            match result {
                Ok(decision) => PipelineOutcome::Succeeded(decision),
                Err(reason) => {
                    self.observer.on_event(&PipelineEvent::FailedSafe {
                        reason: reason.to_string(),
                    });
                    PipelineOutcome::failed_safe(reason)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        messages: &[ChatMessage],
        profile: &InvocationProfile,
        cancel: &CancellationToken,
    ) -> Result<Decision, FallbackReason> {
        let completion = match self.invoker.invoke(messages, profile, cancel).await? {
            InvocationOutcome::Completed(completion) => completion,
            InvocationOutcome::Failed { failure, attempts } => {
                return Err(FallbackReason::Invocation { failure, attempts });
            }
        };

        let parsed = parse_response(&completion.content)?;
        self.observer.on_event(&PipelineEvent::Parsed {
            strategy: parsed.strategy,
        });

        let decision = self.validator.validate(&parsed.payload)?;
        self.observer.on_event(&PipelineEvent::Decided {
            action: decision.action,
            confidence: decision.confidence,
        });
        Ok(decision)
    }
}
