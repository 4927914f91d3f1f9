//! Resilient decision pipeline: prompt assembly, bounded retrying invocation
//! of a chat-completion service, tolerant payload extraction, and validation
//! into a bounded [`verdict_models::Decision`].

pub mod chat;
pub mod error;
pub mod invoker;
pub mod observer;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod transport;
pub mod validator;

pub mod test_support;

pub use chat::{ChatMessage, ChatRequest, ChatResponse, Role, Usage};
pub use error::DecisionError;
pub use invoker::{
    CacheStats, Completion, InvocationFailure, InvocationOutcome, InvocationProfile,
    RetryingInvoker,
};
pub use observer::{DecisionObserver, PipelineEvent, TracingObserver};
pub use parser::{parse_response, ExtractionStrategy, ParsedPayload, Payload};
pub use pipeline::{
    DecisionPipeline, DecisionRequest, FallbackReason, PipelineMode, PipelineOutcome,
    PipelineSettings,
};
pub use prompts::{
    NoRolls, PromptSource, PromptTask, RollStatus, RollTracker, StaticPrompts,
};
pub use transport::{ChatTransport, HttpChatTransport, TransportError};
pub use validator::DecisionValidator;
