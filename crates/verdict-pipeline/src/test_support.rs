//! Scripted collaborators for exercising the pipeline without a network.
//!
//! `ScriptedTransport` plays back queued replies in order and records every
//! request it receives. `RecordingObserver` keeps every pipeline event.

use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::chat::{ChatChoice, ChatRequest, ChatResponse, ChoiceMessage, Usage};
use crate::observer::{DecisionObserver, PipelineEvent};
use crate::prompts::RollTracker;
use crate::transport::{ChatTransport, TransportError};

/// One step of a transport script.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Response(ChatResponse),
    Fail(TransportError),
    /// Never completes; only a timeout or cancellation ends the call.
    Hang,
}

impl ScriptedReply {
    /// A successful envelope whose first choice carries `text`.
    pub fn content(text: &str) -> Self {
        ScriptedReply::Response(ScriptedTransport::response(text))
    }
}

#[derive(Default)]
struct Script {
    replies: VecDeque<ScriptedReply>,
    requests: Vec<ChatRequest>,
}

/// Mock transport. Once the script runs out every call fails with a network error.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(Script {
                replies: replies.into(),
                requests: Vec::new(),
            }),
        }
    }

    pub fn response(text: &str) -> ChatResponse {
        ChatResponse {
            model: Some("scripted".to_string()),
            choices: vec![ChatChoice {
                message: ChoiceMessage {
                    content: Some(text.to_string()),
                    reasoning_content: None,
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        }
    }

    pub fn response_with_usage(text: &str, usage: Usage) -> ChatResponse {
        ChatResponse {
            usage: Some(usage),
            ..Self::response(text)
        }
    }

    pub async fn call_count(&self) -> usize {
        self.script.lock().await.requests.len()
    }

    pub async fn requests(&self) -> Vec<ChatRequest> {
        self.script.lock().await.requests.clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(
        &self,
        request: &ChatRequest,
        _timeout: Duration,
    ) -> Result<ChatResponse, TransportError> {
        let reply = {
            let mut script = self.script.lock().await;
            script.requests.push(request.clone());
            script.replies.pop_front()
        };

        match reply {
            Some(ScriptedReply::Response(response)) => Ok(response),
            Some(ScriptedReply::Fail(err)) => Err(err),
            Some(ScriptedReply::Hang) => std::future::pending().await,
            None => Err(TransportError::Network("script exhausted".to_string())),
        }
    }
}

/// Observer that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingObserver {
    events: StdMutex<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl DecisionObserver for RecordingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Fixed ROLL state for a single symbol.
#[derive(Debug, Clone, Default)]
pub struct FixedRolls {
    pub symbol: String,
    pub count: u32,
    pub original_entry_price: Option<f64>,
}

impl RollTracker for FixedRolls {
    fn roll_count(&self, symbol: &str) -> u32 {
        if symbol == self.symbol {
            self.count
        } else {
            0
        }
    }

    fn original_entry_price(&self, symbol: &str) -> Option<f64> {
        (symbol == self.symbol)
            .then_some(self.original_entry_price)
            .flatten()
    }
}
