use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::chat::{ChatRequest, ChatResponse};

const ENDPOINT_CHAT: &str = "/chat/completions";
/// Bytes of an error body kept for diagnostics.
const ERROR_BODY_LIMIT: usize = 300;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed envelope: {0}")]
    Envelope(String),
}

/// A single request/response exchange with the completion service.
/// Mockable for testing.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<ChatResponse, TransportError>;
}

/// Transport over HTTPS with bearer authentication.
pub struct HttpChatTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpChatTransport {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), ENDPOINT_CHAT)
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send(
        &self,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<ChatResponse, TransportError> {
        debug!(model = %request.model, messages = request.messages.len(), "Calling chat completions");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let body = response.text().await.map_err(classify)?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Completion API returned error status");
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }

        serde_json::from_str(&body).map_err(|e| TransportError::Envelope(e.to_string()))
    }
}
