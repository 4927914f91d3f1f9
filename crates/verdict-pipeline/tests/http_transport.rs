//! Integration tests for the reqwest transport against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use verdict_models::Action;
use verdict_pipeline::test_support::RecordingObserver;
use verdict_pipeline::{
    ChatMessage, ChatTransport, DecisionError, DecisionPipeline, FallbackReason, HttpChatTransport,
    InvocationFailure, InvocationOutcome, InvocationProfile, PipelineEvent, PipelineOutcome,
    PipelineSettings, RetryingInvoker, StaticPrompts, TransportError,
};

fn envelope(content: &str) -> String {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "deepseek-chat",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": 1200,
            "completion_tokens": 80,
            "total_tokens": 1280,
            "prompt_cache_hit_tokens": 900,
            "prompt_cache_miss_tokens": 300
        }
    })
    .to_string()
}

fn profile() -> InvocationProfile {
    InvocationProfile {
        model: "deepseek-chat".to_string(),
        temperature: 0.7,
        max_tokens: 2000,
        timeout: Duration::from_secs(5),
    }
}

fn messages() -> Vec<ChatMessage> {
    vec![ChatMessage::system("rules"), ChatMessage::user("data")]
}

#[tokio::test]
async fn posts_authenticated_request_and_reads_envelope() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({
            "model": "deepseek-chat",
            "max_tokens": 2000,
            "messages": [
                {"role": "system", "content": "rules"},
                {"role": "user", "content": "data"}
            ]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(envelope("hello"))
        .create_async()
        .await;

    let transport = HttpChatTransport::new(server.url(), "sk-test");
    let request = verdict_pipeline::ChatRequest {
        model: "deepseek-chat".to_string(),
        messages: messages(),
        temperature: 0.7,
        max_tokens: 2000,
    };
    let response = transport
        .send(&request, Duration::from_secs(5))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.first_content(), Some("hello"));
    let usage = response.usage.unwrap();
    assert_eq!(usage.prompt_cache_hit_tokens, Some(900));
}

#[tokio::test]
async fn error_status_is_retried_then_classified() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .with_body("service unavailable")
        .expect(3)
        .create_async()
        .await;

    let transport = Arc::new(HttpChatTransport::new(server.url(), "sk-test"));
    let invoker = RetryingInvoker::new(transport, 2);
    let outcome = invoker
        .invoke(&messages(), &profile(), &CancellationToken::new())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(
        outcome,
        InvocationOutcome::Failed {
            failure: InvocationFailure::Http { status: 503 },
            attempts: 3,
        }
    );
}

#[tokio::test]
async fn error_body_is_kept_for_diagnostics() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error": {"message": "Authentication Fails"}}"#)
        .create_async()
        .await;

    let transport = HttpChatTransport::new(server.url(), "sk-wrong");
    let request = verdict_pipeline::ChatRequest {
        model: "deepseek-chat".to_string(),
        messages: messages(),
        temperature: 0.7,
        max_tokens: 10,
    };
    match transport.send(&request, Duration::from_secs(5)).await {
        Err(TransportError::Http { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("Authentication Fails"));
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreadable_success_body_is_envelope_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body("<html>gateway</html>")
        .expect(1)
        .create_async()
        .await;

    let transport = Arc::new(HttpChatTransport::new(server.url(), "sk-test"));
    let invoker = RetryingInvoker::new(transport, 2);
    let result = invoker
        .invoke(&messages(), &profile(), &CancellationToken::new())
        .await;

    mock.assert_async().await;
    assert!(matches!(result, Err(DecisionError::Envelope(_))));
}

#[tokio::test]
async fn refused_connection_is_transport_failure() {
    // Nothing listens on port 1
    let transport = Arc::new(HttpChatTransport::new("http://127.0.0.1:1", "sk-test"));
    let invoker = RetryingInvoker::new(transport, 0);
    let outcome = invoker
        .invoke(&messages(), &profile(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        InvocationOutcome::Failed {
            failure: InvocationFailure::Transport(_),
            attempts: 1,
        }
    ));
}

#[tokio::test]
async fn pipeline_over_http_end_to_end() {
    let reply = "Analysis complete.\n```json\n{\"action\": \"OPEN_SHORT\", \"confidence\": 71, \"reasoning\": \"Rejected at resistance\", \"leverage\": 40, \"stop_loss_pct\": 0.1, \"take_profit_pct\": 50}\n```";
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(envelope(reply))
        .create_async()
        .await;

    let observer = Arc::new(RecordingObserver::default());
    let pipeline = DecisionPipeline::new(
        Arc::new(HttpChatTransport::new(server.url(), "sk-test")),
        Arc::new(StaticPrompts::new("market rules", "position rules")),
        PipelineSettings::default(),
    )
    .with_observer(observer.clone());

    let request = pipeline.request(
        verdict_pipeline::PromptTask::MarketAnalysis,
        verdict_pipeline::PipelineMode::Standard,
        "BTCUSDT at 64000".to_string(),
    );
    let outcome = pipeline.run(&request, &CancellationToken::new()).await;

    let decision = match outcome {
        PipelineOutcome::Succeeded(decision) => decision,
        PipelineOutcome::FailedSafe { reason, .. } => panic!("failed safe: {reason}"),
    };
    assert_eq!(decision.action, Action::OpenShort);
    assert_eq!(decision.leverage, 30);
    assert_eq!(decision.stop_loss_pct, 0.5);
    assert_eq!(decision.take_profit_pct, 20.0);

    let stats = observer
        .events()
        .into_iter()
        .find_map(|e| match e {
            PipelineEvent::CacheEfficiency(stats) => Some(stats),
            _ => None,
        })
        .expect("cache statistics");
    assert!((stats.hit_rate_pct - 75.0).abs() < 1e-9);
}

#[tokio::test]
async fn pipeline_over_http_fails_safe_on_server_errors() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .expect(3)
        .create_async()
        .await;

    let pipeline = DecisionPipeline::new(
        Arc::new(HttpChatTransport::new(server.url(), "sk-test")),
        Arc::new(StaticPrompts::default()),
        PipelineSettings::default(),
    );
    let request = pipeline.request(
        verdict_pipeline::PromptTask::MarketAnalysis,
        verdict_pipeline::PipelineMode::Standard,
        "data".to_string(),
    );
    let outcome = pipeline.run(&request, &CancellationToken::new()).await;

    match outcome {
        PipelineOutcome::FailedSafe { decision, reason } => {
            assert_eq!(
                reason,
                FallbackReason::Invocation {
                    failure: InvocationFailure::Http { status: 500 },
                    attempts: 3,
                }
            );
            assert_eq!(decision.action, Action::Hold);
            assert_eq!(decision.confidence, 0);
        }
        other => panic!("expected fail-safe, got {other:?}"),
    }
}
