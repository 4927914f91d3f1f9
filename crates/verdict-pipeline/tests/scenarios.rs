//! End-to-end decision scenarios.
//!
//! Each test scripts the completion service with `ScriptedTransport`, runs the
//! full pipeline (prompt, invoke, parse, validate), and checks the `Decision`
//! the trading controller would receive.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;
use verdict_models::{
    AccountSnapshot, Action, DecisionPolicy, MacdSnapshot, MarketSnapshot, PositionSide,
    PositionSnapshot, TradeRecord,
};
use verdict_pipeline::test_support::{FixedRolls, RecordingObserver, ScriptedReply, ScriptedTransport};
use verdict_pipeline::{
    DecisionPipeline, FallbackReason, InvocationFailure, PipelineEvent, PipelineMode,
    PipelineOutcome, PipelineSettings, StaticPrompts, TransportError, Usage,
};

fn settings() -> PipelineSettings {
    let mut settings = PipelineSettings::default();
    settings.fast.timeout = Duration::from_millis(25);
    settings.reasoning.timeout = Duration::from_millis(25);
    settings
}

fn build(replies: Vec<ScriptedReply>, settings: PipelineSettings) -> (DecisionPipeline, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new(replies));
    let pipeline = DecisionPipeline::new(
        transport.clone(),
        Arc::new(StaticPrompts::new("You are a crypto futures trader.", "Decide whether to close.")),
        settings,
    );
    (pipeline, transport)
}

fn eth_market() -> MarketSnapshot {
    MarketSnapshot {
        symbol: "ETHUSDT".to_string(),
        current_price: 3120.4,
        price_change_24h: Some(3.8),
        rsi: Some(64.2),
        macd: Some(MacdSnapshot {
            macd: 14.1,
            signal: 9.7,
            histogram: 4.4,
        }),
        trend: Some("uptrend".to_string()),
        series: [("close_1h".to_string(), vec![3010.0, 3050.5, 3088.0, 3120.4])]
            .into_iter()
            .collect(),
        captured_at: Some(Utc::now()),
    }
}

fn account() -> AccountSnapshot {
    AccountSnapshot {
        balance: dec!(2500),
        available_balance: dec!(2100.50),
        positions: vec![],
    }
}

async fn analyze(pipeline: &DecisionPipeline, mode: PipelineMode) -> PipelineOutcome {
    pipeline
        .analyze_market(&eth_market(), &account(), &[], mode, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn out_of_range_reply_is_clamped() {
    let raw = "```json\n{\"action\":\"OPEN_LONG\",\"confidence\":80,\"reasoning\":\"breakout\",\"leverage\":40,\"stop_loss_pct\":0.1,\"take_profit_pct\":50}\n```";
    let (pipeline, _) = build(vec![ScriptedReply::content(raw)], settings());

    let outcome = analyze(&pipeline, PipelineMode::Standard).await;

    let decision = match outcome {
        PipelineOutcome::Succeeded(decision) => decision,
        other => panic!("expected success, got {other:?}"),
    };
    assert_eq!(decision.action, Action::OpenLong);
    assert_eq!(decision.confidence, 80);
    assert_eq!(decision.narrative, "breakout");
    assert_eq!(decision.leverage, DecisionPolicy::default().max_leverage);
    assert_eq!(decision.stop_loss_pct, 0.5);
    assert_eq!(decision.take_profit_pct, 20.0);
}

#[tokio::test]
async fn surrounding_prose_does_not_change_the_decision() {
    let block = "```json\n{\"action\":\"OPEN_SHORT\",\"confidence\":62,\"narrative\":\"Bearish divergence\",\"position_size\":12}\n```";
    let chatty = format!(
        "Let me walk through the indicators first. RSI {{64}} is elevated.\n\n{block}\n\nRemember to manage risk!"
    );
    let (bare, _) = build(vec![ScriptedReply::content(block)], settings());
    let (wrapped, _) = build(vec![ScriptedReply::content(&chatty)], settings());

    let a = analyze(&bare, PipelineMode::Standard).await;
    let b = analyze(&wrapped, PipelineMode::Standard).await;

    assert!(a.is_success());
    assert_eq!(a, b);
    assert_eq!(a.decision().position_size, 12);
}

#[tokio::test]
async fn transient_failures_are_absorbed_by_retries() {
    let (pipeline, transport) = build(
        vec![
            ScriptedReply::Fail(TransportError::Http {
                status: 429,
                body: "rate limited".to_string(),
            }),
            ScriptedReply::Hang,
            ScriptedReply::content(r#"{"action": "HOLD", "confidence": 45, "reasoning": "range bound"}"#),
        ],
        settings(),
    );

    let outcome = analyze(&pipeline, PipelineMode::Standard).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.decision().action, Action::Hold);
    assert_eq!(transport.call_count().await, 3);
}

#[tokio::test]
async fn exhausted_timeouts_hold_safely() {
    let (pipeline, transport) = build(
        vec![ScriptedReply::Hang, ScriptedReply::Hang, ScriptedReply::Hang],
        settings(),
    );

    let outcome = analyze(&pipeline, PipelineMode::Standard).await;

    assert!(!outcome.is_success());
    let decision = outcome.decision();
    assert_eq!(decision.action, Action::Hold);
    assert_eq!(decision.confidence, 0);
    assert_eq!(decision.leverage, 1);
    assert_eq!(decision.position_size, 0);
    assert!(decision.is_fallback());
    assert_eq!(transport.call_count().await, 3);
}

#[tokio::test]
async fn configured_retry_budget_is_respected() {
    let mut settings = settings();
    settings.max_retries = 0;
    let (pipeline, transport) = build(
        vec![
            ScriptedReply::Fail(TransportError::Network("reset".to_string())),
            ScriptedReply::content(r#"{"action": "HOLD", "confidence": 45, "reasoning": "x"}"#),
        ],
        settings,
    );

    let outcome = analyze(&pipeline, PipelineMode::Standard).await;

    assert!(matches!(
        outcome,
        PipelineOutcome::FailedSafe {
            reason: FallbackReason::Invocation {
                failure: InvocationFailure::Transport(_),
                attempts: 1
            },
            ..
        }
    ));
    assert_eq!(transport.call_count().await, 1);
}

#[tokio::test]
async fn reasoning_mode_recovers_through_fast_profile() {
    let (pipeline, transport) = build(
        vec![
            ScriptedReply::content("The chart is ambiguous, I'd rather not commit."),
            ScriptedReply::content(r#"{"action": "HOLD", "confidence": 30, "narrative": "no edge"}"#),
        ],
        settings(),
    );

    let outcome = analyze(&pipeline, PipelineMode::DeepReasoning).await;

    assert!(outcome.is_success());
    let requests = transport.requests().await;
    assert_eq!(requests[0].model, "deepseek-reasoner");
    assert_eq!(requests[0].max_tokens, 8000);
    assert_eq!(requests[1].model, "deepseek-chat");
    assert_eq!(requests[0].messages, requests[1].messages);
}

#[tokio::test]
async fn market_prompt_carries_history() {
    let (pipeline, transport) = build(
        vec![ScriptedReply::content(r#"{"action": "HOLD", "confidence": 50, "reasoning": "x"}"#)],
        settings(),
    );
    let history = vec![TradeRecord {
        symbol: "ETHUSDT".to_string(),
        action: Action::OpenLong,
        price: 2980.0,
        realized_pnl: None,
        executed_at: Utc::now() - ChronoDuration::hours(6),
    }];

    pipeline
        .analyze_market(
            &eth_market(),
            &account(),
            &history,
            PipelineMode::Standard,
            &CancellationToken::new(),
        )
        .await;

    let requests = transport.requests().await;
    let user = &requests[0].messages[1].content;
    assert_eq!(requests[0].messages[0].content, "You are a crypto futures trader.");
    assert!(user.contains("## MARKET: ETHUSDT"));
    assert!(user.contains("Available: 2100.50"));
    assert!(user.contains("ETHUSDT OPEN_LONG @ 2980 pnl open"));
}

#[tokio::test]
async fn near_liquidation_position_is_evaluated() {
    let (pipeline, transport) = build(
        vec![ScriptedReply::content(
            "```json\n{\"action\":\"CLOSE_LONG\",\"confidence\":92,\"reasoning\":\"Too close to liquidation\",\"close_percentage\":100}\n```",
        )],
        settings(),
    );
    let position = PositionSnapshot {
        symbol: "ETHUSDT".to_string(),
        side: PositionSide::Long,
        entry_price: 3200.0,
        current_price: 3120.4,
        leverage: 25,
        unrealized_pnl_pct: -62.2,
        opened_at: Some(Utc::now() - ChronoDuration::minutes(95)),
    };
    let rolls = FixedRolls {
        symbol: "ETHUSDT".to_string(),
        count: 3,
        original_entry_price: Some(2900.0),
    };

    let outcome = pipeline
        .evaluate_position(
            &position,
            Some(&eth_market()),
            &rolls,
            PipelineMode::Standard,
            &CancellationToken::new(),
        )
        .await;

    let decision = outcome.decision();
    assert_eq!(decision.action, Action::CloseLong);
    assert_eq!(decision.close_percentage, Some(100));

    let requests = transport.requests().await;
    let user = &requests[0].messages[1].content;
    assert!(user.contains("(critical)"));
    assert!(user.contains("Thresholds tightened for high leverage"));
    assert!(user.contains("Protect trigger 2.40%: not reached"));
    assert!(user.contains("ROLL count: 3/6"));
}

#[tokio::test]
async fn concurrent_decisions_share_one_pipeline() {
    let reply = r#"{"action": "HOLD", "confidence": 50, "reasoning": "x"}"#;
    let (pipeline, transport) = build(
        vec![
            ScriptedReply::content(reply),
            ScriptedReply::content(reply),
            ScriptedReply::content(reply),
            ScriptedReply::content(reply),
        ],
        settings(),
    );
    let pipeline = Arc::new(pipeline);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            analyze(&pipeline, PipelineMode::Standard).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }
    assert_eq!(transport.call_count().await, 4);
}

#[tokio::test]
async fn observer_sees_fail_safe_reason() {
    let transport = Arc::new(ScriptedTransport::new(vec![ScriptedReply::content("just prose")]));
    let observer = Arc::new(RecordingObserver::default());
    let pipeline = DecisionPipeline::new(
        transport,
        Arc::new(StaticPrompts::default()),
        settings(),
    )
    .with_observer(observer.clone());

    analyze(&pipeline, PipelineMode::Standard).await;

    let reason = observer
        .events()
        .into_iter()
        .find_map(|e| match e {
            PipelineEvent::FailedSafe { reason } => Some(reason),
            _ => None,
        })
        .expect("fail-safe event");
    assert!(reason.contains("just prose"));
}

#[tokio::test]
async fn absurd_cache_counters_do_not_cost_the_decision() {
    let usage = Usage {
        prompt_cache_hit_tokens: Some(u64::MAX),
        prompt_cache_miss_tokens: Some(1),
        ..Usage::default()
    };
    let reply = ScriptedTransport::response_with_usage(
        r#"{"action": "HOLD", "confidence": 55, "reasoning": "waiting for volume"}"#,
        usage,
    );
    let (pipeline, transport) = build(vec![ScriptedReply::Response(reply)], settings());

    let outcome = analyze(&pipeline, PipelineMode::Standard).await;

    assert!(outcome.is_success(), "failed safe: {outcome:?}");
    assert_eq!(outcome.decision().confidence, 55);
    assert_eq!(transport.call_count().await, 1);
}
