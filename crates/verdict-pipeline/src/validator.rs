use serde_json::Value;
use verdict_models::{Action, Decision, DecisionPolicy, DecisionSource};

use crate::error::DecisionError;
use crate::parser::Payload;

const MIN_CONFIDENCE: f64 = 0.0;
const MAX_CONFIDENCE: f64 = 100.0;
const MIN_CLOSE_PERCENTAGE: f64 = 1.0;
const MAX_CLOSE_PERCENTAGE: f64 = 100.0;

/// Turns a decoded payload into a bounded `Decision`.
///
/// Out-of-range numbers are clamped silently; only a missing `action`,
/// `confidence`, or explanation is an error.
#[derive(Debug, Clone)]
pub struct DecisionValidator {
    policy: DecisionPolicy,
}

impl DecisionValidator {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn validate(&self, payload: &Payload) -> Result<Decision, DecisionError> {
        let policy = &self.policy;

        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Action>().ok())
            .ok_or(DecisionError::MissingField("action"))?;

        let confidence =
            number(payload, "confidence").ok_or(DecisionError::MissingField("confidence"))?;

        let (narrative, reasoning) = match (text(payload, "narrative"), text(payload, "reasoning")) {
            (Some(n), Some(r)) => (n, r),
            (Some(n), None) => (n.clone(), n),
            (None, Some(r)) => (r.clone(), r),
            (None, None) => return Err(DecisionError::MissingField("narrative/reasoning")),
        };

        let position_size = clamp_int(
            number(payload, "position_size"),
            f64::from(policy.default_position_size),
            f64::from(policy.min_position_size),
            f64::from(policy.max_position_size),
        ) as u8;
        let leverage = clamp_int(
            number(payload, "leverage"),
            f64::from(policy.default_leverage),
            f64::from(policy.min_leverage),
            f64::from(policy.max_leverage),
        ) as u32;
        let stop_loss_pct = clamp(
            number(payload, "stop_loss_pct").unwrap_or(policy.default_stop_loss_pct),
            policy.min_stop_loss_pct,
            policy.max_stop_loss_pct,
        );
        let take_profit_pct = clamp(
            number(payload, "take_profit_pct").unwrap_or(policy.default_take_profit_pct),
            policy.min_take_profit_pct,
            policy.max_take_profit_pct,
        );
        let close_percentage = if action.is_close() {
            number(payload, "close_percentage")
                .map(|v| clamp(v.round(), MIN_CLOSE_PERCENTAGE, MAX_CLOSE_PERCENTAGE) as u8)
        } else {
            None
        };

        Ok(Decision {
            action,
            confidence: clamp(confidence.round(), MIN_CONFIDENCE, MAX_CONFIDENCE) as u8,
            narrative,
            reasoning,
            position_size,
            leverage,
            stop_loss_pct,
            take_profit_pct,
            close_percentage,
            source: DecisionSource::Model,
        })
    }
}

/// Numeric field, accepting numbers and numeric strings such as `"80"` or `"2.5%"`.
fn number(payload: &Payload, key: &str) -> Option<f64> {
    let value = match payload.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

/// Non-blank string field.
fn text(payload: &Payload, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Saturating clamp; tolerates `min > max` where `f64::clamp` would panic.
fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

fn clamp_int(value: Option<f64>, default: f64, min: f64, max: f64) -> f64 {
    clamp(value.unwrap_or(default).round(), min, max)
}
