use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed values of the safe fallback decision.
pub mod fallback {
    pub const CONFIDENCE: u8 = 0;
    pub const POSITION_SIZE: u8 = 0;
    pub const LEVERAGE: u32 = 1;
    pub const STOP_LOSS_PCT: f64 = 2.0;
    pub const TAKE_PROFIT_PCT: f64 = 4.0;
}

/// A trading action the model may issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    OpenLong,
    OpenShort,
    Close,
    CloseLong,
    CloseShort,
    Hold,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::OpenLong,
        Action::OpenShort,
        Action::Close,
        Action::CloseLong,
        Action::CloseShort,
        Action::Hold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::OpenLong => "OPEN_LONG",
            Action::OpenShort => "OPEN_SHORT",
            Action::Close => "CLOSE",
            Action::CloseLong => "CLOSE_LONG",
            Action::CloseShort => "CLOSE_SHORT",
            Action::Hold => "HOLD",
        }
    }

    /// Whether `close_percentage` carries meaning for this action.
    pub fn is_close(&self) -> bool {
        matches!(self, Action::Close | Action::CloseLong | Action::CloseShort)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action: {}", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl FromStr for Action {
    type Err = UnknownAction;

    /// Case-insensitive; accepts `-` or spaces in place of `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Where a decision came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Parsed and validated from a model reply.
    #[default]
    Model,
    /// The fixed safe default issued when the pipeline could not produce one.
    Fallback,
}

/// The single output contract handed to the trading controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub action: Action,
    /// 0 to 100.
    pub confidence: u8,
    pub narrative: String,
    pub reasoning: String,
    /// Percent of available balance.
    pub position_size: u8,
    pub leverage: u32,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// Only set for close actions.
    pub close_percentage: Option<u8>,
    #[serde(default)]
    pub source: DecisionSource,
}

impl Decision {
    /// The hard-coded safe default. `reason` ends up in both explanation fields.
    pub fn fallback(reason: impl fmt::Display) -> Self {
        let message = format!("AI decision unavailable, holding: {reason}");
        Self {
            action: Action::Hold,
            confidence: fallback::CONFIDENCE,
            narrative: message.clone(),
            reasoning: message,
            position_size: fallback::POSITION_SIZE,
            leverage: fallback::LEVERAGE,
            stop_loss_pct: fallback::STOP_LOSS_PCT,
            take_profit_pct: fallback::TAKE_PROFIT_PCT,
            close_percentage: None,
            source: DecisionSource::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == DecisionSource::Fallback
    }

    /// Flat key/value view, the same shape the validator consumes.
    pub fn to_payload(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}
