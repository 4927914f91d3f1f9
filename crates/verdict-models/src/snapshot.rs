use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decision::Action;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Same spelling as the serialized form.
    pub fn label(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MacdSnapshot {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Market state for one symbol at the time of the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub current_price: f64,
    /// Percent change over the last 24 hours.
    pub price_change_24h: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<MacdSnapshot>,
    /// Free-form trend label (e.g. "uptrend", "sideways").
    pub trend: Option<String>,
    /// Optional time series keyed by name (e.g. "close_5m", "ema_20").
    #[serde(default)]
    pub series: BTreeMap<String, Vec<f64>>,
    pub captured_at: Option<DateTime<Utc>>,
}

/// An open position as reported by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub current_price: f64,
    pub leverage: u32,
    /// Unrealized PnL relative to entry, in percent.
    pub unrealized_pnl_pct: f64,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountSnapshot {
    pub balance: Decimal,
    pub available_balance: Decimal,
    #[serde(default)]
    pub positions: Vec<PositionSnapshot>,
}

/// A completed trade, most recent last.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub symbol: String,
    pub action: Action,
    pub price: f64,
    pub realized_pnl: Option<Decimal>,
    pub executed_at: DateTime<Utc>,
}
