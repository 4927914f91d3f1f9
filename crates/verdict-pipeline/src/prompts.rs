use chrono::{DateTime, Utc};
use verdict_models::{AccountSnapshot, MarketSnapshot, PositionSnapshot, TradeRecord};
use verdict_risk::{RiskContext, ThresholdStage};

/// Trailing values of each extra series shown to the model.
const SERIES_TAIL: usize = 10;
/// Most recent trades shown to the model.
const HISTORY_TAIL: usize = 10;

/// Which system prompt a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTask {
    MarketAnalysis,
    PositionEvaluation,
}

/// Supplies system prompt text. Template content is opaque to the pipeline.
pub trait PromptSource: Send + Sync {
    fn system_prompt(&self, task: PromptTask) -> &str;
}

/// Prompts held in memory, loaded once by the caller.
#[derive(Debug, Clone, Default)]
pub struct StaticPrompts {
    market_analysis: String,
    position_evaluation: String,
}

impl StaticPrompts {
    pub fn new(market_analysis: impl Into<String>, position_evaluation: impl Into<String>) -> Self {
        Self {
            market_analysis: market_analysis.into(),
            position_evaluation: position_evaluation.into(),
        }
    }
}

impl PromptSource for StaticPrompts {
    fn system_prompt(&self, task: PromptTask) -> &str {
        match task {
            PromptTask::MarketAnalysis => &self.market_analysis,
            PromptTask::PositionEvaluation => &self.position_evaluation,
        }
    }
}

/// Read-only view of ROLL bookkeeping owned elsewhere.
pub trait RollTracker: Send + Sync {
    fn roll_count(&self, symbol: &str) -> u32;
    fn original_entry_price(&self, symbol: &str) -> Option<f64>;
}

/// Tracker for callers that do not roll positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRolls;

impl RollTracker for NoRolls {
    fn roll_count(&self, _symbol: &str) -> u32 {
        0
    }

    fn original_entry_price(&self, _symbol: &str) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollStatus {
    pub count: u32,
    pub max: u32,
    pub original_entry_price: Option<f64>,
}

impl RollStatus {
    pub fn lookup(tracker: &dyn RollTracker, symbol: &str, max: u32) -> Self {
        Self {
            count: tracker.roll_count(symbol),
            max,
            original_entry_price: tracker.original_entry_price(symbol),
        }
    }

    pub fn exhausted(&self) -> bool {
        self.count >= self.max
    }
}

fn response_format(close_fields: bool) -> String {
    let mut example = serde_json::json!({
        "action": "OPEN_LONG | OPEN_SHORT | CLOSE | CLOSE_LONG | CLOSE_SHORT | HOLD",
        "confidence": "<0-100>",
        "narrative": "<one or two sentences>",
        "reasoning": "<full analysis>",
        "position_size": "<percent of available balance>",
        "leverage": "<integer>",
        "stop_loss_pct": "<percent>",
        "take_profit_pct": "<percent>"
    });
    if close_fields {
        example["close_percentage"] = serde_json::json!("<1-100, close actions only>");
    }
    let schema = serde_json::to_string_pretty(&example).unwrap_or_default();
    format!("## RESPONSE FORMAT\nReply with a single JSON object in a ```json block:\n{schema}")
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.precision$}"))
}

fn push_market(lines: &mut Vec<String>, market: &MarketSnapshot) {
    lines.push(format!("## MARKET: {}", market.symbol));
    lines.push(format!("- Current price: {}", market.current_price));
    lines.push(format!(
        "- 24h change: {}%",
        fmt_opt(market.price_change_24h, 2)
    ));
    lines.push(format!("- RSI: {}", fmt_opt(market.rsi, 2)));
    if let Some(macd) = &market.macd {
        lines.push(format!(
            "- MACD: {:.4} / signal {:.4} / histogram {:.4}",
            macd.macd, macd.signal, macd.histogram
        ));
    }
    if let Some(trend) = &market.trend {
        lines.push(format!("- Trend: {trend}"));
    }
    for (name, values) in &market.series {
        let tail = &values[values.len().saturating_sub(SERIES_TAIL)..];
        let rendered: Vec<String> = tail.iter().map(|v| v.to_string()).collect();
        lines.push(format!("- {name} (last {}): [{}]", tail.len(), rendered.join(", ")));
    }
    if let Some(at) = market.captured_at {
        lines.push(format!("- Captured at: {}", at.to_rfc3339()));
    }
}

/// User content for an open/hold/close decision on a symbol.
pub fn market_analysis_prompt(
    market: &MarketSnapshot,
    account: &AccountSnapshot,
    history: &[TradeRecord],
) -> String {
    let mut lines = Vec::new();
    push_market(&mut lines, market);

    lines.push(String::new());
    lines.push("## ACCOUNT".to_string());
    lines.push(format!("- Balance: {}", account.balance));
    lines.push(format!("- Available: {}", account.available_balance));
    if account.positions.is_empty() {
        lines.push("- Open positions: none".to_string());
    } else {
        lines.push(format!("- Open positions: {}", account.positions.len()));
        for p in &account.positions {
            lines.push(format!(
                "  - {} {} {}x entry {} current {} pnl {:.2}%",
                p.symbol,
                p.side.label(),
                p.leverage,
                p.entry_price,
                p.current_price,
                p.unrealized_pnl_pct
            ));
        }
    }

    if !history.is_empty() {
        lines.push(String::new());
        lines.push("## RECENT TRADES".to_string());
        for trade in &history[history.len().saturating_sub(HISTORY_TAIL)..] {
            let pnl = trade
                .realized_pnl
                .map_or_else(|| "open".to_string(), |p| p.to_string());
            lines.push(format!(
                "- {} {} {} @ {} pnl {}",
                trade.executed_at.format("%Y-%m-%d %H:%M"),
                trade.symbol,
                trade.action,
                trade.price,
                pnl
            ));
        }
    }

    lines.push(String::new());
    lines.push(response_format(false));
    lines.join("\n")
}

fn holding_time(opened_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - opened_at).num_minutes().max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}

fn marker(reached: bool) -> &'static str {
    if reached {
        "REACHED"
    } else {
        "not reached"
    }
}

/// User content for a close/hold evaluation of an open position.
///
/// `risk` is omitted when it could not be computed.
pub fn position_evaluation_prompt(
    position: &PositionSnapshot,
    market: Option<&MarketSnapshot>,
    risk: Option<&RiskContext>,
    rolls: &RollStatus,
    now: DateTime<Utc>,
) -> String {
    let mut lines = Vec::new();
    lines.push(format!("## POSITION: {} {}", position.symbol, position.side.label()));
    lines.push(format!("- Entry price: {}", position.entry_price));
    lines.push(format!("- Current price: {}", position.current_price));
    lines.push(format!("- Unrealized PnL: {:.2}%", position.unrealized_pnl_pct));
    lines.push(format!("- Leverage: {}x", position.leverage));
    if let Some(opened_at) = position.opened_at {
        lines.push(format!("- Holding time: {}", holding_time(opened_at, now)));
    }
    lines.push(format!("- ROLL count: {}/{}", rolls.count, rolls.max));
    if rolls.exhausted() {
        lines.push("- ROLL limit reached: no further rolls allowed".to_string());
    }
    if let Some(original) = rolls.original_entry_price {
        lines.push(format!("- Original entry price: {original}"));
    }

    if let Some(risk) = risk {
        let t = &risk.thresholds;
        lines.push(String::new());
        lines.push("## RISK".to_string());
        lines.push(format!("- Liquidation price: {:.4}", risk.liquidation_price));
        lines.push(format!(
            "- Distance to liquidation: {:.2}% ({})",
            risk.distance_to_liquidation_pct,
            risk.tier.label()
        ));
        if t.scaled {
            lines.push("- Thresholds tightened for high leverage".to_string());
        }
        lines.push(format!(
            "- Protect trigger {:.2}%: {}",
            t.protect_trigger_pct,
            marker(risk.stage >= ThresholdStage::Protect)
        ));
        lines.push(format!(
            "- Roll trigger {:.2}%: {}",
            t.roll_trigger_pct,
            marker(risk.stage >= ThresholdStage::Roll)
        ));
        lines.push(format!(
            "- Roll cap trigger {:.2}%: {}",
            t.roll_cap_trigger_pct,
            marker(risk.stage >= ThresholdStage::RollCap)
        ));
    }

    if let Some(market) = market {
        lines.push(String::new());
        push_market(&mut lines, market);
    }

    lines.push(String::new());
    lines.push(response_format(true));
    lines.join("\n")
}
