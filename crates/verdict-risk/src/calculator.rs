use serde::{Deserialize, Serialize};
use verdict_models::PositionSide;

use crate::error::RiskError;

pub const DEFAULT_MAINTENANCE_MARGIN_RATE: f64 = 0.05;

/// Leverage above which every threshold is scaled down.
const HIGH_LEVERAGE_CUTOFF: f64 = 10.0;
const HIGH_LEVERAGE_SCALE: f64 = 0.8;

const CRITICAL_DISTANCE_PCT: f64 = 5.0;
const HIGH_DISTANCE_PCT: f64 = 10.0;
const WARNING_DISTANCE_PCT: f64 = 20.0;

fn require_positive_price(price: f64) -> Result<(), RiskError> {
    // `!(x > 0)` also rejects NaN
    if !(price > 0.0) || !price.is_finite() {
        return Err(RiskError::InvalidPrice(price));
    }
    Ok(())
}

/// Price at which the exchange liquidates the position.
///
/// - LONG: `entry * (1 - (1 - mmr) / leverage)`
/// - SHORT: `entry * (1 + (1 - mmr) / leverage)`
pub fn liquidation_price(
    entry_price: f64,
    leverage: f64,
    side: PositionSide,
    maintenance_margin_rate: f64,
) -> Result<f64, RiskError> {
    require_positive_price(entry_price)?;
    if !(leverage > 0.0) || !leverage.is_finite() {
        return Err(RiskError::InvalidLeverage(leverage));
    }
    if !(0.0..1.0).contains(&maintenance_margin_rate) {
        return Err(RiskError::InvalidMarginRate(maintenance_margin_rate));
    }

    let buffer = (1.0 - maintenance_margin_rate) / leverage;
    Ok(match side {
        PositionSide::Long => entry_price * (1.0 - buffer),
        PositionSide::Short => entry_price * (1.0 + buffer),
    })
}

/// Gap between the current price and liquidation, as a percent of the current
/// price. Positive means the position is still on the safe side; larger is safer.
pub fn distance_to_liquidation_pct(
    current_price: f64,
    liquidation_price: f64,
    side: PositionSide,
) -> Result<f64, RiskError> {
    require_positive_price(current_price)?;
    if !liquidation_price.is_finite() {
        return Err(RiskError::InvalidPrice(liquidation_price));
    }

    let gap = match side {
        PositionSide::Long => current_price - liquidation_price,
        PositionSide::Short => liquidation_price - current_price,
    };
    Ok(gap / current_price * 100.0)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Safe,
    Warning,
    High,
    Critical,
}

impl RiskTier {
    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::Safe => "safe",
            RiskTier::Warning => "warning",
            RiskTier::High => "high",
            RiskTier::Critical => "critical",
        }
    }
}

/// Lower bounds are exclusive: exactly 5% is `High`, not `Critical`.
pub fn risk_tier(distance_pct: f64) -> RiskTier {
    if distance_pct < CRITICAL_DISTANCE_PCT {
        RiskTier::Critical
    } else if distance_pct < HIGH_DISTANCE_PCT {
        RiskTier::High
    } else if distance_pct < WARNING_DISTANCE_PCT {
        RiskTier::Warning
    } else {
        RiskTier::Safe
    }
}

/// Unscaled profit thresholds, in percent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThresholdBase {
    pub protect_pct: f64,
    pub roll_pct: f64,
    pub roll_cap_pct: f64,
}

impl Default for ThresholdBase {
    fn default() -> Self {
        Self {
            protect_pct: 3.0,
            roll_pct: 6.0,
            roll_cap_pct: 8.0,
        }
    }
}

/// Profit thresholds after the leverage rule has been applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThresholdSet {
    /// Start the trailing stop.
    pub protect_trigger_pct: f64,
    /// Add to the position (ROLL).
    pub roll_trigger_pct: f64,
    /// Take partial profit once the ROLL cap is reached.
    pub roll_cap_trigger_pct: f64,
    pub scaled: bool,
}

/// The one rule for leverage-adjusted thresholds: above 10x every base is
/// multiplied by 0.8, otherwise the bases are returned unchanged.
pub fn leverage_scaled_thresholds(leverage: f64, base: ThresholdBase) -> ThresholdSet {
    let scaled = leverage > HIGH_LEVERAGE_CUTOFF;
    let factor = if scaled { HIGH_LEVERAGE_SCALE } else { 1.0 };
    ThresholdSet {
        protect_trigger_pct: base.protect_pct * factor,
        roll_trigger_pct: base.roll_pct * factor,
        roll_cap_trigger_pct: base.roll_cap_pct * factor,
        scaled,
    }
}
