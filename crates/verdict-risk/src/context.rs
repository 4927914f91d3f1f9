use serde::{Deserialize, Serialize};
use verdict_models::{PositionSnapshot, RiskConfig};

use crate::calculator::{
    distance_to_liquidation_pct, leverage_scaled_thresholds, liquidation_price, risk_tier,
    RiskTier, ThresholdBase, ThresholdSet,
};
use crate::error::RiskError;

impl From<&RiskConfig> for ThresholdBase {
    fn from(config: &RiskConfig) -> Self {
        Self {
            protect_pct: config.protect_trigger_pct,
            roll_pct: config.roll_trigger_pct,
            roll_cap_pct: config.roll_cap_trigger_pct,
        }
    }
}

/// Highest threshold an unrealized profit has reached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStage {
    Below,
    Protect,
    Roll,
    RollCap,
}

impl ThresholdSet {
    pub fn stage(&self, pnl_pct: f64) -> ThresholdStage {
        if pnl_pct >= self.roll_cap_trigger_pct {
            ThresholdStage::RollCap
        } else if pnl_pct >= self.roll_trigger_pct {
            ThresholdStage::Roll
        } else if pnl_pct >= self.protect_trigger_pct {
            ThresholdStage::Protect
        } else {
            ThresholdStage::Below
        }
    }
}

/// Derived risk figures for one position, recomputed on every evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskContext {
    pub liquidation_price: f64,
    pub distance_to_liquidation_pct: f64,
    pub tier: RiskTier,
    pub thresholds: ThresholdSet,
    pub stage: ThresholdStage,
}

impl RiskContext {
    pub fn compute(position: &PositionSnapshot, config: &RiskConfig) -> Result<Self, RiskError> {
        let leverage = f64::from(position.leverage);
        let liquidation = liquidation_price(
            position.entry_price,
            leverage,
            position.side,
            config.maintenance_margin_rate,
        )?;
        let distance =
            distance_to_liquidation_pct(position.current_price, liquidation, position.side)?;
        let thresholds = leverage_scaled_thresholds(leverage, ThresholdBase::from(config));

        Ok(Self {
            liquidation_price: liquidation,
            distance_to_liquidation_pct: distance,
            tier: risk_tier(distance),
            thresholds,
            stage: thresholds.stage(position.unrealized_pnl_pct),
        })
    }
}
