//! Pure risk arithmetic for leveraged positions.
//!
//! Nothing here performs I/O or holds state; every function is safe to call
//! from concurrent evaluations.

pub mod calculator;
pub mod context;
pub mod error;

pub use calculator::{
    distance_to_liquidation_pct, leverage_scaled_thresholds, liquidation_price, risk_tier,
    RiskTier, ThresholdBase, ThresholdSet, DEFAULT_MAINTENANCE_MARGIN_RATE,
};
pub use context::{RiskContext, ThresholdStage};
pub use error::RiskError;
