pub mod config;
pub mod decision;
pub mod error;
pub mod snapshot;

pub use config::{
    ApiConfig, CachePricing, DecisionPolicy, ProfileConfig, ProfilesConfig, PromptsConfig,
    RetryConfig, RiskConfig, VerdictConfig,
};
pub use decision::{Action, Decision, DecisionSource, UnknownAction};
pub use error::PolicyError;
pub use snapshot::{
    AccountSnapshot, MacdSnapshot, MarketSnapshot, PositionSide, PositionSnapshot, TradeRecord,
};
