use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Invalid leverage: {0} (must be > 0)")]
    InvalidLeverage(f64),

    #[error("Invalid price: {0} (must be > 0)")]
    InvalidPrice(f64),

    #[error("Invalid maintenance margin rate: {0} (must be in [0, 1))")]
    InvalidMarginRate(f64),
}
