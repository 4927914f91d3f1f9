use thiserror::Error;

/// A `[policy]` section that cannot be applied consistently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("position_size must stay within 1..=100")]
    PositionSizeBounds,

    #[error("min_leverage must be at least 1")]
    ZeroLeverage,

    #[error("{field}: expected min <= default <= max, got {min} / {default} / {max}")]
    Unordered {
        field: &'static str,
        min: String,
        default: String,
        max: String,
    },
}
