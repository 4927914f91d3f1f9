use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Top-level configuration for Verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VerdictConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub profiles: ProfilesConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub policy: DecisionPolicy,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub pricing: CachePricing,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Where the completion API lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
        }
    }
}

/// Generation parameters for one class of model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfilesConfig {
    /// Fast chat model used for routine decisions.
    #[serde(default = "default_fast_profile")]
    pub fast: ProfileConfig,
    /// Deep-reasoning model; slower, so it gets a longer timeout.
    #[serde(default = "default_reasoning_profile")]
    pub reasoning: ProfileConfig,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            fast: default_fast_profile(),
            reasoning: default_reasoning_profile(),
        }
    }
}

fn default_fast_profile() -> ProfileConfig {
    ProfileConfig {
        model: "deepseek-chat".to_string(),
        temperature: 0.7,
        max_tokens: 2000,
        timeout_seconds: 180,
    }
}

fn default_reasoning_profile() -> ProfileConfig {
    ProfileConfig {
        model: "deepseek-reasoner".to_string(),
        temperature: 1.0,
        max_tokens: 8000,
        timeout_seconds: 300,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Additional attempts after the first one. Hard ceiling.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

/// Clamp ranges and defaults applied to every model decision.
///
/// This is the only place these bounds live; the validator and the
/// pipeline read them from here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecisionPolicy {
    pub min_position_size: u8,
    pub max_position_size: u8,
    pub default_position_size: u8,
    pub min_leverage: u32,
    pub max_leverage: u32,
    pub default_leverage: u32,
    pub min_stop_loss_pct: f64,
    pub max_stop_loss_pct: f64,
    pub default_stop_loss_pct: f64,
    pub min_take_profit_pct: f64,
    pub max_take_profit_pct: f64,
    pub default_take_profit_pct: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            min_position_size: 1,
            max_position_size: 100,
            default_position_size: 5,
            min_leverage: 1,
            max_leverage: 30,
            default_leverage: 3,
            min_stop_loss_pct: 0.5,
            max_stop_loss_pct: 10.0,
            default_stop_loss_pct: 2.0,
            min_take_profit_pct: 1.0,
            max_take_profit_pct: 20.0,
            default_take_profit_pct: 4.0,
        }
    }
}

impl DecisionPolicy {
    /// Check that every range is ordered and contains its default.
    pub fn check(&self) -> Result<(), PolicyError> {
        fn ordered<T: PartialOrd + std::fmt::Display>(
            field: &'static str,
            min: T,
            default: T,
            max: T,
        ) -> Result<(), PolicyError> {
            if min <= default && default <= max {
                Ok(())
            } else {
                Err(PolicyError::Unordered {
                    field,
                    min: min.to_string(),
                    default: default.to_string(),
                    max: max.to_string(),
                })
            }
        }

        if self.min_position_size == 0 || self.max_position_size > 100 {
            return Err(PolicyError::PositionSizeBounds);
        }
        if self.min_leverage == 0 {
            return Err(PolicyError::ZeroLeverage);
        }
        ordered(
            "position_size",
            self.min_position_size,
            self.default_position_size,
            self.max_position_size,
        )?;
        ordered(
            "leverage",
            self.min_leverage,
            self.default_leverage,
            self.max_leverage,
        )?;
        ordered(
            "stop_loss_pct",
            self.min_stop_loss_pct,
            self.default_stop_loss_pct,
            self.max_stop_loss_pct,
        )?;
        ordered(
            "take_profit_pct",
            self.min_take_profit_pct,
            self.default_take_profit_pct,
            self.max_take_profit_pct,
        )
    }
}

/// Inputs to the risk calculator and the ROLL context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    pub maintenance_margin_rate: f64,
    /// Maximum ROLL (pyramiding) count per position.
    pub max_rolls: u32,
    pub protect_trigger_pct: f64,
    pub roll_trigger_pct: f64,
    pub roll_cap_trigger_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            maintenance_margin_rate: 0.05,
            max_rolls: 6,
            protect_trigger_pct: 3.0,
            roll_trigger_pct: 6.0,
            roll_cap_trigger_pct: 8.0,
        }
    }
}

/// Input token prices used for the cache-efficiency estimate (USD per 1M tokens).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CachePricing {
    pub cache_hit_usd_per_million: f64,
    pub cache_miss_usd_per_million: f64,
}

impl Default for CachePricing {
    fn default() -> Self {
        Self {
            cache_hit_usd_per_million: 0.07,
            cache_miss_usd_per_million: 0.27,
        }
    }
}

/// System prompt files owned by the strategy layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptsConfig {
    pub market_analysis: String,
    pub position_evaluation: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            market_analysis: "prompts/trading_strategy.md".to_string(),
            position_evaluation: "prompts/evaluate_closing.md".to_string(),
        }
    }
}
