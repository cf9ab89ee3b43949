//! Simulation configuration

use crate::errors::ConfigError;
use crate::simulation::amm::AmmParameters;
use crate::utils::amm_math::BPS_DENOMINATOR;
use crate::utils::fixed_point::{expand_to_18_decimals, u256_dec};
use anyhow::Context;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::simulation::mitigator::OraclePolicy;

/// Caller-side retry of swaps that would not go through.
///
/// Before submitting, a swap is dry-run and its amount shrunk by
/// `decrease_numerator / decrease_denominator` until it verifies or
/// `max_attempts` is used up. `max_attempts = 1` disables retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub decrease_numerator: u64,
    pub decrease_denominator: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            decrease_numerator: 3,
            decrease_denominator: 4,
        }
    }
}

impl RetryPolicy {
    pub fn enabled(&self) -> bool {
        self.max_attempts > 1
    }

    /// Next, smaller amount to try
    pub fn shrink(&self, amount: U256) -> U256 {
        amount * U256::from(self.decrease_numerator) / U256::from(self.decrease_denominator)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidRetry("max_attempts must be at least 1".into()));
        }
        if self.decrease_denominator == 0 || self.decrease_numerator >= self.decrease_denominator {
            return Err(ConfigError::InvalidRetry(format!(
                "decrease factor {}/{} must be below 1",
                self.decrease_numerator, self.decrease_denominator
            )));
        }
        Ok(())
    }
}

/// Distribution of swap sizes, in whole tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmountDistribution {
    Weibull { shape: f64, scale: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Pareto { scale: f64, shape: f64 },
    HalfCauchy { scale: f64 },
}

impl AmountDistribution {
    fn validate(&self) -> Result<(), ConfigError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidGenerator(format!("{name} must be positive, got {value}")))
            }
        };
        match *self {
            AmountDistribution::Weibull { shape, scale } => {
                positive("weibull shape", shape)?;
                positive("weibull scale", scale)
            }
            AmountDistribution::LogNormal { mu, sigma } => {
                if !mu.is_finite() {
                    return Err(ConfigError::InvalidGenerator(format!("lognormal mu must be finite, got {mu}")));
                }
                positive("lognormal sigma", sigma)
            }
            AmountDistribution::Pareto { scale, shape } => {
                positive("pareto scale", scale)?;
                positive("pareto shape", shape)
            }
            AmountDistribution::HalfCauchy { scale } => positive("cauchy scale", scale),
        }
    }
}

/// Parameters of the synthetic request stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Unix timestamp of the first generated second
    pub start_timestamp: u64,

    /// Length of the generated stream in hours
    pub duration_hours: u64,

    /// Mean number of X -> Y swaps per hour
    pub swaps_per_hour_x: f64,

    /// Mean number of Y -> X swaps per hour
    pub swaps_per_hour_y: f64,

    pub amount_x: AmountDistribution,
    pub amount_y: AmountDistribution,

    /// Soft cap on swap sizes in tokens; larger draws are folded back under it
    pub amount_limit: Option<f64>,

    /// Swaps in the first `warmup_hours` are divided by `warmup_divisor`
    pub warmup_hours: u64,
    pub warmup_divisor: u64,

    /// Mean number of mint and burn events per hour (0 disables them)
    pub liquidity_events_per_hour: f64,

    /// Size of a mint or burn as a fraction of the initial reserves
    pub liquidity_fraction: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            start_timestamp: 1_640_995_200, // 2022-01-01T00:00:00Z
            duration_hours: 72,
            swaps_per_hour_x: 2.0,
            swaps_per_hour_y: 2.0,
            amount_x: AmountDistribution::Weibull {
                shape: 0.9,
                scale: 1_000.0,
            },
            amount_y: AmountDistribution::Weibull {
                shape: 0.9,
                scale: 1_000.0,
            },
            amount_limit: None,
            warmup_hours: 24,
            warmup_divisor: 1_000,
            liquidity_events_per_hour: 0.0,
            liquidity_fraction: 0.05,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, rate) in [
            ("swaps_per_hour_x", self.swaps_per_hour_x),
            ("swaps_per_hour_y", self.swaps_per_hour_y),
            ("liquidity_events_per_hour", self.liquidity_events_per_hour),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(ConfigError::InvalidGenerator(format!("{name} must be non-negative, got {rate}")));
            }
        }
        if let Some(limit) = self.amount_limit {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(ConfigError::InvalidGenerator(format!("amount_limit must be positive, got {limit}")));
            }
        }
        if self.warmup_divisor == 0 {
            return Err(ConfigError::InvalidGenerator("warmup_divisor must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.liquidity_fraction) {
            return Err(ConfigError::InvalidGenerator(format!(
                "liquidity_fraction must be in [0, 1), got {}",
                self.liquidity_fraction
            )));
        }
        self.amount_x.validate()?;
        self.amount_y.validate()
    }
}

/// Main simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub token_x: String,
    pub token_y: String,

    /// Initial reserves, 18 decimals
    #[serde(with = "u256_dec")]
    pub initial_reserve_x: U256,
    #[serde(with = "u256_dec")]
    pub initial_reserve_y: U256,

    /// TWAP window in seconds
    pub window_size: u64,

    /// Number of observation slots in the window
    pub granularity: u64,

    /// Upper bound of the slice factor curve (0 - 100)
    pub price_tolerance_threshold: u8,

    /// Block time in seconds
    pub avg_block_time: u64,

    /// Mitigation flag for single runs (`replay`, `probe`)
    pub mitigation_enabled: bool,

    pub on_oracle_unavailable: OraclePolicy,

    /// Slippage tolerance given to generated swaps, in basis points
    pub default_slippage_bps: u16,

    pub retry: RetryPolicy,

    pub generator: GeneratorConfig,

    /// RNG seed of the request generator
    pub seed: u64,

    /// Output directory for logs and reports
    pub output_dir: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            token_x: "X".to_string(),
            token_y: "Y".to_string(),
            initial_reserve_x: expand_to_18_decimals(30_000),
            initial_reserve_y: expand_to_18_decimals(30_000),
            window_size: 24 * 60 * 60,
            granularity: 24,
            price_tolerance_threshold: 98,
            avg_block_time: 12,
            mitigation_enabled: true,
            on_oracle_unavailable: OraclePolicy::Allow,
            default_slippage_bps: 100,
            retry: RetryPolicy::default(),
            generator: GeneratorConfig::default(),
            seed: 42,
            output_dir: "output".to_string(),
        }
    }
}

impl SimulationConfig {
    /// Create config for a quick test run
    pub fn quick_test() -> Self {
        Self {
            window_size: 60 * 60,
            granularity: 12,
            generator: GeneratorConfig {
                duration_hours: 6,
                swaps_per_hour_x: 20.0,
                swaps_per_hour_y: 20.0,
                warmup_hours: 0,
                ..GeneratorConfig::default()
            },
            ..Self::default()
        }
    }

    /// Load and validate a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&json).with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn period_size(&self) -> u64 {
        self.window_size / self.granularity.max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_x == self.token_y {
            return Err(ConfigError::SameToken);
        }
        if self.granularity == 0 {
            return Err(ConfigError::ZeroGranularity);
        }
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.window_size % self.granularity != 0 {
            return Err(ConfigError::WindowNotDivisible {
                window_size: self.window_size,
                granularity: self.granularity,
            });
        }
        if self.avg_block_time == 0 {
            return Err(ConfigError::ZeroBlockTime);
        }
        if self.price_tolerance_threshold > 100 {
            return Err(ConfigError::ThresholdOutOfRange(self.price_tolerance_threshold));
        }
        if self.default_slippage_bps as u64 > BPS_DENOMINATOR {
            return Err(ConfigError::SlippageOutOfRange(self.default_slippage_bps));
        }
        self.retry.validate()?;
        self.generator.validate()
    }

    /// Engine parameters with mitigation switched as given
    pub fn amm_parameters(&self, mitigation_enabled: bool) -> AmmParameters {
        AmmParameters {
            token_x: self.token_x.clone(),
            token_y: self.token_y.clone(),
            reserve_x: self.initial_reserve_x,
            reserve_y: self.initial_reserve_y,
            mitigation_enabled,
            window_size: self.window_size,
            period_size: self.period_size(),
            granularity: self.granularity,
            price_tolerance_threshold: self.price_tolerance_threshold,
            on_oracle_unavailable: self.on_oracle_unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::amm::Amm;

    #[test]
    fn test_presets_are_valid() {
        SimulationConfig::default().validate().unwrap();
        SimulationConfig::quick_test().validate().unwrap();
        assert_eq!(SimulationConfig::default().period_size(), 3_600);
        assert_eq!(SimulationConfig::quick_test().period_size(), 300);
    }

    #[test]
    fn test_validation_errors() {
        let config = SimulationConfig {
            granularity: 7,
            ..SimulationConfig::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::WindowNotDivisible {
                window_size: 86_400,
                granularity: 7
            }
        );

        let config = SimulationConfig {
            avg_block_time: 0,
            ..SimulationConfig::default()
        };
        assert_eq!(config.validate().unwrap_err(), ConfigError::ZeroBlockTime);

        let config = SimulationConfig {
            token_y: "X".to_string(),
            ..SimulationConfig::default()
        };
        assert_eq!(config.validate().unwrap_err(), ConfigError::SameToken);

        let mut config = SimulationConfig::default();
        config.generator.amount_x = AmountDistribution::Pareto {
            scale: 0.0,
            shape: 1.0,
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGenerator(_))));

        let mut config = SimulationConfig::default();
        config.retry.decrease_numerator = 4;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry(_))));
    }

    #[test]
    fn test_retry_shrink() {
        let retry = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        assert!(retry.enabled());
        assert!(!RetryPolicy::default().enabled());
        assert_eq!(retry.shrink(U256::from(1_000)), U256::from(750));
    }

    #[test]
    fn test_amm_parameters() {
        let config = SimulationConfig::quick_test();
        let params = config.amm_parameters(false);
        assert!(!params.mitigation_enabled);
        assert_eq!(params.period_size * params.granularity, params.window_size);
        Amm::new(&params).unwrap();
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = SimulationConfig {
            seed: 7,
            on_oracle_unavailable: OraclePolicy::Reject,
            ..SimulationConfig::quick_test()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = SimulationConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""initial_reserve_x":"30000000000000000000000""#));
        assert!(json.contains(r#""on_oracle_unavailable":"reject""#));
    }

    #[test]
    fn test_invalid_json_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = SimulationConfig {
            price_tolerance_threshold: 101,
            ..SimulationConfig::default()
        };
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        assert!(SimulationConfig::from_json_file(&path).is_err());
        assert!(SimulationConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
