//! Swap size sampling

use crate::config::AmountDistribution;
use crate::errors::ConfigError;
use rand::Rng;
use rand_distr::{Cauchy, Distribution, LogNormal, Pareto, Weibull};

/// Sampler of swap sizes in whole tokens
#[derive(Debug, Clone, Copy)]
pub enum AmountSampler {
    Weibull(Weibull<f64>),
    LogNormal(LogNormal<f64>),
    Pareto(Pareto<f64>),
    HalfCauchy(Cauchy<f64>),
}

fn invalid(err: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidGenerator(err.to_string())
}

impl AmountSampler {
    pub fn new(distribution: &AmountDistribution) -> Result<Self, ConfigError> {
        Ok(match *distribution {
            AmountDistribution::Weibull { shape, scale } => {
                AmountSampler::Weibull(Weibull::new(scale, shape).map_err(invalid)?)
            }
            AmountDistribution::LogNormal { mu, sigma } => {
                AmountSampler::LogNormal(LogNormal::new(mu, sigma).map_err(invalid)?)
            }
            AmountDistribution::Pareto { scale, shape } => {
                AmountSampler::Pareto(Pareto::new(scale, shape).map_err(invalid)?)
            }
            AmountDistribution::HalfCauchy { scale } => {
                AmountSampler::HalfCauchy(Cauchy::new(0.0, scale).map_err(invalid)?)
            }
        })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            AmountSampler::Weibull(d) => d.sample(rng),
            AmountSampler::LogNormal(d) => d.sample(rng),
            AmountSampler::Pareto(d) => d.sample(rng),
            AmountSampler::HalfCauchy(d) => d.sample(rng).abs(),
        }
    }
}

/// Fold a draw back under `limit`: `value / (floor(value / limit) + 1)`.
///
/// Keeps heavy tails from producing swaps larger than the pool while
/// preserving their relative spread.
pub fn soft_limit(value: f64, limit: f64) -> f64 {
    value / ((value / limit).floor() + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_soft_limit() {
        assert_eq!(soft_limit(50.0, 100.0), 50.0);
        assert_eq!(soft_limit(150.0, 100.0), 75.0);
        assert_eq!(soft_limit(1_000.0, 100.0), 1_000.0 / 11.0);
        for v in [0.0, 99.9, 100.0, 12_345.6, 1e12] {
            assert!(soft_limit(v, 100.0) < 100.0);
        }
    }

    #[test]
    fn test_samples_are_non_negative() {
        let mut rng = StdRng::seed_from_u64(3);
        let distributions = [
            AmountDistribution::Weibull { shape: 0.9, scale: 1_000.0 },
            AmountDistribution::LogNormal { mu: 5.0, sigma: 1.0 },
            AmountDistribution::Pareto { scale: 10.0, shape: 1.5 },
            AmountDistribution::HalfCauchy { scale: 500.0 },
        ];
        for distribution in &distributions {
            let sampler = AmountSampler::new(distribution).unwrap();
            for _ in 0..200 {
                let v = sampler.sample(&mut rng);
                assert!(v >= 0.0 && !v.is_nan());
            }
        }
    }

    #[test]
    fn test_invalid_parameters() {
        let err = AmountSampler::new(&AmountDistribution::Weibull { shape: -1.0, scale: 1.0 }).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGenerator(_)));
    }
}
