//! Request Generators
//!
//! Sources of request streams for the engine: a seeded Monte Carlo
//! generator (Poisson arrivals, heavy-tailed swap sizes, optional
//! liquidity events) and a fixed, pre-recorded stream for replays.

pub mod amounts;

use crate::config::SimulationConfig;
use crate::errors::ConfigError;
use crate::simulation::transaction::{LiquidityRequest, Request, SwapRequest};
use crate::utils::fixed_point::expand_f64_to_18_decimals;
use amounts::{soft_limit, AmountSampler};
use primitive_types::U256;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use tracing::debug;

const SECONDS_PER_HOUR: f64 = 3_600.0;

pub trait RequestGenerator {
    /// Requests ordered by timestamp
    fn generate(&mut self) -> Vec<Request>;
}

/// Arrival times of a Poisson process with `rate_per_hour` over `[start, end)`
pub fn poisson_arrivals<R: Rng + ?Sized>(rng: &mut R, rate_per_hour: f64, start: u64, end: u64) -> Vec<u64> {
    let mut arrivals = Vec::new();
    if rate_per_hour <= 0.0 {
        return arrivals;
    }
    let Ok(inter_arrival) = Exp::new(rate_per_hour / SECONDS_PER_HOUR) else {
        return arrivals;
    };

    let mut t = start as f64;
    loop {
        t += inter_arrival.sample(rng);
        if t >= end as f64 {
            break;
        }
        arrivals.push(t as u64);
    }
    arrivals
}

/// Seeded synthetic request stream
pub struct MonteCarloGenerator {
    config: SimulationConfig,
    sampler_x: AmountSampler,
    sampler_y: AmountSampler,
    rng: StdRng,
}

impl MonteCarloGenerator {
    pub fn new(config: &SimulationConfig) -> Result<Self, ConfigError> {
        config.generator.validate()?;
        Ok(Self {
            sampler_x: AmountSampler::new(&config.generator.amount_x)?,
            sampler_y: AmountSampler::new(&config.generator.amount_y)?,
            rng: StdRng::seed_from_u64(config.seed),
            config: config.clone(),
        })
    }

    fn end_timestamp(&self) -> u64 {
        let generator = &self.config.generator;
        generator.start_timestamp + generator.duration_hours * 3_600
    }

    fn swap_amount(&mut self, sampler: AmountSampler, timestamp: u64) -> U256 {
        let generator = &self.config.generator;
        let mut tokens = sampler.sample(&mut self.rng);
        if let Some(limit) = generator.amount_limit {
            tokens = soft_limit(tokens, limit);
        }

        let amount = expand_f64_to_18_decimals(tokens);
        if timestamp < generator.start_timestamp + generator.warmup_hours * 3_600 {
            amount / U256::from(generator.warmup_divisor)
        } else {
            amount
        }
    }

    fn swaps(&mut self, token_in: &str, token_out: &str, rate_per_hour: f64, sampler: AmountSampler) -> Vec<Request> {
        let start = self.config.generator.start_timestamp;
        let end = self.end_timestamp();
        let arrivals = poisson_arrivals(&mut self.rng, rate_per_hour, start, end);

        let mut requests = Vec::with_capacity(arrivals.len());
        for timestamp in arrivals {
            let token_in_amount = self.swap_amount(sampler, timestamp);
            if token_in_amount.is_zero() {
                continue;
            }
            requests.push(Request::Swap(SwapRequest {
                timestamp,
                token_in: token_in.to_string(),
                token_out: token_out.to_string(),
                token_in_amount,
                slippage_bps: self.config.default_slippage_bps,
            }));
        }
        requests
    }

    fn liquidity_events(&mut self) -> Vec<Request> {
        let generator = &self.config.generator;
        let start = generator.start_timestamp;
        let end = self.end_timestamp();
        let rate = generator.liquidity_events_per_hour;

        // Fraction in millionths keeps the sizing in integers
        let parts_per_million = U256::from((generator.liquidity_fraction * 1e6).round() as u64);
        let million = U256::from(1_000_000u64);
        let x_amount = self.config.initial_reserve_x * parts_per_million / million;
        let y_amount = self.config.initial_reserve_y * parts_per_million / million;

        poisson_arrivals(&mut self.rng, rate, start, end)
            .into_iter()
            .map(|timestamp| {
                let liquidity = LiquidityRequest {
                    timestamp,
                    x_amount,
                    y_amount,
                };
                if self.rng.gen_bool(0.5) {
                    Request::Mint(liquidity)
                } else {
                    Request::Burn(liquidity)
                }
            })
            .collect()
    }
}

impl RequestGenerator for MonteCarloGenerator {
    fn generate(&mut self) -> Vec<Request> {
        let token_x = self.config.token_x.clone();
        let token_y = self.config.token_y.clone();
        let rate_x = self.config.generator.swaps_per_hour_x;
        let rate_y = self.config.generator.swaps_per_hour_y;

        let mut requests = self.swaps(&token_x, &token_y, rate_x, self.sampler_x);
        requests.extend(self.swaps(&token_y, &token_x, rate_y, self.sampler_y));
        requests.extend(self.liquidity_events());

        // Stable: equal timestamps keep generation order
        requests.sort_by_key(Request::timestamp);
        debug!(requests = requests.len(), "generated request stream");
        requests
    }
}

/// Pre-recorded stream, e.g. historical transactions loaded from disk
pub struct RecordedRequests {
    pub requests: Vec<Request>,
}

impl RequestGenerator for RecordedRequests {
    fn generate(&mut self) -> Vec<Request> {
        let mut requests = self.requests.clone();
        requests.sort_by_key(Request::timestamp);
        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AmountDistribution;
    use crate::simulation::transaction::TransactionType;
    use crate::utils::fixed_point::expand_to_18_decimals;

    #[test]
    fn test_poisson_arrivals_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let arrivals = poisson_arrivals(&mut rng, 30.0, 1_000, 1_000 + 10 * 3_600);

        assert!(arrivals.windows(2).all(|w| w[0] <= w[1]));
        assert!(arrivals.iter().all(|t| (1_000..1_000 + 10 * 3_600).contains(t)));
        // 300 expected
        assert!(arrivals.len() > 200 && arrivals.len() < 400);

        assert!(poisson_arrivals(&mut rng, 0.0, 0, 3_600).is_empty());
    }

    #[test]
    fn test_generation_is_deterministic() {
        let config = SimulationConfig::quick_test();
        let first = MonteCarloGenerator::new(&config).unwrap().generate();
        let second = MonteCarloGenerator::new(&config).unwrap().generate();
        assert!(!first.is_empty());
        assert_eq!(first, second);

        let other = MonteCarloGenerator::new(&SimulationConfig {
            seed: config.seed + 1,
            ..config
        })
        .unwrap()
        .generate();
        assert_ne!(first, other);
    }

    #[test]
    fn test_stream_is_sorted_and_well_formed() {
        let config = SimulationConfig::quick_test();
        let requests = MonteCarloGenerator::new(&config).unwrap().generate();

        assert!(requests.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
        let mut directions = (0, 0);
        for request in &requests {
            match request {
                Request::Swap(swap) => {
                    assert_ne!(swap.token_in, swap.token_out);
                    assert_eq!(swap.slippage_bps, config.default_slippage_bps);
                    assert!(!swap.token_in_amount.is_zero());
                    if swap.token_in == config.token_x {
                        directions.0 += 1;
                    } else {
                        directions.1 += 1;
                    }
                }
                other => panic!("liquidity events are disabled, got {other:?}"),
            }
        }
        assert!(directions.0 > 0 && directions.1 > 0);
    }

    #[test]
    fn test_amount_limit_and_warmup() {
        let mut config = SimulationConfig::quick_test();
        config.generator.amount_x = AmountDistribution::HalfCauchy { scale: 5_000.0 };
        config.generator.amount_y = AmountDistribution::Pareto { scale: 100.0, shape: 0.5 };
        config.generator.amount_limit = Some(2_000.0);
        config.generator.warmup_hours = 3;
        config.generator.warmup_divisor = 1_000;

        let warmup_end = config.generator.start_timestamp + 3 * 3_600;
        for request in MonteCarloGenerator::new(&config).unwrap().generate() {
            let Request::Swap(swap) = request else { continue };
            if swap.timestamp < warmup_end {
                assert!(swap.token_in_amount <= expand_to_18_decimals(2));
            } else {
                assert!(swap.token_in_amount <= expand_to_18_decimals(2_000));
            }
        }
    }

    #[test]
    fn test_liquidity_events() {
        let mut config = SimulationConfig::quick_test();
        config.generator.liquidity_events_per_hour = 10.0;
        config.generator.liquidity_fraction = 0.01;

        let requests = MonteCarloGenerator::new(&config).unwrap().generate();
        let liquidity: Vec<&Request> = requests
            .iter()
            .filter(|r| r.transaction_type() != TransactionType::Swap)
            .collect();
        assert!(!liquidity.is_empty());
        for request in liquidity {
            match request {
                Request::Mint(l) | Request::Burn(l) => {
                    assert_eq!(l.x_amount, expand_to_18_decimals(300));
                    assert_eq!(l.y_amount, expand_to_18_decimals(300));
                }
                Request::Swap(_) => unreachable!(),
            }
        }
    }

    #[test]
    fn test_recorded_requests_are_sorted() {
        let late = Request::Mint(LiquidityRequest {
            timestamp: 20,
            x_amount: U256::one(),
            y_amount: U256::one(),
        });
        let early = Request::Burn(LiquidityRequest {
            timestamp: 10,
            x_amount: U256::one(),
            y_amount: U256::one(),
        });
        let mut recorded = RecordedRequests {
            requests: vec![late.clone(), early.clone()],
        };
        assert_eq!(recorded.generate(), vec![early, late]);
    }
}
