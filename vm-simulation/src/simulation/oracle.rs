//! Sliding-Window TWAP Oracle
//!
//! Keeps `granularity` observations of the pool's cumulative prices in a
//! ring buffer, one slot per `period_size` seconds. The average price over
//! the last `window_size` seconds is the difference of two accumulator
//! readings divided by the time between them.
//!
//! When the pool has been idle long enough that the oldest slot of the
//! primary window is stale, the oracle falls back to the most recent
//! observation inside a window twice as long.

use crate::errors::{ConfigError, OracleError};
use crate::simulation::pool_state::{Pool, Side};
use crate::utils::fixed_point::{q_decode, u256_dec, wad};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Accumulator reading taken at `timestamp`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: u64,
    #[serde(with = "u256_dec")]
    pub price_x_cumulative: U256,
    #[serde(with = "u256_dec")]
    pub price_y_cumulative: U256,
}

impl Observation {
    fn cumulative(&self, side: Side) -> U256 {
        match side {
            Side::X => self.price_x_cumulative,
            Side::Y => self.price_y_cumulative,
        }
    }
}

/// Result of consulting the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleQuote {
    /// Output amount valued at the time-weighted average price
    pub amount_out: U256,
    /// Average price of the input token, 18 decimals
    pub price_average: U256,
    /// Seconds covered by the average
    pub elapsed: u64,
    /// Whether the fallback window had to be used
    pub used_fallback: bool,
}

#[derive(Debug, Clone)]
pub struct SlidingWindowOracle {
    window_size: u64,
    period_size: u64,
    granularity: u64,
    observations: Vec<Option<Observation>>,
}

impl SlidingWindowOracle {
    /// Oracle with `period_size = window_size / granularity`
    pub fn new(window_size: u64, granularity: u64) -> Result<Self, ConfigError> {
        if granularity == 0 {
            return Err(ConfigError::ZeroGranularity);
        }
        let mut oracle = Self {
            window_size: 0,
            period_size: 0,
            granularity: 0,
            observations: Vec::new(),
        };
        oracle.reset(window_size, window_size / granularity, granularity)?;
        Ok(oracle)
    }

    /// Reconfigure and drop every observation
    pub fn reset(&mut self, window_size: u64, period_size: u64, granularity: u64) -> Result<(), ConfigError> {
        if granularity == 0 {
            return Err(ConfigError::ZeroGranularity);
        }
        if window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if window_size % granularity != 0 {
            return Err(ConfigError::WindowNotDivisible {
                window_size,
                granularity,
            });
        }
        if window_size / granularity != period_size {
            return Err(ConfigError::PeriodMismatch {
                window_size,
                granularity,
                period_size,
            });
        }

        self.window_size = window_size;
        self.period_size = period_size;
        self.granularity = granularity;
        self.observations = vec![None; granularity as usize];

        debug!(window_size, period_size, granularity, "oracle reset");
        Ok(())
    }

    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    pub fn fallback_window_size(&self) -> u64 {
        self.window_size * 2
    }

    pub fn period_size(&self) -> u64 {
        self.period_size
    }

    pub fn granularity(&self) -> u64 {
        self.granularity
    }

    pub fn observations(&self) -> &[Option<Observation>] {
        &self.observations
    }

    pub fn observation_index_of(&self, timestamp: u64) -> usize {
        ((timestamp / self.period_size) % self.granularity) as usize
    }

    /// Record the pool's accumulators for the slot of `block_timestamp`.
    ///
    /// A slot is overwritten only once more than `period_size` seconds
    /// have passed since its last write. Returns whether a write happened.
    pub fn update(&mut self, pool: &Pool, block_timestamp: u64) -> bool {
        let index = self.observation_index_of(block_timestamp);
        let period_size = self.period_size;

        let stale = match self.observations.get(index) {
            Some(Some(observation)) => block_timestamp.saturating_sub(observation.timestamp) > period_size,
            Some(None) => true,
            None => false,
        };
        if !stale {
            return false;
        }

        let (price_x_cumulative, price_y_cumulative) = pool.current_cumulative_prices(block_timestamp);
        let observation = Observation {
            timestamp: block_timestamp,
            price_x_cumulative,
            price_y_cumulative,
        };
        debug!(index, ?observation, "observation written");
        self.observations[index] = Some(observation);
        true
    }

    /// Oldest slot of the primary window, if it still lies inside it
    fn primary_observation(&self, block_timestamp: u64) -> Option<&Observation> {
        let first_index = (self.observation_index_of(block_timestamp) + 1) % self.granularity as usize;
        self.observations
            .get(first_index)?
            .as_ref()
            .filter(|o| o.timestamp < block_timestamp && block_timestamp - o.timestamp <= self.window_size)
    }

    /// Most recent observation in `[block_timestamp - 2 * window, block_timestamp)`
    fn fallback_observation(&self, block_timestamp: u64) -> Option<&Observation> {
        let boundary = block_timestamp.saturating_sub(self.fallback_window_size());
        self.observations
            .iter()
            .flatten()
            .filter(|o| o.timestamp >= boundary && o.timestamp < block_timestamp)
            .max_by_key(|o| o.timestamp)
    }

    pub fn has_fallback_observation(&self, block_timestamp: u64) -> bool {
        self.fallback_observation(block_timestamp).is_some()
    }

    pub fn can_consult(&self, block_timestamp: u64) -> bool {
        if self.observations.iter().all(Option::is_none) {
            return false;
        }
        self.primary_observation(block_timestamp).is_some() || self.has_fallback_observation(block_timestamp)
    }

    /// Value `amount_in` of `token_in` at the time-weighted average price.
    ///
    /// Callers check [`can_consult`](Self::can_consult) first; consulting
    /// without history is an error.
    pub fn consult(
        &self,
        pool: &Pool,
        token_in: Side,
        amount_in: U256,
        block_timestamp: u64,
    ) -> Result<OracleQuote, OracleError> {
        let (start, used_fallback) = match self.primary_observation(block_timestamp) {
            Some(observation) => (observation, false),
            None => (
                self.fallback_observation(block_timestamp)
                    .ok_or(OracleError::MissingHistoricalObservation { block_timestamp })?,
                true,
            ),
        };

        let elapsed = block_timestamp - start.timestamp;
        if elapsed == 0 {
            return Err(OracleError::ZeroElapsed);
        }

        let (price_x_cumulative, price_y_cumulative) = pool.current_cumulative_prices(block_timestamp);
        let end = match token_in {
            Side::X => price_x_cumulative,
            Side::Y => price_y_cumulative,
        };

        let price_average = end.overflowing_sub(start.cumulative(token_in)).0 / U256::from(elapsed);

        Ok(OracleQuote {
            amount_out: q_decode(price_average.saturating_mul(amount_in)),
            price_average: q_decode(price_average.saturating_mul(wad())),
            elapsed,
            used_fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::pool_state::ReserveDelta;
    use crate::utils::fixed_point::expand_to_18_decimals;

    const WINDOW: u64 = 24 * 60 * 60;
    const GRANULARITY: u64 = 24;
    const PERIOD: u64 = WINDOW / GRANULARITY;
    const START: u64 = 1_700_000_000;

    fn pool(x: u64, y: u64) -> Pool {
        Pool::new("X", "Y", expand_to_18_decimals(x), expand_to_18_decimals(y), true).unwrap()
    }

    fn oracle() -> SlidingWindowOracle {
        SlidingWindowOracle::new(WINDOW, GRANULARITY).unwrap()
    }

    #[test]
    fn test_construction_checks() {
        assert_eq!(
            SlidingWindowOracle::new(100, 7).unwrap_err(),
            ConfigError::WindowNotDivisible {
                window_size: 100,
                granularity: 7
            }
        );
        assert_eq!(SlidingWindowOracle::new(100, 0).unwrap_err(), ConfigError::ZeroGranularity);

        let mut oracle = oracle();
        assert!(matches!(
            oracle.reset(WINDOW, PERIOD + 1, GRANULARITY),
            Err(ConfigError::PeriodMismatch { .. })
        ));
        assert_eq!(oracle.observations().len(), GRANULARITY as usize);
        assert_eq!(oracle.period_size(), PERIOD);
    }

    #[test]
    fn test_observation_index() {
        let oracle = oracle();
        assert_eq!(oracle.observation_index_of(0), 0);
        assert_eq!(oracle.observation_index_of(PERIOD - 1), 0);
        assert_eq!(oracle.observation_index_of(PERIOD), 1);
        assert_eq!(oracle.observation_index_of(WINDOW), 0);
        assert_eq!(oracle.observation_index_of(WINDOW + 5 * PERIOD), 5);
    }

    #[test]
    fn test_update_is_rate_limited() {
        let mut pool = pool(10_000, 10_000);
        let mut oracle = oracle();
        pool.update_pair(START);

        assert!(oracle.update(&pool, START));
        assert!(!oracle.update(&pool, START + 10));
        // Same slot a full window later is stale and gets rewritten
        assert!(oracle.update(&pool, START + WINDOW));
        let written = oracle.observations().iter().flatten().count();
        assert!(written >= 1);
    }

    #[test]
    fn test_can_consult_lifecycle() {
        let mut pool = pool(10_000, 10_000);
        let mut oracle = oracle();

        assert!(!oracle.can_consult(START));

        pool.update_pair(START);
        oracle.update(&pool, START);
        // The only observation is the current block's own
        assert!(!oracle.can_consult(START));
        assert!(oracle.can_consult(START + PERIOD));

        // Past the fallback window nothing is usable any more
        assert!(oracle.can_consult(START + 2 * WINDOW));
        assert!(!oracle.can_consult(START + 2 * WINDOW + 1));
    }

    #[test]
    fn test_primary_window_after_inactivity_without_fallback() {
        let mut pool = pool(10_000, 10_000);
        let mut oracle = oracle();
        pool.update_pair(START);
        oracle.update(&pool, START);

        // One period before the slot comes around again it is the window start
        let within = START + WINDOW - PERIOD;
        assert_eq!(oracle.primary_observation(within).map(|o| o.timestamp), Some(START));

        // Same slot position a window later is too old for the primary window
        let beyond = START + 2 * WINDOW - PERIOD;
        assert!(oracle.primary_observation(beyond).is_none());
        assert!(oracle.can_consult(beyond));
    }

    #[test]
    fn test_consult_constant_price() {
        let mut pool = pool(10_000, 20_000);
        let mut oracle = oracle();
        for hour in 0..=GRANULARITY {
            let ts = START + hour * PERIOD;
            pool.update_pair(ts);
            oracle.update(&pool, ts);
        }

        let now = START + GRANULARITY * PERIOD;
        let quote = oracle.consult(&pool, Side::X, expand_to_18_decimals(3), now).unwrap();
        assert!(!quote.used_fallback);
        assert_eq!(quote.amount_out, expand_to_18_decimals(6));
        assert_eq!(quote.price_average, expand_to_18_decimals(2));

        let quote = oracle.consult(&pool, Side::Y, expand_to_18_decimals(4), now).unwrap();
        assert_eq!(quote.amount_out, expand_to_18_decimals(2));
    }

    #[test]
    fn test_consult_uses_fallback() {
        let mut pool = pool(10_000, 10_000);
        let mut oracle = oracle();
        pool.update_pair(START);
        oracle.update(&pool, START);

        let later = START + WINDOW + 3 * PERIOD;
        let quote = oracle.consult(&pool, Side::X, expand_to_18_decimals(1), later).unwrap();
        assert!(quote.used_fallback);
        assert_eq!(quote.elapsed, later - START);
        assert_eq!(quote.amount_out, expand_to_18_decimals(1));
    }

    #[test]
    fn test_consult_averages_price_change() {
        let mut pool = pool(10_000, 10_000);
        let mut oracle = oracle();
        pool.update_pair(START);
        oracle.update(&pool, START);

        // Price of X doubles halfway through the interval
        pool.update_pair(START + 1_000);
        pool.update_reserve_y(ReserveDelta::Increase(expand_to_18_decimals(10_000)))
            .unwrap();

        let quote = oracle
            .consult(&pool, Side::X, expand_to_18_decimals(100), START + 2_000)
            .unwrap();
        assert!(quote.used_fallback);
        assert_eq!(quote.amount_out, expand_to_18_decimals(150));
    }

    #[test]
    fn test_consult_without_history_fails() {
        let pool = pool(10_000, 10_000);
        let oracle = oracle();
        assert_eq!(
            oracle.consult(&pool, Side::X, U256::one(), START).unwrap_err(),
            OracleError::MissingHistoricalObservation { block_timestamp: START }
        );
    }
}
