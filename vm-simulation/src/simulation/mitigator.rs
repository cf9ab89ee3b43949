//! Volatility Mitigator
//!
//! Compares the pool's instantaneous quote for a swap with the oracle's
//! time-weighted valuation and blocks swaps whose deviation is too large
//! for their size. The tolerated deviation shrinks as the trade takes a
//! larger share of the remaining reserve, down to
//! `100 - price_tolerance_threshold` percent.

use crate::errors::{ConfigError, OracleError};
use crate::simulation::oracle::SlidingWindowOracle;
use crate::simulation::pool_state::{Pool, Side};
use crate::utils::fixed_point::{sqrt, u256_dec};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of the mitigation stage for one swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MitigatorCheckStatus {
    /// The swap never got as far as the mitigator
    NotReached,
    MitigationOff,
    CantConsultOracle,
    Checked,
}

/// What to do with a swap when the oracle has no usable history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OraclePolicy {
    #[default]
    Allow,
    Reject,
}

/// Diagnostics of an oracle comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleComparison {
    #[serde(with = "u256_dec")]
    pub oracle_amount_out: U256,
    /// Average oracle price of the input token, 18 decimals
    #[serde(with = "u256_dec")]
    pub oracle_price: U256,
    /// Percentage deviation between pool and oracle output
    #[serde(with = "u256_dec")]
    pub out_amount_diff: U256,
    /// Only computed when `out_amount_diff` is non-zero
    pub slice_factor: Option<u64>,
    pub slice_factor_curve: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MitigationOutcome {
    pub status: MitigatorCheckStatus,
    pub blocked: bool,
    pub comparison: Option<OracleComparison>,
}

impl MitigationOutcome {
    fn unchecked(status: MitigatorCheckStatus, blocked: bool) -> Self {
        Self {
            status,
            blocked,
            comparison: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolatilityMitigator {
    price_tolerance_threshold: u64,
    on_oracle_unavailable: OraclePolicy,
}

impl VolatilityMitigator {
    pub fn new(price_tolerance_threshold: u8, on_oracle_unavailable: OraclePolicy) -> Result<Self, ConfigError> {
        if price_tolerance_threshold > 100 {
            return Err(ConfigError::ThresholdOutOfRange(price_tolerance_threshold));
        }
        Ok(Self {
            price_tolerance_threshold: price_tolerance_threshold as u64,
            on_oracle_unavailable,
        })
    }

    pub fn price_tolerance_threshold(&self) -> u64 {
        self.price_tolerance_threshold
    }

    pub fn on_oracle_unavailable(&self) -> OraclePolicy {
        self.on_oracle_unavailable
    }

    /// Decide whether a swap of `amount_in` for `amount_out` may proceed.
    ///
    /// `reserve_out_after` is the output reserve left once the swap and the
    /// system fee have been taken out of it.
    #[allow(clippy::too_many_arguments)]
    pub fn check(
        &self,
        pool: &Pool,
        oracle: &SlidingWindowOracle,
        token_in: Side,
        amount_in: U256,
        amount_out: U256,
        reserve_out_after: U256,
        block_timestamp: u64,
    ) -> Result<MitigationOutcome, OracleError> {
        if !pool.mitigation_enabled() {
            return Ok(MitigationOutcome::unchecked(MitigatorCheckStatus::MitigationOff, false));
        }

        if !oracle.can_consult(block_timestamp) {
            let blocked = self.on_oracle_unavailable == OraclePolicy::Reject;
            debug!(block_timestamp, blocked, "oracle unavailable");
            return Ok(MitigationOutcome::unchecked(MitigatorCheckStatus::CantConsultOracle, blocked));
        }

        let quote = oracle.consult(pool, token_in, amount_in, block_timestamp)?;
        let out_amount_diff = out_amount_diff(amount_out, quote.amount_out);

        // A swap matching the oracle exactly passes whatever its size
        let (slice_factor, slice_factor_curve) = if out_amount_diff.is_zero() {
            (None, None)
        } else {
            let slice_factor = slice_factor(amount_out, reserve_out_after);
            (Some(slice_factor), Some(self.slice_factor_curve(slice_factor)))
        };

        let blocked = slice_factor_curve.map_or(false, |curve| out_amount_diff > U256::from(100 - curve));
        debug!(
            %amount_out,
            oracle_amount_out = %quote.amount_out,
            %out_amount_diff,
            ?slice_factor,
            ?slice_factor_curve,
            blocked,
            "mitigator check"
        );

        Ok(MitigationOutcome {
            status: MitigatorCheckStatus::Checked,
            blocked,
            comparison: Some(OracleComparison {
                oracle_amount_out: quote.amount_out,
                oracle_price: quote.price_average,
                out_amount_diff,
                slice_factor,
                slice_factor_curve,
            }),
        })
    }

    /// `min(sf * floor(sqrt(sf)), threshold)`
    pub fn slice_factor_curve(&self, slice_factor: u64) -> u64 {
        (slice_factor * sqrt(slice_factor)).min(self.price_tolerance_threshold)
    }
}

/// Share (in percent) of the post-trade reserve that `amount_out` represents
pub fn slice_factor(amount_out: U256, reserve_out_after: U256) -> u64 {
    if reserve_out_after <= amount_out {
        return 100;
    }
    let remaining = U256::from(100) * (reserve_out_after - amount_out) / reserve_out_after;
    100 - remaining.low_u64()
}

/// `100 * |a - b| / midpoint(a, b)`, zero when both agree
pub fn out_amount_diff(amount_out: U256, oracle_amount_out: U256) -> U256 {
    if amount_out == oracle_amount_out {
        return U256::zero();
    }
    let (bigger, smaller) = if amount_out > oracle_amount_out {
        (amount_out, oracle_amount_out)
    } else {
        (oracle_amount_out, amount_out)
    };
    let midpoint = (bigger / 2 + smaller / 2 + (bigger % 2 + smaller % 2) / 2).max(U256::one());
    U256::from(100) * (bigger - smaller) / midpoint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::fixed_point::expand_to_18_decimals;

    const START: u64 = 1_000_000;

    fn setup(mitigation_enabled: bool) -> (Pool, SlidingWindowOracle) {
        let mut pool = Pool::new(
            "X",
            "Y",
            expand_to_18_decimals(10_000),
            expand_to_18_decimals(10_000),
            mitigation_enabled,
        )
        .unwrap();
        let mut oracle = SlidingWindowOracle::new(3_600, 12).unwrap();
        pool.update_pair(START);
        oracle.update(&pool, START);
        pool.update_pair(START + 600);
        (pool, oracle)
    }

    #[test]
    fn test_slice_factor() {
        assert_eq!(slice_factor(U256::from(10), U256::from(10)), 100);
        assert_eq!(slice_factor(U256::from(11), U256::from(10)), 100);
        assert_eq!(slice_factor(U256::zero(), U256::from(1_000)), 0);
        // 10% of the reserve: 100 - floor(100 * 900 / 1000)
        assert_eq!(slice_factor(U256::from(100), U256::from(1_000)), 10);
        // 0.5%: 100 - floor(99.5) rounds the share up
        assert_eq!(slice_factor(U256::from(5), U256::from(1_000)), 1);
    }

    #[test]
    fn test_out_amount_diff() {
        assert_eq!(out_amount_diff(U256::from(7), U256::from(7)), U256::zero());
        // |100 - 90| * 100 / 95
        assert_eq!(out_amount_diff(U256::from(100), U256::from(90)), U256::from(10));
        assert_eq!(out_amount_diff(U256::from(90), U256::from(100)), U256::from(10));
        assert_eq!(out_amount_diff(U256::from(1), U256::zero()), U256::from(100));
    }

    #[test]
    fn test_curve_is_capped() {
        let mitigator = VolatilityMitigator::new(98, OraclePolicy::Allow).unwrap();
        assert_eq!(mitigator.slice_factor_curve(0), 0);
        assert_eq!(mitigator.slice_factor_curve(4), 8);
        assert_eq!(mitigator.slice_factor_curve(10), 30);
        assert_eq!(mitigator.slice_factor_curve(30), 98);
        assert!(VolatilityMitigator::new(101, OraclePolicy::Allow).is_err());
    }

    #[test]
    fn test_mitigation_off() {
        let (pool, oracle) = setup(false);
        let mitigator = VolatilityMitigator::new(98, OraclePolicy::Allow).unwrap();
        let outcome = mitigator
            .check(&pool, &oracle, Side::X, U256::one(), U256::one(), U256::from(100), START + 600)
            .unwrap();
        assert_eq!(outcome.status, MitigatorCheckStatus::MitigationOff);
        assert!(!outcome.blocked);
    }

    #[test]
    fn test_oracle_unavailable_policy() {
        let pool = Pool::new("X", "Y", U256::from(1_000), U256::from(1_000), true).unwrap();
        let oracle = SlidingWindowOracle::new(3_600, 12).unwrap();

        let allow = VolatilityMitigator::new(98, OraclePolicy::Allow).unwrap();
        let outcome = allow
            .check(&pool, &oracle, Side::X, U256::one(), U256::one(), U256::from(100), START)
            .unwrap();
        assert_eq!(outcome.status, MitigatorCheckStatus::CantConsultOracle);
        assert!(!outcome.blocked);

        let reject = VolatilityMitigator::new(98, OraclePolicy::Reject).unwrap();
        let outcome = reject
            .check(&pool, &oracle, Side::X, U256::one(), U256::one(), U256::from(100), START)
            .unwrap();
        assert_eq!(outcome.status, MitigatorCheckStatus::CantConsultOracle);
        assert!(outcome.blocked);
    }

    #[test]
    fn test_zero_diff_always_allows() {
        let (pool, oracle) = setup(true);
        let mitigator = VolatilityMitigator::new(0, OraclePolicy::Allow).unwrap();
        // Price is exactly 1, so the oracle values 100 X at 100 Y
        let amount = expand_to_18_decimals(100);
        let outcome = mitigator
            .check(&pool, &oracle, Side::X, amount, amount, expand_to_18_decimals(9_000), START + 600)
            .unwrap();

        assert_eq!(outcome.status, MitigatorCheckStatus::Checked);
        assert!(!outcome.blocked);
        let comparison = outcome.comparison.unwrap();
        assert_eq!(comparison.oracle_amount_out, amount);
        assert_eq!(comparison.out_amount_diff, U256::zero());
        assert_eq!(comparison.slice_factor, None);
        assert_eq!(comparison.slice_factor_curve, None);

        // Whole-reserve trade at the oracle price is still not sized
        let outcome = mitigator
            .check(&pool, &oracle, Side::X, amount, amount, U256::one(), START + 600)
            .unwrap();
        assert!(!outcome.blocked);
        let comparison = outcome.comparison.unwrap();
        assert_eq!(comparison.slice_factor, None);
        assert_eq!(comparison.slice_factor_curve, None);
    }

    #[test]
    fn test_threshold_boundary() {
        let (pool, oracle) = setup(true);
        let mitigator = VolatilityMitigator::new(90, OraclePolicy::Allow).unwrap();
        let amount_in = U256::from(1_000);
        let now = START + 600;

        // Whole-reserve trade: slice factor 100, curve capped at 90, limit is a 10% diff
        let reserve_after = U256::from(1);

        // diff = 100 * 11 / 1005 = 1
        let within = mitigator
            .check(&pool, &oracle, Side::X, amount_in, U256::from(1_011), reserve_after, now)
            .unwrap();
        assert!(!within.blocked);

        // diff = 100 * 110 / 1055 = 10, at the limit but not above
        let at_limit = mitigator
            .check(&pool, &oracle, Side::X, amount_in, U256::from(1_110), reserve_after, now)
            .unwrap();
        assert_eq!(at_limit.comparison.as_ref().unwrap().out_amount_diff, U256::from(10));
        assert!(!at_limit.blocked);

        // diff = 100 * 117 / 1058 = 11
        let above = mitigator
            .check(&pool, &oracle, Side::X, amount_in, U256::from(1_117), reserve_after, now)
            .unwrap();
        let comparison = above.comparison.as_ref().unwrap();
        assert_eq!(comparison.slice_factor_curve, Some(90));
        assert_eq!(comparison.out_amount_diff, U256::from(11));
        assert!(above.blocked);
    }

    #[test]
    fn test_tolerance_shrinks_with_trade_size() {
        let (pool, oracle) = setup(true);
        let mitigator = VolatilityMitigator::new(98, OraclePolicy::Allow).unwrap();
        let now = START + 600;

        // diff = 100 * 500 / 1250 = 40 for both trades
        let small = mitigator
            .check(
                &pool,
                &oracle,
                Side::Y,
                U256::from(1_000),
                U256::from(1_500),
                expand_to_18_decimals(10_000),
                now,
            )
            .unwrap();
        let comparison = small.comparison.unwrap();
        assert_eq!(comparison.slice_factor, Some(1));
        assert_eq!(comparison.slice_factor_curve, Some(1));
        assert_eq!(comparison.out_amount_diff, U256::from(40));
        assert!(!small.blocked);

        let large = mitigator
            .check(&pool, &oracle, Side::Y, U256::from(1_000), U256::from(1_500), U256::from(1_600), now)
            .unwrap();
        let comparison = large.comparison.unwrap();
        assert_eq!(comparison.slice_factor, Some(94));
        assert_eq!(comparison.slice_factor_curve, Some(98));
        assert!(large.blocked);
    }
}
