//! AMM Math Utilities
//!
//! Implements constant-product (x * y = k) swap math with the pool's fixed
//! 1% fee. Everything is integer arithmetic on 18-decimal amounts; every
//! division floors. Products of two amounts are taken in 512 bits.

use primitive_types::{U256, U512};

/// Fee numerator applied to the input amount (1% fee => 990 / 1000)
pub const FEE_NUMERATOR: u64 = 990;

/// Fee denominator
pub const FEE_DENOMINATOR: u64 = 1000;

/// Fee retained in the k check, in thousandths of the input amount
pub const K_CHECK_FEE: u64 = 10;

/// System fee, in thousandths (0.4%)
pub const SYSTEM_FEE_PER_MILLE: u64 = 4;

/// Basis-point denominator for slippage tolerances
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Output of the constant-product formula with fee:
///
/// `amount_out = amount_in * 990 * reserve_out / (reserve_in * 1000 + amount_in * 990)`
///
/// Returns zero when both the input reserve and the input amount are zero.
pub fn get_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
    let amount_in_with_fee = amount_in.full_mul(U256::from(FEE_NUMERATOR));
    let numerator = amount_in_with_fee.saturating_mul(U512::from(reserve_out));
    let denominator = reserve_in.full_mul(U256::from(FEE_DENOMINATOR)) + amount_in_with_fee;

    if denominator.is_zero() {
        return U256::zero();
    }

    // The quotient never exceeds reserve_out
    U256::try_from(numerator / denominator).unwrap_or(reserve_out)
}

/// Minimum acceptable output for a slippage tolerance in basis points
pub fn amount_out_min(expected_out: U256, slippage_bps: u16) -> U256 {
    let keep = BPS_DENOMINATOR.saturating_sub(slippage_bps as u64);
    expected_out * U256::from(keep) / U256::from(BPS_DENOMINATOR)
}

/// True if the post-trade reserves violate the invariant beyond the fee
/// tolerance:
///
/// `k_last * 1e6 > (balance_in * 1000 - amount_in * 10) * (balance_out * 1000)`
pub fn violates_k(k_last: U256, reserve_in: U256, reserve_out: U256, amount_in: U256, amount_out: U256) -> bool {
    let thousand = U256::from(FEE_DENOMINATOR);
    let balance_in = U512::from(reserve_in) + U512::from(amount_in);
    let balance_out = reserve_out.saturating_sub(amount_out);

    let balance_in_adjusted = balance_in * U512::from(FEE_DENOMINATOR) - amount_in.full_mul(U256::from(K_CHECK_FEE));
    let balance_out_adjusted = balance_out.full_mul(thousand);

    k_last.full_mul(thousand * thousand) > balance_in_adjusted.saturating_mul(balance_out_adjusted)
}

/// 0.4% of `amount`, floored
pub fn system_fee_of(amount: U256) -> U256 {
    amount * U256::from(SYSTEM_FEE_PER_MILLE) / U256::from(FEE_DENOMINATOR)
}
