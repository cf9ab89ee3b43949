//! Pool State Management
//!
//! Reserve bookkeeping and cumulative price accumulators of the simulated
//! constant-product pool.

use crate::errors::{ConfigError, PoolError};
use crate::utils::fixed_point::{contract_18_decimals_to_f64, q_encode, u256_dec};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two tokens of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    X,
    Y,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::X => Side::Y,
            Side::Y => Side::X,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::X => write!(f, "X"),
            Side::Y => write!(f, "Y"),
        }
    }
}

/// Largest reserve a pool may hold; keeps `reserve_x * reserve_y` within 256 bits
pub fn max_reserve() -> U256 {
    U256::from(u128::MAX)
}

/// Signed change applied to a reserve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveDelta {
    Increase(U256),
    Decrease(U256),
}

/// Snapshot of pool state at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    #[serde(with = "u256_dec")]
    pub reserve_x: U256,
    #[serde(with = "u256_dec")]
    pub reserve_y: U256,
    #[serde(with = "u256_dec")]
    pub k: U256,
    #[serde(with = "u256_dec")]
    pub price_x_cumulative: U256,
    #[serde(with = "u256_dec")]
    pub price_y_cumulative: U256,
    pub mitigation_enabled: bool,
}

impl PoolSnapshot {
    /// Spot price of X in Y
    pub fn price_x_in_y(&self) -> f64 {
        let reserve_x = contract_18_decimals_to_f64(self.reserve_x);
        if reserve_x == 0.0 {
            return 0.0;
        }
        contract_18_decimals_to_f64(self.reserve_y) / reserve_x
    }
}

/// Constant-product pool with price accumulators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    token_x: String,
    token_y: String,
    reserve_x: U256,
    reserve_y: U256,
    k_last: U256,
    price_x_cumulative: U256,
    price_y_cumulative: U256,
    last_update_timestamp: Option<u64>,
    mitigation_enabled: bool,
}

impl Pool {
    pub fn new(
        token_x: &str,
        token_y: &str,
        reserve_x: U256,
        reserve_y: U256,
        mitigation_enabled: bool,
    ) -> Result<Self, ConfigError> {
        if token_x == token_y {
            return Err(ConfigError::SameToken);
        }
        if let Some(&reserve) = [reserve_x, reserve_y].iter().find(|reserve| **reserve > max_reserve()) {
            return Err(ConfigError::ReserveOutOfRange(reserve));
        }

        Ok(Self {
            token_x: token_x.to_string(),
            token_y: token_y.to_string(),
            reserve_x,
            reserve_y,
            k_last: reserve_x * reserve_y,
            price_x_cumulative: U256::zero(),
            price_y_cumulative: U256::zero(),
            last_update_timestamp: None,
            mitigation_enabled,
        })
    }

    /// Reinitialize every field, as if freshly constructed
    pub fn reset(
        &mut self,
        token_x: &str,
        token_y: &str,
        reserve_x: U256,
        reserve_y: U256,
        mitigation_enabled: bool,
    ) -> Result<(), ConfigError> {
        *self = Self::new(token_x, token_y, reserve_x, reserve_y, mitigation_enabled)?;
        Ok(())
    }

    pub fn token_x(&self) -> &str {
        &self.token_x
    }

    pub fn token_y(&self) -> &str {
        &self.token_y
    }

    pub fn symbol(&self, side: Side) -> &str {
        match side {
            Side::X => &self.token_x,
            Side::Y => &self.token_y,
        }
    }

    /// Resolve a token symbol to its side of the pool
    pub fn side_of(&self, token: &str) -> Result<Side, PoolError> {
        if token == self.token_x {
            Ok(Side::X)
        } else if token == self.token_y {
            Ok(Side::Y)
        } else {
            Err(PoolError::UnknownToken(token.to_string()))
        }
    }

    pub fn reserve_x(&self) -> U256 {
        self.reserve_x
    }

    pub fn reserve_y(&self) -> U256 {
        self.reserve_y
    }

    pub fn reserve(&self, side: Side) -> U256 {
        match side {
            Side::X => self.reserve_x,
            Side::Y => self.reserve_y,
        }
    }

    /// `(reserve_in, reserve_out)` for a swap selling `token_in`
    pub fn reserves_for(&self, token_in: Side) -> (U256, U256) {
        (self.reserve(token_in), self.reserve(token_in.opposite()))
    }

    pub fn k_last(&self) -> U256 {
        self.k_last
    }

    /// Current constant product, exact since both reserves fit in 128 bits
    pub fn k(&self) -> U256 {
        self.reserve_x * self.reserve_y
    }

    pub fn price_x_cumulative(&self) -> U256 {
        self.price_x_cumulative
    }

    pub fn price_y_cumulative(&self) -> U256 {
        self.price_y_cumulative
    }

    pub fn last_update_timestamp(&self) -> Option<u64> {
        self.last_update_timestamp
    }

    pub fn mitigation_enabled(&self) -> bool {
        self.mitigation_enabled
    }

    /// Value `side`'s reserve would take after `delta`.
    ///
    /// Fails if it would go negative or exceed [`max_reserve`].
    pub fn reserve_after(&self, side: Side, delta: ReserveDelta) -> Result<U256, PoolError> {
        let reserve = self.reserve(side);
        match delta {
            ReserveDelta::Increase(amount) => reserve
                .checked_add(amount)
                .filter(|updated| *updated <= max_reserve())
                .ok_or(PoolError::Overflow),
            ReserveDelta::Decrease(amount) => reserve.checked_sub(amount).ok_or(PoolError::InsufficientReserve {
                side,
                reserve,
                delta: amount,
            }),
        }
    }

    /// Apply a signed delta to one reserve and refresh `k_last`.
    ///
    /// Fails without touching the pool if the reserve would go negative or
    /// outgrow 128 bits.
    pub fn update_reserve(&mut self, side: Side, delta: ReserveDelta) -> Result<(), PoolError> {
        let updated = self.reserve_after(side, delta)?;

        match side {
            Side::X => self.reserve_x = updated,
            Side::Y => self.reserve_y = updated,
        }
        self.k_last = self.k();
        Ok(())
    }

    pub fn update_reserve_x(&mut self, delta: ReserveDelta) -> Result<(), PoolError> {
        self.update_reserve(Side::X, delta)
    }

    pub fn update_reserve_y(&mut self, delta: ReserveDelta) -> Result<(), PoolError> {
        self.update_reserve(Side::Y, delta)
    }

    /// Close out the price accumulators up to `block_timestamp`.
    ///
    /// Must run before the block's reserves change so the integral covers
    /// the pre-trade price over the whole elapsed interval.
    pub fn update_pair(&mut self, block_timestamp: u64) {
        let Some(last) = self.last_update_timestamp else {
            self.last_update_timestamp = Some(block_timestamp);
            return;
        };

        if block_timestamp > last {
            let (price_x_cumulative, price_y_cumulative) = self.accumulate(block_timestamp - last);
            self.price_x_cumulative = price_x_cumulative;
            self.price_y_cumulative = price_y_cumulative;
            self.last_update_timestamp = Some(block_timestamp);
        }
    }

    /// Accumulator values as of `block_timestamp`, without mutating the pool
    pub fn current_cumulative_prices(&self, block_timestamp: u64) -> (U256, U256) {
        match self.last_update_timestamp {
            Some(last) if block_timestamp > last => self.accumulate(block_timestamp - last),
            _ => (self.price_x_cumulative, self.price_y_cumulative),
        }
    }

    // Accumulators wrap on overflow; only differences between two readings are meaningful.
    fn accumulate(&self, elapsed: u64) -> (U256, U256) {
        let elapsed = U256::from(elapsed);
        let mut price_x_cumulative = self.price_x_cumulative;
        let mut price_y_cumulative = self.price_y_cumulative;

        if !self.reserve_x.is_zero() && !self.reserve_y.is_zero() {
            let price_x = q_encode(self.reserve_y) / self.reserve_x;
            let price_y = q_encode(self.reserve_x) / self.reserve_y;
            price_x_cumulative = price_x_cumulative.overflowing_add(price_x.overflowing_mul(elapsed).0).0;
            price_y_cumulative = price_y_cumulative.overflowing_add(price_y.overflowing_mul(elapsed).0).0;
        }

        (price_x_cumulative, price_y_cumulative)
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            reserve_x: self.reserve_x,
            reserve_y: self.reserve_y,
            k: self.k_last,
            price_x_cumulative: self.price_x_cumulative,
            price_y_cumulative: self.price_y_cumulative,
            mitigation_enabled: self.mitigation_enabled,
        }
    }
}
