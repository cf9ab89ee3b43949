//! AMM Engine
//!
//! Caller-owned aggregate of the pool, its TWAP oracle and the volatility
//! mitigator. Admits requests as transactions and executes them against
//! the pool once the scheduler closes their block.

use crate::errors::{ConfigError, PoolError, SimulationError};
use crate::simulation::mitigator::{MitigatorCheckStatus, OraclePolicy, VolatilityMitigator};
use crate::simulation::oracle::SlidingWindowOracle;
use crate::simulation::pool_state::{Pool, ReserveDelta, Side};
use crate::simulation::transaction::{
    LiquidityDetails, LiquidityRequest, Request, SwapDetails, SwapRequest, Transaction, TransactionKind,
    TransactionStatus,
};
use crate::utils::amm_math::{amount_out_min, get_amount_out, system_fee_of, violates_k, BPS_DENOMINATOR};
use primitive_types::U256;
use tracing::{debug, warn};

/// Raw units left in each reserve by a clipped burn
pub const MIN_LIQUIDITY: u64 = 1_000_000;

/// Everything needed to (re)initialize an [`Amm`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmmParameters {
    pub token_x: String,
    pub token_y: String,
    pub reserve_x: U256,
    pub reserve_y: U256,
    pub mitigation_enabled: bool,
    pub window_size: u64,
    pub period_size: u64,
    pub granularity: u64,
    pub price_tolerance_threshold: u8,
    pub on_oracle_unavailable: OraclePolicy,
}

/// Swap that passed the reserve, slippage and invariant checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SwapPlan {
    system_fee: U256,
    reserve_out_after: U256,
}

#[derive(Debug, Clone)]
pub struct Amm {
    pool: Pool,
    oracle: SlidingWindowOracle,
    mitigator: VolatilityMitigator,
    next_id: u64,
}

impl Amm {
    pub fn new(params: &AmmParameters) -> Result<Self, ConfigError> {
        let mut oracle = SlidingWindowOracle::new(params.window_size, params.granularity)?;
        oracle.reset(params.window_size, params.period_size, params.granularity)?;

        Ok(Self {
            pool: Pool::new(
                &params.token_x,
                &params.token_y,
                params.reserve_x,
                params.reserve_y,
                params.mitigation_enabled,
            )?,
            oracle,
            mitigator: VolatilityMitigator::new(params.price_tolerance_threshold, params.on_oracle_unavailable)?,
            next_id: 0,
        })
    }

    /// Reinitialize pool, oracle and mitigator together.
    ///
    /// Nothing changes if any of the parameters is invalid.
    pub fn reset(&mut self, params: &AmmParameters) -> Result<(), ConfigError> {
        *self = Self::new(params)?;
        Ok(())
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn oracle(&self) -> &SlidingWindowOracle {
        &self.oracle
    }

    pub fn mitigator(&self) -> &VolatilityMitigator {
        &self.mitigator
    }

    /// Number of transactions admitted since the last reset
    pub fn admitted(&self) -> u64 {
        self.next_id
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn resolve_sides(&self, token_in: &str, token_out: &str) -> Result<(Side, Side), PoolError> {
        let side_in = self.pool.side_of(token_in)?;
        let side_out = self.pool.side_of(token_out)?;
        if side_in == side_out {
            return Err(PoolError::SameToken);
        }
        Ok((side_in, side_out))
    }

    /// Slippage floor from the reserves at admission time
    fn admission_floor(&self, token_in: Side, amount_in: U256, slippage_bps: u16) -> Result<U256, ConfigError> {
        if slippage_bps as u64 > BPS_DENOMINATOR {
            return Err(ConfigError::SlippageOutOfRange(slippage_bps));
        }
        let (reserve_in, reserve_out) = self.pool.reserves_for(token_in);
        Ok(amount_out_min(get_amount_out(amount_in, reserve_in, reserve_out), slippage_bps))
    }

    pub fn admit(&mut self, request: &Request) -> Result<Transaction, SimulationError> {
        match request {
            Request::Swap(swap) => self.admit_swap(swap),
            Request::Mint(liquidity) => Ok(self.admit_mint(liquidity)),
            Request::Burn(liquidity) => Ok(self.admit_burn(liquidity)),
        }
    }

    pub fn admit_swap(&mut self, request: &SwapRequest) -> Result<Transaction, SimulationError> {
        let (token_in, token_out) = self.resolve_sides(&request.token_in, &request.token_out)?;
        let amount_out_min = self.admission_floor(token_in, request.token_in_amount, request.slippage_bps)?;

        let details = SwapDetails {
            token_in,
            token_out,
            token_in_amount: request.token_in_amount,
            amount_out_min,
            token_out_amount: None,
            system_fee: None,
            mitigator_check_status: MitigatorCheckStatus::NotReached,
            oracle_comparison: None,
        };
        Ok(Transaction::new(self.next_id(), request.timestamp, TransactionKind::Swap(details)))
    }

    pub fn admit_mint(&mut self, request: &LiquidityRequest) -> Transaction {
        let details = LiquidityDetails {
            x_amount: request.x_amount,
            y_amount: request.y_amount,
        };
        Transaction::new(self.next_id(), request.timestamp, TransactionKind::Mint(details))
    }

    pub fn admit_burn(&mut self, request: &LiquidityRequest) -> Transaction {
        let details = LiquidityDetails {
            x_amount: request.x_amount,
            y_amount: request.y_amount,
        };
        Transaction::new(self.next_id(), request.timestamp, TransactionKind::Burn(details))
    }

    /// Open a block: close out the accumulators at the pre-trade price and
    /// sample them into the oracle, once per block.
    pub fn begin_block(&mut self, block_timestamp: u64) {
        self.pool.update_pair(block_timestamp);
        if self.oracle.update(&self.pool, block_timestamp) {
            debug!(block_timestamp, "oracle observation recorded");
        }
    }

    /// Execute an admitted transaction, stamping it with its block.
    ///
    /// Errors are only returned for broken internal invariants; every
    /// expected outcome is recorded in `transaction.status`.
    pub fn execute(
        &mut self,
        transaction: &mut Transaction,
        block_timestamp: u64,
        block_number: u64,
    ) -> Result<(), SimulationError> {
        transaction.block_timestamp = Some(block_timestamp);
        transaction.block_number = Some(block_number);

        let status = match &mut transaction.kind {
            TransactionKind::Swap(swap) => self.execute_swap(swap, block_timestamp)?,
            TransactionKind::Mint(liquidity) => self.execute_mint(liquidity, block_timestamp)?,
            TransactionKind::Burn(liquidity) => self.execute_burn(liquidity, block_timestamp)?,
        };
        transaction.status = status;

        debug!(id = transaction.id, block_number, %status, "transaction executed");
        Ok(())
    }

    /// Reserve, slippage and invariant checks. Reads the pool only.
    fn plan_swap(
        &self,
        token_in: Side,
        amount_in: U256,
        amount_out: U256,
        amount_out_min: U256,
    ) -> Result<SwapPlan, TransactionStatus> {
        let (reserve_in, reserve_out) = self.pool.reserves_for(token_in);

        if amount_out >= reserve_out {
            return Err(TransactionStatus::NotEnoughReserves);
        }
        if amount_out < amount_out_min {
            return Err(TransactionStatus::ExceededMaxSlippage);
        }
        if violates_k(self.pool.k_last(), reserve_in, reserve_out, amount_in, amount_out) {
            return Err(TransactionStatus::KError);
        }

        // The system fee always leaves through the Y reserve
        let plan = match token_in {
            Side::X => {
                let system_fee = system_fee_of(amount_out);
                if self.pool.reserve_y() <= amount_out + system_fee {
                    return Err(TransactionStatus::NotEnoughReserves);
                }
                SwapPlan {
                    system_fee,
                    reserve_out_after: self.pool.reserve_y() - amount_out - system_fee,
                }
            }
            Side::Y => {
                let system_fee = system_fee_of(amount_in);
                if self.pool.reserve_x() <= amount_out || self.pool.reserve_y() + amount_in <= system_fee {
                    return Err(TransactionStatus::NotEnoughReserves);
                }
                SwapPlan {
                    system_fee,
                    reserve_out_after: self.pool.reserve_x() - amount_out,
                }
            }
        };
        Ok(plan)
    }

    fn execute_swap(&mut self, swap: &mut SwapDetails, block_timestamp: u64) -> Result<TransactionStatus, SimulationError> {
        let token_in = swap.token_in;
        let amount_in = swap.token_in_amount;
        let (reserve_in, reserve_out) = self.pool.reserves_for(token_in);

        let amount_out = get_amount_out(amount_in, reserve_in, reserve_out);
        swap.token_out_amount = Some(amount_out);

        let plan = match self.plan_swap(token_in, amount_in, amount_out, swap.amount_out_min) {
            Ok(plan) => plan,
            Err(status) => return Ok(status),
        };

        self.pool.update_pair(block_timestamp);

        let outcome = self.mitigator.check(
            &self.pool,
            &self.oracle,
            token_in,
            amount_in,
            amount_out,
            plan.reserve_out_after,
            block_timestamp,
        )?;
        swap.mitigator_check_status = outcome.status;
        swap.oracle_comparison = outcome.comparison;

        if outcome.blocked {
            warn!(%amount_in, %amount_out, token_in = %token_in, "swap blocked by volatility mitigation");
            return Ok(TransactionStatus::BlockedByMitigation);
        }

        self.pool.update_reserve(token_in, ReserveDelta::Increase(amount_in))?;
        self.pool.update_reserve(token_in.opposite(), ReserveDelta::Decrease(amount_out))?;
        self.pool.update_reserve_y(ReserveDelta::Decrease(plan.system_fee))?;
        swap.system_fee = Some(plan.system_fee);

        Ok(TransactionStatus::Success)
    }

    fn execute_mint(
        &mut self,
        liquidity: &LiquidityDetails,
        block_timestamp: u64,
    ) -> Result<TransactionStatus, SimulationError> {
        self.pool.update_pair(block_timestamp);
        self.pool.reserve_after(Side::Y, ReserveDelta::Increase(liquidity.y_amount))?;
        self.pool.update_reserve_x(ReserveDelta::Increase(liquidity.x_amount))?;
        self.pool.update_reserve_y(ReserveDelta::Increase(liquidity.y_amount))?;
        Ok(TransactionStatus::Success)
    }

    fn execute_burn(
        &mut self,
        liquidity: &mut LiquidityDetails,
        block_timestamp: u64,
    ) -> Result<TransactionStatus, SimulationError> {
        self.pool.update_pair(block_timestamp);

        let floor = U256::from(MIN_LIQUIDITY);
        let available_x = self.pool.reserve_x().saturating_sub(floor);
        let available_y = self.pool.reserve_y().saturating_sub(floor);

        let status = if liquidity.x_amount > available_x || liquidity.y_amount > available_y {
            warn!(
                requested_x = %liquidity.x_amount,
                requested_y = %liquidity.y_amount,
                "burn clipped to available liquidity"
            );
            liquidity.x_amount = liquidity.x_amount.min(available_x);
            liquidity.y_amount = liquidity.y_amount.min(available_y);
            TransactionStatus::Clipped
        } else {
            TransactionStatus::Success
        };

        self.pool.update_reserve_x(ReserveDelta::Decrease(liquidity.x_amount))?;
        self.pool.update_reserve_y(ReserveDelta::Decrease(liquidity.y_amount))?;
        Ok(status)
    }

    /// Outcome `request` would have if executed now at `block_timestamp`.
    ///
    /// Touches neither the pool, the oracle nor the accumulators, so it can
    /// be repeated freely.
    pub fn verify_swap(&self, request: &SwapRequest, block_timestamp: u64) -> Result<TransactionStatus, SimulationError> {
        let (token_in, _) = self.resolve_sides(&request.token_in, &request.token_out)?;
        let amount_out_min = self.admission_floor(token_in, request.token_in_amount, request.slippage_bps)?;
        self.verify(token_in, request.token_in_amount, amount_out_min, block_timestamp)
    }

    fn verify(
        &self,
        token_in: Side,
        amount_in: U256,
        amount_out_min: U256,
        block_timestamp: u64,
    ) -> Result<TransactionStatus, SimulationError> {
        let (reserve_in, reserve_out) = self.pool.reserves_for(token_in);
        let amount_out = get_amount_out(amount_in, reserve_in, reserve_out);

        let plan = match self.plan_swap(token_in, amount_in, amount_out, amount_out_min) {
            Ok(plan) => plan,
            Err(status) => return Ok(status),
        };

        let outcome = self.mitigator.check(
            &self.pool,
            &self.oracle,
            token_in,
            amount_in,
            amount_out,
            plan.reserve_out_after,
            block_timestamp,
        )?;

        Ok(if outcome.blocked {
            TransactionStatus::BlockedByMitigation
        } else {
            TransactionStatus::Success
        })
    }

    /// Largest input of `token_in`, up to `upper_bound`, that would swap
    /// successfully at `block_timestamp`. `None` if not even one unit would.
    pub fn max_admissible_swap(
        &self,
        token_in: Side,
        block_timestamp: u64,
        upper_bound: U256,
    ) -> Result<Option<U256>, SimulationError> {
        let mut low = U256::zero();
        let mut high = upper_bound;

        while low < high {
            let mid = low + (high - low + 1) / 2;
            if self.verify(token_in, mid, U256::zero(), block_timestamp)? == TransactionStatus::Success {
                low = mid;
            } else {
                high = mid - 1;
            }
        }

        Ok(if low.is_zero() { None } else { Some(low) })
    }
}
