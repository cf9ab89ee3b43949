//! Transactions
//!
//! Requests as submitted by traders, and the admitted transactions that
//! the scheduler executes against the pool. A transaction starts out
//! `Pending` and ends in exactly one terminal status.

use crate::simulation::mitigator::{MitigatorCheckStatus, OracleComparison};
use crate::simulation::pool_state::{Pool, PoolSnapshot, Side};
use crate::utils::fixed_point::{u256_dec, u256_dec_opt};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    BlockedByMitigation,
    NotEnoughReserves,
    ExceededMaxSlippage,
    KError,
    /// Burn reduced to what the pool can give up
    Clipped,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 7] = [
        TransactionStatus::Pending,
        TransactionStatus::Success,
        TransactionStatus::BlockedByMitigation,
        TransactionStatus::NotEnoughReserves,
        TransactionStatus::ExceededMaxSlippage,
        TransactionStatus::KError,
        TransactionStatus::Clipped,
    ];

    pub fn is_terminal(self) -> bool {
        self != TransactionStatus::Pending
    }

    /// Whether the pool state changed
    pub fn is_applied(self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Clipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::BlockedByMitigation => "BLOCKED_BY_MITIGATION",
            TransactionStatus::NotEnoughReserves => "NOT_ENOUGH_RESERVES",
            TransactionStatus::ExceededMaxSlippage => "EXCEEDED_MAX_SLIPPAGE",
            TransactionStatus::KError => "K_ERROR",
            TransactionStatus::Clipped => "CLIPPED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Swap,
    Mint,
    Burn,
}

/// Swap as requested by a trader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub timestamp: u64,
    pub token_in: String,
    pub token_out: String,
    #[serde(with = "u256_dec")]
    pub token_in_amount: U256,
    /// Tolerated shortfall against the admission-time quote
    pub slippage_bps: u16,
}

/// Liquidity added to or removed from both reserves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityRequest {
    pub timestamp: u64,
    #[serde(with = "u256_dec")]
    pub x_amount: U256,
    #[serde(with = "u256_dec")]
    pub y_amount: U256,
}

/// Anything that can be submitted to the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Swap(SwapRequest),
    Mint(LiquidityRequest),
    Burn(LiquidityRequest),
}

impl Request {
    pub fn timestamp(&self) -> u64 {
        match self {
            Request::Swap(swap) => swap.timestamp,
            Request::Mint(liquidity) | Request::Burn(liquidity) => liquidity.timestamp,
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Request::Swap(_) => TransactionType::Swap,
            Request::Mint(_) => TransactionType::Mint,
            Request::Burn(_) => TransactionType::Burn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapDetails {
    pub token_in: Side,
    pub token_out: Side,
    #[serde(with = "u256_dec")]
    pub token_in_amount: U256,
    #[serde(with = "u256_dec")]
    pub amount_out_min: U256,
    /// Set at execution from the reserves of that moment
    #[serde(with = "u256_dec_opt")]
    pub token_out_amount: Option<U256>,
    #[serde(with = "u256_dec_opt")]
    pub system_fee: Option<U256>,
    pub mitigator_check_status: MitigatorCheckStatus,
    pub oracle_comparison: Option<OracleComparison>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityDetails {
    #[serde(with = "u256_dec")]
    pub x_amount: U256,
    #[serde(with = "u256_dec")]
    pub y_amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Swap(SwapDetails),
    Mint(LiquidityDetails),
    Burn(LiquidityDetails),
}

/// Admitted transaction, owned by the scheduler until executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    /// Request time
    pub timestamp: u64,
    pub block_timestamp: Option<u64>,
    pub block_number: Option<u64>,
    pub status: TransactionStatus,
    pub kind: TransactionKind,
}

impl Transaction {
    pub fn new(id: u64, timestamp: u64, kind: TransactionKind) -> Self {
        Self {
            id,
            timestamp,
            block_timestamp: None,
            block_number: None,
            status: TransactionStatus::Pending,
            kind,
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        match self.kind {
            TransactionKind::Swap(_) => TransactionType::Swap,
            TransactionKind::Mint(_) => TransactionType::Mint,
            TransactionKind::Burn(_) => TransactionType::Burn,
        }
    }

    pub fn swap(&self) -> Option<&SwapDetails> {
        match &self.kind {
            TransactionKind::Swap(swap) => Some(swap),
            _ => None,
        }
    }

    /// Flatten into a single audit row, resolving sides to the pool's symbols
    pub fn to_record(&self, pool: &Pool) -> TransactionRecord {
        let mut record = TransactionRecord {
            id: self.id,
            transaction_type: self.transaction_type(),
            token_in: None,
            token_out: None,
            token_in_amount: None,
            amount_out_min: None,
            token_out_amount: None,
            system_fee: None,
            mitigator_check_status: None,
            oracle_amount_out: None,
            oracle_price: None,
            out_amount_diff: None,
            slice_factor: None,
            slice_factor_curve: None,
            x_amount: None,
            y_amount: None,
            status: self.status,
            block_number: self.block_number,
            block_timestamp: self.block_timestamp,
            transaction_timestamp: self.timestamp,
        };

        match &self.kind {
            TransactionKind::Swap(swap) => {
                record.token_in = Some(pool.symbol(swap.token_in).to_string());
                record.token_out = Some(pool.symbol(swap.token_out).to_string());
                record.token_in_amount = Some(swap.token_in_amount);
                record.amount_out_min = Some(swap.amount_out_min);
                record.token_out_amount = swap.token_out_amount;
                record.system_fee = swap.system_fee;
                record.mitigator_check_status = Some(swap.mitigator_check_status);
                if let Some(comparison) = &swap.oracle_comparison {
                    record.oracle_amount_out = Some(comparison.oracle_amount_out);
                    record.oracle_price = Some(comparison.oracle_price);
                    record.out_amount_diff = Some(comparison.out_amount_diff);
                    record.slice_factor = comparison.slice_factor;
                    record.slice_factor_curve = comparison.slice_factor_curve;
                }
            }
            TransactionKind::Mint(liquidity) | TransactionKind::Burn(liquidity) => {
                record.x_amount = Some(liquidity.x_amount);
                record.y_amount = Some(liquidity.y_amount);
            }
        }

        record
    }
}

/// Flat audit row of an executed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: u64,
    pub transaction_type: TransactionType,
    pub token_in: Option<String>,
    pub token_out: Option<String>,
    #[serde(with = "u256_dec_opt")]
    pub token_in_amount: Option<U256>,
    #[serde(with = "u256_dec_opt")]
    pub amount_out_min: Option<U256>,
    #[serde(with = "u256_dec_opt")]
    pub token_out_amount: Option<U256>,
    #[serde(with = "u256_dec_opt")]
    pub system_fee: Option<U256>,
    pub mitigator_check_status: Option<MitigatorCheckStatus>,
    #[serde(with = "u256_dec_opt")]
    pub oracle_amount_out: Option<U256>,
    #[serde(with = "u256_dec_opt")]
    pub oracle_price: Option<U256>,
    #[serde(with = "u256_dec_opt")]
    pub out_amount_diff: Option<U256>,
    pub slice_factor: Option<u64>,
    pub slice_factor_curve: Option<u64>,
    #[serde(with = "u256_dec_opt")]
    pub x_amount: Option<U256>,
    #[serde(with = "u256_dec_opt")]
    pub y_amount: Option<U256>,
    pub status: TransactionStatus,
    pub block_number: Option<u64>,
    pub block_timestamp: Option<u64>,
    pub transaction_timestamp: u64,
}

/// Executed transaction together with the pool state around it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedTransaction {
    pub transaction: Transaction,
    pub pool_before: PoolSnapshot,
    pub pool_after: PoolSnapshot,
}
