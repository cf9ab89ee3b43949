//! Error types for the simulation engine
//!
//! Transaction outcomes (slippage, blocked by mitigation, ...) are not errors;
//! they are recorded as a [`TransactionStatus`](crate::simulation::TransactionStatus).
//! The variants below are configuration or programming mistakes and are
//! propagated to the caller as hard failures.

use crate::simulation::pool_state::Side;
use primitive_types::U256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("window size {window_size} is not divisible by granularity {granularity}")]
    WindowNotDivisible { window_size: u64, granularity: u64 },

    #[error("period size {period_size} does not match window size {window_size} / granularity {granularity}")]
    PeriodMismatch {
        window_size: u64,
        granularity: u64,
        period_size: u64,
    },

    #[error("granularity must be greater than zero")]
    ZeroGranularity,

    #[error("window size must be greater than zero")]
    ZeroWindow,

    #[error("average block time must be greater than zero")]
    ZeroBlockTime,

    #[error("price tolerance threshold {0} is outside 0..=100")]
    ThresholdOutOfRange(u8),

    #[error("slippage {0} bps is outside 0..=10000")]
    SlippageOutOfRange(u16),

    #[error("token symbols of a pool must differ")]
    SameToken,

    #[error("initial reserve {0} does not fit in 128 bits")]
    ReserveOutOfRange(U256),

    #[error("invalid generator parameters: {0}")]
    InvalidGenerator(String),

    #[error("invalid retry policy: {0}")]
    InvalidRetry(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("insufficient reserve {side}: reserve = {reserve}, delta = -{delta}")]
    InsufficientReserve { side: Side, reserve: U256, delta: U256 },

    #[error("reserve would exceed 128 bits")]
    Overflow,

    #[error("token {0} is not part of this pool")]
    UnknownToken(String),

    #[error("swap input and output token must differ")]
    SameToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("missing historical observation, can't consult at {block_timestamp}")]
    MissingHistoricalObservation { block_timestamp: u64 },

    #[error("observation window has zero elapsed time")]
    ZeroElapsed,
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}
