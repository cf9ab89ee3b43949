//! Block Scheduler
//!
//! Groups incoming transactions into blocks of `avg_block_time` seconds.
//! Block `n` covers `[t_n, t_n + avg_block_time)` and is stamped `t_n`;
//! its transactions execute in arrival order once a later transaction (or
//! [`Blockchain::force_finish`]) closes it.
//!
//! Blocks are stamped with their start, not with the time they close. A
//! transaction therefore executes at a block timestamp at or before its own
//! request timestamp, and one landing exactly on `t_n + avg_block_time`
//! opens the next block.

use crate::errors::{ConfigError, SimulationError};
use crate::simulation::amm::Amm;
use crate::simulation::transaction::{ExecutedTransaction, Transaction};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Blockchain {
    avg_block_time: u64,
    current_block_timestamp: Option<u64>,
    current_block_number: u64,
    pending: Vec<Transaction>,
}

impl Blockchain {
    /// Scheduler whose first block starts at the first received transaction
    pub fn new(avg_block_time: u64) -> Result<Self, ConfigError> {
        if avg_block_time == 0 {
            return Err(ConfigError::ZeroBlockTime);
        }
        Ok(Self {
            avg_block_time,
            current_block_timestamp: None,
            current_block_number: 0,
            pending: Vec::new(),
        })
    }

    /// Scheduler whose first block starts at `start_timestamp`
    pub fn starting_at(avg_block_time: u64, start_timestamp: u64) -> Result<Self, ConfigError> {
        let mut chain = Self::new(avg_block_time)?;
        chain.current_block_timestamp = Some(start_timestamp);
        Ok(chain)
    }

    pub fn avg_block_time(&self) -> u64 {
        self.avg_block_time
    }

    pub fn current_block_timestamp(&self) -> Option<u64> {
        self.current_block_timestamp
    }

    pub fn current_block_number(&self) -> u64 {
        self.current_block_number
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    /// Queue `transaction`, first closing every block that ends at or
    /// before its timestamp. Returns the transactions executed on the way.
    pub fn receive(
        &mut self,
        amm: &mut Amm,
        transaction: Transaction,
    ) -> Result<Vec<ExecutedTransaction>, SimulationError> {
        let executed = self.update(amm, transaction.timestamp)?;
        if self.current_block_timestamp.is_none() {
            self.current_block_timestamp = Some(transaction.timestamp);
        }
        self.pending.push(transaction);
        Ok(executed)
    }

    /// Advance the clock to `timestamp`, closing every block that ends at
    /// or before it.
    pub fn update(&mut self, amm: &mut Amm, timestamp: u64) -> Result<Vec<ExecutedTransaction>, SimulationError> {
        let mut executed = Vec::new();
        let Some(mut current) = self.current_block_timestamp else {
            return Ok(executed);
        };

        while timestamp >= current + self.avg_block_time {
            if self.pending.is_empty() {
                // Nothing to execute in the blocks in between
                let skipped = (timestamp - current) / self.avg_block_time;
                current += skipped * self.avg_block_time;
                self.current_block_number += skipped;
                self.current_block_timestamp = Some(current);
            } else {
                executed.extend(self.close_block(amm, current)?);
                current += self.avg_block_time;
            }
        }

        Ok(executed)
    }

    /// Execute whatever is still pending as a final block
    pub fn force_finish(&mut self, amm: &mut Amm) -> Result<Vec<ExecutedTransaction>, SimulationError> {
        match self.current_block_timestamp {
            Some(current) if !self.pending.is_empty() => self.close_block(amm, current),
            _ => Ok(Vec::new()),
        }
    }

    /// Drop pending transactions and rewind the clock. The pool is left alone.
    pub fn reset_state(&mut self) {
        self.current_block_timestamp = None;
        self.current_block_number = 0;
        self.pending.clear();
    }

    fn close_block(&mut self, amm: &mut Amm, block_timestamp: u64) -> Result<Vec<ExecutedTransaction>, SimulationError> {
        let block_number = self.current_block_number;
        let transactions = std::mem::take(&mut self.pending);
        debug!(block_number, block_timestamp, transactions = transactions.len(), "closing block");

        amm.begin_block(block_timestamp);

        let mut executed = Vec::with_capacity(transactions.len());
        for mut transaction in transactions {
            let pool_before = amm.pool().snapshot();
            amm.execute(&mut transaction, block_timestamp, block_number)?;
            executed.push(ExecutedTransaction {
                transaction,
                pool_before,
                pool_after: amm.pool().snapshot(),
            });
        }

        self.current_block_timestamp = Some(block_timestamp + self.avg_block_time);
        self.current_block_number += 1;
        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::amm::AmmParameters;
    use crate::simulation::mitigator::OraclePolicy;
    use crate::simulation::transaction::{LiquidityRequest, SwapRequest, TransactionStatus};
    use crate::utils::fixed_point::expand_to_18_decimals;
    use primitive_types::U256;

    fn amm() -> Amm {
        Amm::new(&AmmParameters {
            token_x: "X".to_string(),
            token_y: "Y".to_string(),
            reserve_x: expand_to_18_decimals(10_000),
            reserve_y: expand_to_18_decimals(10_000),
            mitigation_enabled: false,
            window_size: 3_600,
            period_size: 300,
            granularity: 12,
            price_tolerance_threshold: 98,
            on_oracle_unavailable: OraclePolicy::Allow,
        })
        .unwrap()
    }

    fn mint(amm: &mut Amm, timestamp: u64) -> Transaction {
        amm.admit_mint(&LiquidityRequest {
            timestamp,
            x_amount: U256::one(),
            y_amount: U256::one(),
        })
    }

    #[test]
    fn test_zero_block_time_rejected() {
        assert_eq!(Blockchain::new(0).unwrap_err(), ConfigError::ZeroBlockTime);
    }

    #[test]
    fn test_same_block_keeps_submission_order() {
        let mut amm = amm();
        let mut chain = Blockchain::starting_at(10, 0).unwrap();

        for timestamp in [5, 3, 9] {
            let tx = mint(&mut amm, timestamp);
            assert!(chain.receive(&mut amm, tx).unwrap().is_empty());
        }
        assert_eq!(chain.pending().len(), 3);

        let executed = chain.force_finish(&mut amm).unwrap();
        let ids: Vec<u64> = executed.iter().map(|e| e.transaction.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        for e in &executed {
            assert_eq!(e.transaction.block_timestamp, Some(0));
            assert_eq!(e.transaction.block_number, Some(0));
            assert_eq!(e.transaction.status, TransactionStatus::Success);
        }
        assert!(chain.pending().is_empty());
        assert_eq!(chain.current_block_number(), 1);
    }

    #[test]
    fn test_blocks_close_on_boundary() {
        let mut amm = amm();
        let mut chain = Blockchain::new(10).unwrap();

        let tx = mint(&mut amm, 100);
        assert!(chain.receive(&mut amm, tx).unwrap().is_empty());
        assert_eq!(chain.current_block_timestamp(), Some(100));

        let tx = mint(&mut amm, 109);
        assert!(chain.receive(&mut amm, tx).unwrap().is_empty());

        // 110 starts the next block and closes the first one
        let tx = mint(&mut amm, 110);
        let executed = chain.receive(&mut amm, tx).unwrap();
        assert_eq!(executed.len(), 2);
        assert!(executed.iter().all(|e| e.transaction.block_timestamp == Some(100)));
        assert_eq!(chain.current_block_timestamp(), Some(110));
        assert_eq!(chain.current_block_number(), 1);
    }

    #[test]
    fn test_empty_blocks_are_skipped() {
        let mut amm = amm();
        let mut chain = Blockchain::new(12).unwrap();

        let tx = mint(&mut amm, 0);
        chain.receive(&mut amm, tx).unwrap();
        let tx = mint(&mut amm, 125);
        let executed = chain.receive(&mut amm, tx).unwrap();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].transaction.block_number, Some(0));

        let executed = chain.force_finish(&mut amm).unwrap();
        assert_eq!(executed[0].transaction.block_timestamp, Some(120));
        assert_eq!(executed[0].transaction.block_number, Some(10));
    }

    #[test]
    fn test_block_timestamp_not_after_request() {
        let mut amm = amm();
        let mut chain = Blockchain::new(12).unwrap();

        let mut executed = Vec::new();
        for timestamp in [1_000, 1_005, 1_011, 1_012, 1_023, 1_050, 1_200] {
            let tx = mint(&mut amm, timestamp);
            executed.extend(chain.receive(&mut amm, tx).unwrap());
        }
        executed.extend(chain.force_finish(&mut amm).unwrap());

        assert_eq!(executed.len(), 7);
        for e in &executed {
            let block_timestamp = e.transaction.block_timestamp.unwrap();
            assert!(block_timestamp <= e.transaction.timestamp);
            assert!(e.transaction.timestamp < block_timestamp + 12);
        }
        let stamps: Vec<u64> = executed.iter().map(|e| e.transaction.block_timestamp.unwrap()).collect();
        assert_eq!(stamps, vec![1_000, 1_000, 1_000, 1_012, 1_012, 1_048, 1_192]);
    }

    #[test]
    fn test_snapshots_surround_execution() {
        let mut amm = amm();
        let mut chain = Blockchain::new(12).unwrap();
        let tx = amm
            .admit_swap(&SwapRequest {
                timestamp: 0,
                token_in: "X".to_string(),
                token_out: "Y".to_string(),
                token_in_amount: expand_to_18_decimals(100),
                slippage_bps: 100,
            })
            .unwrap();
        chain.receive(&mut amm, tx).unwrap();

        let executed = chain.force_finish(&mut amm).unwrap();
        let e = &executed[0];
        assert_eq!(e.transaction.status, TransactionStatus::Success);
        assert_eq!(e.pool_before.reserve_x, expand_to_18_decimals(10_000));
        assert_eq!(e.pool_after.reserve_x, expand_to_18_decimals(10_100));
        assert!(e.pool_after.k >= e.pool_before.k);
    }

    #[test]
    fn test_reset_state() {
        let mut amm = amm();
        let mut chain = Blockchain::new(12).unwrap();
        let tx = mint(&mut amm, 50);
        chain.receive(&mut amm, tx).unwrap();

        chain.reset_state();
        assert!(chain.pending().is_empty());
        assert_eq!(chain.current_block_timestamp(), None);
        assert_eq!(chain.current_block_number(), 0);
        assert!(chain.force_finish(&mut amm).unwrap().is_empty());
        // Pool untouched by the dropped mint
        assert_eq!(amm.pool().reserve_x(), expand_to_18_decimals(10_000));
    }
}
