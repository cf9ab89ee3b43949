//! Simulation Orchestrator
//!
//! Controls the flow of the simulation: feeds one request stream through
//! the block scheduler twice (volatility mitigation off, then on) and
//! collects executed transactions, pool history and summaries.

use crate::analytics::metrics::{MetricsCalculator, RunComparison, RunSummary};
use crate::config::SimulationConfig;
use crate::errors::SimulationError;
use crate::simulation::amm::Amm;
use crate::simulation::blockchain::Blockchain;
use crate::simulation::pool_state::PoolSnapshot;
use crate::simulation::transaction::{
    ExecutedTransaction, Request, SwapRequest, TransactionRecord, TransactionStatus,
};
use crate::utils::fixed_point::contract_18_decimals_to_f64;
use crate::utils::hash::{fingerprint, hash_to_hex};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Results of the complete simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResults {
    /// Configuration used
    pub config: SimulationConfig,
    /// One entry per scenario, mitigation off first
    pub runs: Vec<RunResult>,
    /// Present when both scenarios ran
    pub comparison: Option<RunComparison>,
    pub generated_at: DateTime<Utc>,
}

impl SimulationResults {
    pub fn run(&self, mitigation_enabled: bool) -> Option<&RunResult> {
        self.runs.iter().find(|r| r.mitigation_enabled == mitigation_enabled)
    }
}

/// Outcome of one pass over the request stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub scenario: String,
    pub mitigation_enabled: bool,
    pub transactions: Vec<ExecutedTransaction>,
    pub summary: RunSummary,
    pub pool_history: Vec<PoolStateRecord>,
    pub initial_pool: PoolSnapshot,
    pub final_pool: PoolSnapshot,
    /// SHA-256 of the audit records, equal across identical runs
    pub fingerprint: String,
}

/// Record of pool state after a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStateRecord {
    pub transaction_id: u64,
    pub block_timestamp: u64,
    pub reserve_x: f64,
    pub reserve_y: f64,
    pub price_x_in_y: f64,
    pub scenario: String,
}

fn scenario_name(mitigation_enabled: bool) -> &'static str {
    if mitigation_enabled {
        "mitigation_on"
    } else {
        "mitigation_off"
    }
}

/// Main simulation orchestrator
pub struct Orchestrator {
    config: SimulationConfig,
    amm: Amm,
    chain: Blockchain,
    /// Swaps shrunk by the retry policy in the current run
    retried_swaps: u64,
}

impl Orchestrator {
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let amm = Amm::new(&config.amm_parameters(config.mitigation_enabled))?;
        let chain = Blockchain::new(config.avg_block_time)?;
        Ok(Self {
            config,
            amm,
            chain,
            retried_swaps: 0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn amm(&self) -> &Amm {
        &self.amm
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    /// Run the stream with mitigation off and on, then compare
    pub fn run(&mut self, requests: &[Request]) -> Result<SimulationResults> {
        info!("Starting simulation...");
        info!("Requests: {}", requests.len());
        info!(
            "Pool: {} {} / {} {}",
            self.config.initial_reserve_x, self.config.token_x, self.config.initial_reserve_y, self.config.token_y
        );

        let mut runs = Vec::with_capacity(2);
        for mitigation_enabled in [false, true] {
            runs.push(self.run_single(requests, mitigation_enabled)?);
        }

        let comparison = MetricsCalculator::compare(&runs[0].summary, &runs[1].summary);
        info!("Simulation complete!");
        info!(
            "Swaps blocked by mitigation: {} ({:.2}%)",
            comparison.blocked_swaps, comparison.blocked_rate
        );

        Ok(SimulationResults {
            config: self.config.clone(),
            runs,
            comparison: Some(comparison),
            generated_at: Utc::now(),
        })
    }

    /// Single run with the configured mitigation setting
    pub fn replay(&mut self, requests: &[Request]) -> Result<SimulationResults> {
        let run = self.run_single(requests, self.config.mitigation_enabled)?;
        Ok(SimulationResults {
            config: self.config.clone(),
            runs: vec![run],
            comparison: None,
            generated_at: Utc::now(),
        })
    }

    /// Feed every request through a fresh pool and scheduler
    pub fn run_single(&mut self, requests: &[Request], mitigation_enabled: bool) -> Result<RunResult> {
        let scenario = scenario_name(mitigation_enabled);
        info!("Running scenario {}", scenario);
        self.reset(mitigation_enabled)?;
        let initial_pool = self.amm.pool().snapshot();

        let mut transactions = Vec::with_capacity(requests.len());
        for (i, request) in requests.iter().enumerate() {
            transactions.extend(self.submit(request)?);

            if (i + 1) % 1000 == 0 || i == 0 {
                info!("Progress: {}/{} requests", i + 1, requests.len());
            }
        }
        transactions.extend(self.chain.force_finish(&mut self.amm)?);

        let final_pool = self.amm.pool().snapshot();
        let records: Vec<TransactionRecord> = transactions
            .iter()
            .map(|e| e.transaction.to_record(self.amm.pool()))
            .collect();
        let digest = fingerprint(&records).context("Failed to fingerprint transactions")?;

        let pool_history = transactions
            .iter()
            .map(|e| PoolStateRecord {
                transaction_id: e.transaction.id,
                block_timestamp: e.transaction.block_timestamp.unwrap_or(e.transaction.timestamp),
                reserve_x: contract_18_decimals_to_f64(e.pool_after.reserve_x),
                reserve_y: contract_18_decimals_to_f64(e.pool_after.reserve_y),
                price_x_in_y: e.pool_after.price_x_in_y(),
                scenario: scenario.to_string(),
            })
            .collect();

        let summary = MetricsCalculator::summarize(&transactions, &initial_pool, &final_pool, self.retried_swaps);
        info!(
            "Scenario {}: {} transactions, {} succeeded, {} blocked",
            scenario, summary.total_transactions, summary.success, summary.blocked_by_mitigation
        );

        Ok(RunResult {
            scenario: scenario.to_string(),
            mitigation_enabled,
            transactions,
            summary,
            pool_history,
            initial_pool,
            final_pool,
            fingerprint: hash_to_hex(&digest),
        })
    }

    /// Admit one request and queue it, executing blocks it closes
    pub fn submit(&mut self, request: &Request) -> Result<Vec<ExecutedTransaction>, SimulationError> {
        // Admission sees every block that ends before the request
        let mut executed = self.chain.update(&mut self.amm, request.timestamp())?;

        let transaction = match request {
            Request::Swap(swap) if self.config.retry.enabled() => {
                let swap = self.shrink_until_admissible(swap)?;
                self.amm.admit_swap(&swap)?
            }
            _ => self.amm.admit(request)?,
        };

        executed.extend(self.chain.receive(&mut self.amm, transaction)?);
        Ok(executed)
    }

    /// Shrink a swap until it would succeed in the current block. The last
    /// attempt is submitted whatever its outcome.
    fn shrink_until_admissible(&mut self, request: &SwapRequest) -> Result<SwapRequest, SimulationError> {
        let block_timestamp = self.chain.current_block_timestamp().unwrap_or(request.timestamp);
        let mut request = request.clone();
        let mut shrunk = false;

        for attempt in 1..self.config.retry.max_attempts {
            let status = self.amm.verify_swap(&request, block_timestamp)?;
            if status == TransactionStatus::Success {
                break;
            }
            debug!(attempt, %status, amount = %request.token_in_amount, "shrinking swap");
            request.token_in_amount = self.config.retry.shrink(request.token_in_amount);
            shrunk = true;
        }

        if shrunk {
            self.retried_swaps += 1;
        }
        Ok(request)
    }

    /// Reset pool, oracle and scheduler for another run
    pub fn reset(&mut self, mitigation_enabled: bool) -> Result<(), SimulationError> {
        self.amm.reset(&self.config.amm_parameters(mitigation_enabled))?;
        self.chain.reset_state();
        self.retried_swaps = 0;
        Ok(())
    }
}
