//! Metrics calculation for simulation analysis

use crate::simulation::mitigator::MitigatorCheckStatus;
use crate::simulation::orchestrator::RunResult;
use crate::simulation::pool_state::{PoolSnapshot, Side};
use crate::simulation::transaction::{ExecutedTransaction, TransactionKind, TransactionStatus};
use crate::utils::fixed_point::{contract_18_decimals_to_f64, u256_dec, u256_to_f64};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Summary statistics of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mitigation_enabled: bool,
    pub total_transactions: u64,
    pub swaps: u64,
    pub mints: u64,
    pub burns: u64,
    pub success: u64,
    pub blocked_by_mitigation: u64,
    pub not_enough_reserves: u64,
    pub exceeded_max_slippage: u64,
    pub k_error: u64,
    pub clipped: u64,
    /// Swaps let through because the oracle had no usable history
    pub cant_consult_oracle: u64,
    /// Swaps shrunk before submission
    pub retried_swaps: u64,
    /// Blocked swaps as a percentage of all swaps
    pub blocked_rate: f64,
    /// Total system fee taken out of the Y reserve
    #[serde(with = "u256_dec")]
    pub total_system_fee: U256,
    /// Input volume of successful swaps, per input token
    #[serde(with = "u256_dec")]
    pub volume_x_in: U256,
    #[serde(with = "u256_dec")]
    pub volume_y_in: U256,
    pub initial_reserve_x: f64,
    pub initial_reserve_y: f64,
    pub final_reserve_x: f64,
    pub final_reserve_y: f64,
    pub initial_price: f64,
    pub final_price: f64,
    /// Relative change of k over the run (%)
    pub k_change_percent: f64,
}

/// Mitigation on vs. off for the same request stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunComparison {
    pub blocked_swaps: u64,
    pub blocked_rate: f64,
    pub system_fee_off: f64,
    pub system_fee_on: f64,
    pub final_price_off: f64,
    pub final_price_on: f64,
    /// Relative difference of the final reserves, on against off (%)
    pub reserve_x_divergence_percent: f64,
    pub reserve_y_divergence_percent: f64,
}

/// Data point for price charts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceDataPoint {
    pub transaction: u64,
    pub block_timestamp: u64,
    pub price: f64,
}

/// Histogram bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub range_start: f64,
    pub range_end: f64,
    pub count: u32,
    pub label: String,
}

fn percent_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        0.0
    } else {
        (to - from) / from * 100.0
    }
}

/// Calculator for simulation metrics
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Aggregate the executed transactions of a run
    pub fn summarize(
        executed: &[ExecutedTransaction],
        initial: &PoolSnapshot,
        last: &PoolSnapshot,
        retried_swaps: u64,
    ) -> RunSummary {
        let mut summary = RunSummary {
            mitigation_enabled: initial.mitigation_enabled,
            total_transactions: executed.len() as u64,
            retried_swaps,
            initial_reserve_x: contract_18_decimals_to_f64(initial.reserve_x),
            initial_reserve_y: contract_18_decimals_to_f64(initial.reserve_y),
            final_reserve_x: contract_18_decimals_to_f64(last.reserve_x),
            final_reserve_y: contract_18_decimals_to_f64(last.reserve_y),
            initial_price: initial.price_x_in_y(),
            final_price: last.price_x_in_y(),
            k_change_percent: percent_change(u256_to_f64(initial.k), u256_to_f64(last.k)),
            ..RunSummary::default()
        };

        for e in executed {
            let tx = &e.transaction;
            match tx.status {
                TransactionStatus::Success => summary.success += 1,
                TransactionStatus::BlockedByMitigation => summary.blocked_by_mitigation += 1,
                TransactionStatus::NotEnoughReserves => summary.not_enough_reserves += 1,
                TransactionStatus::ExceededMaxSlippage => summary.exceeded_max_slippage += 1,
                TransactionStatus::KError => summary.k_error += 1,
                TransactionStatus::Clipped => summary.clipped += 1,
                TransactionStatus::Pending => {}
            }

            match &tx.kind {
                TransactionKind::Swap(swap) => {
                    summary.swaps += 1;
                    if swap.mitigator_check_status == MitigatorCheckStatus::CantConsultOracle {
                        summary.cant_consult_oracle += 1;
                    }
                    if tx.status == TransactionStatus::Success {
                        summary.total_system_fee += swap.system_fee.unwrap_or_default();
                        match swap.token_in {
                            Side::X => summary.volume_x_in += swap.token_in_amount,
                            Side::Y => summary.volume_y_in += swap.token_in_amount,
                        }
                    }
                }
                TransactionKind::Mint(_) => summary.mints += 1,
                TransactionKind::Burn(_) => summary.burns += 1,
            }
        }

        summary.blocked_rate = if summary.swaps > 0 {
            summary.blocked_by_mitigation as f64 / summary.swaps as f64 * 100.0
        } else {
            0.0
        };

        summary
    }

    /// Compare a run without mitigation against one with it
    pub fn compare(off: &RunSummary, on: &RunSummary) -> RunComparison {
        RunComparison {
            blocked_swaps: on.blocked_by_mitigation,
            blocked_rate: on.blocked_rate,
            system_fee_off: contract_18_decimals_to_f64(off.total_system_fee),
            system_fee_on: contract_18_decimals_to_f64(on.total_system_fee),
            final_price_off: off.final_price,
            final_price_on: on.final_price,
            reserve_x_divergence_percent: percent_change(off.final_reserve_x, on.final_reserve_x),
            reserve_y_divergence_percent: percent_change(off.final_reserve_y, on.final_reserve_y),
        }
    }

    /// Spot price of X in Y after every transaction
    pub fn price_over_time(run: &RunResult) -> Vec<PriceDataPoint> {
        run.transactions
            .iter()
            .map(|e| PriceDataPoint {
                transaction: e.transaction.id,
                block_timestamp: e.transaction.block_timestamp.unwrap_or(e.transaction.timestamp),
                price: e.pool_after.price_x_in_y(),
            })
            .collect()
    }

    /// Distribution of pool/oracle deviations (%) of checked swaps
    pub fn out_amount_diff_distribution(run: &RunResult) -> Vec<HistogramBucket> {
        let diffs: Vec<f64> = run
            .transactions
            .iter()
            .filter_map(|e| e.transaction.swap())
            .filter_map(|swap| swap.oracle_comparison.as_ref())
            .map(|c| u256_to_f64(c.out_amount_diff))
            .collect();

        if diffs.is_empty() {
            return vec![];
        }

        let min_diff = diffs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_diff = diffs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let bucket_size = (max_diff - min_diff) / 10.0;

        if bucket_size == 0.0 {
            return vec![HistogramBucket {
                range_start: min_diff,
                range_end: max_diff,
                count: diffs.len() as u32,
                label: format!("{:.0}%", min_diff),
            }];
        }

        let mut buckets: Vec<HistogramBucket> = (0..10)
            .map(|i| {
                let start = min_diff + (i as f64 * bucket_size);
                let end = start + bucket_size;
                HistogramBucket {
                    range_start: start,
                    range_end: end,
                    count: 0,
                    label: format!("{:.1}-{:.1}%", start, end),
                }
            })
            .collect();

        for diff in diffs {
            let bucket_idx = ((diff - min_diff) / bucket_size).floor() as usize;
            buckets[bucket_idx.min(9)].count += 1;
        }

        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::mitigator::OracleComparison;
    use crate::simulation::transaction::{LiquidityDetails, SwapDetails, Transaction};
    use crate::utils::fixed_point::expand_to_18_decimals;

    fn snapshot(x: u64, y: u64, mitigation_enabled: bool) -> PoolSnapshot {
        let reserve_x = expand_to_18_decimals(x);
        let reserve_y = expand_to_18_decimals(y);
        PoolSnapshot {
            reserve_x,
            reserve_y,
            k: reserve_x * reserve_y,
            price_x_cumulative: U256::zero(),
            price_y_cumulative: U256::zero(),
            mitigation_enabled,
        }
    }

    fn swap(id: u64, token_in: Side, status: TransactionStatus, diff: Option<u64>) -> ExecutedTransaction {
        let mut transaction = Transaction::new(
            id,
            id * 10,
            TransactionKind::Swap(SwapDetails {
                token_in,
                token_out: token_in.opposite(),
                token_in_amount: expand_to_18_decimals(10),
                amount_out_min: U256::zero(),
                token_out_amount: Some(expand_to_18_decimals(9)),
                system_fee: (status == TransactionStatus::Success).then(|| expand_to_18_decimals(1)),
                mitigator_check_status: if diff.is_some() {
                    MitigatorCheckStatus::Checked
                } else {
                    MitigatorCheckStatus::CantConsultOracle
                },
                oracle_comparison: diff.map(|d| OracleComparison {
                    oracle_amount_out: expand_to_18_decimals(9),
                    oracle_price: expand_to_18_decimals(1),
                    out_amount_diff: U256::from(d),
                    slice_factor: (d != 0).then_some(1),
                    slice_factor_curve: (d != 0).then_some(1),
                }),
            }),
        );
        transaction.status = status;
        transaction.block_timestamp = Some(id * 12);
        ExecutedTransaction {
            transaction,
            pool_before: snapshot(100, 100, true),
            pool_after: snapshot(100, 100 + id, true),
        }
    }

    fn burn(id: u64) -> ExecutedTransaction {
        let mut transaction = Transaction::new(
            id,
            id,
            TransactionKind::Burn(LiquidityDetails {
                x_amount: U256::one(),
                y_amount: U256::one(),
            }),
        );
        transaction.status = TransactionStatus::Clipped;
        ExecutedTransaction {
            transaction,
            pool_before: snapshot(1, 1, true),
            pool_after: snapshot(1, 1, true),
        }
    }

    fn run(transactions: Vec<ExecutedTransaction>) -> RunResult {
        let initial = snapshot(100, 100, true);
        RunResult {
            scenario: "mitigation_on".to_string(),
            mitigation_enabled: true,
            summary: MetricsCalculator::summarize(&transactions, &initial, &initial, 0),
            transactions,
            pool_history: vec![],
            initial_pool: initial.clone(),
            final_pool: initial,
            fingerprint: String::new(),
        }
    }

    #[test]
    fn test_summarize_counts() {
        let executed = vec![
            swap(0, Side::X, TransactionStatus::Success, None),
            swap(1, Side::Y, TransactionStatus::Success, Some(2)),
            swap(2, Side::X, TransactionStatus::BlockedByMitigation, Some(40)),
            swap(3, Side::X, TransactionStatus::ExceededMaxSlippage, None),
            burn(4),
        ];
        let summary = MetricsCalculator::summarize(&executed, &snapshot(100, 100, true), &snapshot(100, 400, true), 3);

        assert_eq!(summary.total_transactions, 5);
        assert_eq!(summary.swaps, 4);
        assert_eq!(summary.burns, 1);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.blocked_by_mitigation, 1);
        assert_eq!(summary.exceeded_max_slippage, 1);
        assert_eq!(summary.clipped, 1);
        assert_eq!(summary.cant_consult_oracle, 2);
        assert_eq!(summary.retried_swaps, 3);
        assert_eq!(summary.blocked_rate, 25.0);
        assert_eq!(summary.total_system_fee, expand_to_18_decimals(2));
        assert_eq!(summary.volume_x_in, expand_to_18_decimals(10));
        assert_eq!(summary.volume_y_in, expand_to_18_decimals(10));
        assert!((summary.final_price - 4.0).abs() < 1e-9);
        assert!((summary.k_change_percent - 300.0).abs() < 1e-6);
    }

    #[test]
    fn test_compare() {
        let off = RunSummary {
            final_reserve_x: 100.0,
            final_reserve_y: 200.0,
            final_price: 2.0,
            total_system_fee: expand_to_18_decimals(5),
            ..RunSummary::default()
        };
        let on = RunSummary {
            mitigation_enabled: true,
            blocked_by_mitigation: 4,
            blocked_rate: 10.0,
            final_reserve_x: 110.0,
            final_reserve_y: 200.0,
            final_price: 1.8,
            total_system_fee: expand_to_18_decimals(3),
            ..RunSummary::default()
        };

        let comparison = MetricsCalculator::compare(&off, &on);
        assert_eq!(comparison.blocked_swaps, 4);
        assert_eq!(comparison.system_fee_off, 5.0);
        assert_eq!(comparison.system_fee_on, 3.0);
        assert!((comparison.reserve_x_divergence_percent - 10.0).abs() < 1e-9);
        assert_eq!(comparison.reserve_y_divergence_percent, 0.0);
    }

    #[test]
    fn test_price_over_time() {
        let run = run(vec![
            swap(0, Side::X, TransactionStatus::Success, None),
            swap(1, Side::X, TransactionStatus::Success, None),
        ]);
        let points = MetricsCalculator::price_over_time(&run);
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].block_timestamp, 12);
        assert!((points[1].price - 1.01).abs() < 1e-9);
    }

    #[test]
    fn test_diff_distribution() {
        let empty = run(vec![swap(0, Side::X, TransactionStatus::Success, None)]);
        assert!(MetricsCalculator::out_amount_diff_distribution(&empty).is_empty());

        let single = run(vec![swap(0, Side::X, TransactionStatus::Success, Some(5))]);
        let buckets = MetricsCalculator::out_amount_diff_distribution(&single);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].count, 1);

        let spread = run(vec![
            swap(0, Side::X, TransactionStatus::Success, Some(0)),
            swap(1, Side::X, TransactionStatus::Success, Some(5)),
            swap(2, Side::X, TransactionStatus::BlockedByMitigation, Some(100)),
        ]);
        let buckets = MetricsCalculator::out_amount_diff_distribution(&spread);
        assert_eq!(buckets.len(), 10);
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[9].count, 1);
    }
}
