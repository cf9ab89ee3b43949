//! Structured logging for simulation results

use crate::simulation::orchestrator::{RunResult, SimulationResults};
use crate::simulation::pool_state::Pool;
use crate::simulation::transaction::{Request, TransactionRecord};
use crate::utils::fixed_point::contract_18_decimals_to_f64;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Handles logging of simulation results to files
pub struct SimulationLogger {
    output_dir: String,
}

impl SimulationLogger {
    /// Create a new logger with the specified output directory
    pub fn new(output_dir: &str) -> Self {
        Self {
            output_dir: output_dir.to_string(),
        }
    }

    /// Ensure output directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(format!("{}/logs", self.output_dir))
            .context("Failed to create logs directory")?;
        fs::create_dir_all(format!("{}/reports", self.output_dir))
            .context("Failed to create reports directory")?;
        Ok(())
    }

    fn write_file(&self, filename: &str, contents: &str) -> Result<()> {
        let mut file = File::create(filename)
            .with_context(|| format!("Failed to create {}", filename))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write {}", filename))
    }

    /// Save simulation results to JSON file
    pub fn save_results(&self, results: &SimulationResults) -> Result<String> {
        self.ensure_dirs()?;

        let timestamp = results.generated_at.format("%Y%m%d_%H%M%S");
        let filename = format!("{}/logs/simulation_{}.json", self.output_dir, timestamp);

        let json = serde_json::to_string_pretty(results)
            .context("Failed to serialize results")?;
        self.write_file(&filename, &json)?;

        info!("Results saved to: {}", filename);
        Ok(filename)
    }

    /// Load results from a JSON file
    pub fn load_results(path: &str) -> Result<SimulationResults> {
        let contents = fs::read_to_string(path)
            .context("Failed to read results file")?;

        serde_json::from_str(&contents)
            .context("Failed to parse results file")
    }

    /// Save one flat audit row per executed transaction, one file per run
    pub fn save_audit(&self, results: &SimulationResults) -> Result<Vec<String>> {
        self.ensure_dirs()?;

        let timestamp = results.generated_at.format("%Y%m%d_%H%M%S");
        let mut filenames = Vec::with_capacity(results.runs.len());
        for run in &results.runs {
            let records = audit_records(results, run)?;
            let filename = format!(
                "{}/logs/transactions_{}_{}.json",
                self.output_dir, run.scenario, timestamp
            );
            let json = serde_json::to_string_pretty(&records)
                .context("Failed to serialize audit records")?;
            self.write_file(&filename, &json)?;

            info!("Audit log saved to: {}", filename);
            filenames.push(filename);
        }
        Ok(filenames)
    }

    /// Save the request stream so it can be replayed later
    pub fn save_requests(&self, requests: &[Request]) -> Result<String> {
        self.ensure_dirs()?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}/logs/requests_{}.json", self.output_dir, timestamp);
        let json = serde_json::to_string_pretty(requests)
            .context("Failed to serialize requests")?;
        self.write_file(&filename, &json)?;

        info!("Requests saved to: {}", filename);
        Ok(filename)
    }

    /// Load a request stream (e.g. recorded historical transactions)
    pub fn load_requests(path: impl AsRef<Path>) -> Result<Vec<Request>> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read requests file {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse requests file {}", path.display()))
    }

    /// Save a summary text file
    pub fn save_summary(&self, results: &SimulationResults) -> Result<String> {
        self.ensure_dirs()?;

        let timestamp = results.generated_at.format("%Y%m%d_%H%M%S");
        let filename = format!("{}/logs/summary_{}.txt", self.output_dir, timestamp);
        self.write_file(&filename, &format_summary(results))?;

        info!("Summary saved to: {}", filename);
        Ok(filename)
    }
}

/// Audit rows of one run with token symbols resolved from the configuration
pub fn audit_records(results: &SimulationResults, run: &RunResult) -> Result<Vec<TransactionRecord>> {
    let config = &results.config;
    let pool = Pool::new(
        &config.token_x,
        &config.token_y,
        run.initial_pool.reserve_x,
        run.initial_pool.reserve_y,
        run.mitigation_enabled,
    )
    .context("Invalid token pair in results")?;

    Ok(run
        .transactions
        .iter()
        .map(|e| e.transaction.to_record(&pool))
        .collect())
}

fn format_run(run: &RunResult, token_x: &str, token_y: &str) -> String {
    let s = &run.summary;
    format!(
        r#"
║  {:<64}║
║  ──────────────────────────────────                              ║
║  Transactions:          {:>12} (swaps {}, mints {}, burns {})
║  Success:               {:>12}                                   ║
║  Blocked by mitigation: {:>12} ({:.2}% of swaps)
║  Not enough reserves:   {:>12}                                   ║
║  Exceeded max slippage: {:>12}                                   ║
║  K error:               {:>12}                                   ║
║  Clipped burns:         {:>12}                                   ║
║  Oracle unavailable:    {:>12}                                   ║
║  Retried swaps:         {:>12}                                   ║
║                                                                  ║
║  Volume in:             {:>16.4} {}
║  Volume in:             {:>16.4} {}
║  System fee:            {:>16.4} {}
║  Final reserves:        {:>16.4} {} / {:.4} {}
║  Price {} in {}:         {:>16.6} -> {:.6}
║  k change:              {:>15.4}%
║  Fingerprint:           {}
"#,
        run.scenario.to_uppercase(),
        s.total_transactions,
        s.swaps,
        s.mints,
        s.burns,
        s.success,
        s.blocked_by_mitigation,
        s.blocked_rate,
        s.not_enough_reserves,
        s.exceeded_max_slippage,
        s.k_error,
        s.clipped,
        s.cant_consult_oracle,
        s.retried_swaps,
        contract_18_decimals_to_f64(s.volume_x_in),
        token_x,
        contract_18_decimals_to_f64(s.volume_y_in),
        token_y,
        contract_18_decimals_to_f64(s.total_system_fee),
        token_y,
        s.final_reserve_x,
        token_x,
        s.final_reserve_y,
        token_y,
        token_x,
        token_y,
        s.initial_price,
        s.final_price,
        s.k_change_percent,
        &run.fingerprint[..run.fingerprint.len().min(16)],
    )
}

/// Format results as a text summary
pub fn format_summary(results: &SimulationResults) -> String {
    let config = &results.config;
    let mut out = format!(
        r#"
╔══════════════════════════════════════════════════════════════════╗
║            VOLATILITY MITIGATION SIMULATION RESULTS              ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  CONFIGURATION                                                   ║
║  ─────────────                                                   ║
║  Initial reserves:      {:>12.2} {} / {:.2} {}
║  Oracle window:         {:>12} s ({} observations)
║  Tolerance threshold:   {:>12}                                   ║
║  Block time:            {:>12} s                                 ║
║  Seed:                  {:>12}                                   ║
"#,
        contract_18_decimals_to_f64(config.initial_reserve_x),
        config.token_x,
        contract_18_decimals_to_f64(config.initial_reserve_y),
        config.token_y,
        config.window_size,
        config.granularity,
        config.price_tolerance_threshold,
        config.avg_block_time,
        config.seed,
    );

    for run in &results.runs {
        out.push_str("╠══════════════════════════════════════════════════════════════════╣");
        out.push_str(&format_run(run, &config.token_x, &config.token_y));
    }

    if let Some(c) = &results.comparison {
        out.push_str(&format!(
            r#"╠══════════════════════════════════════════════════════════════════╣

║  MITIGATION ON vs OFF                                            ║
║  ────────────────────                                            ║
║  ★ Swaps blocked:       {:>12} ({:.2}%)
║  ★ System fee:          {:>16.4} -> {:.4} {}
║  ★ Final price:         {:>16.6} -> {:.6}
║  ★ Reserve divergence:  {:>15.4}% {} / {:.4}% {}
"#,
            c.blocked_swaps,
            c.blocked_rate,
            c.system_fee_off,
            c.system_fee_on,
            config.token_y,
            c.final_price_off,
            c.final_price_on,
            c.reserve_x_divergence_percent,
            config.token_x,
            c.reserve_y_divergence_percent,
            config.token_y,
        ));
    }

    out.push_str(&format!(
        "╚══════════════════════════════════════════════════════════════════╝\n\nGenerated: {}\n",
        results.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    ));
    out
}

/// Print summary to terminal
pub fn print_summary(results: &SimulationResults) {
    println!("{}", format_summary(results));
}
