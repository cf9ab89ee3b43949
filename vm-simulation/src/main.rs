//! Volatility Mitigation Simulation CLI
//!
//! Command-line interface for running request streams through the AMM with
//! and without the volatility mitigator.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use primitive_types::U256;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vm_simulation::{
    analytics::{
        logger::{print_summary, SimulationLogger},
        report::generate_report,
    },
    config::SimulationConfig,
    generators::{MonteCarloGenerator, RecordedRequests, RequestGenerator},
    simulation::{transaction::Request, Orchestrator},
    utils::fixed_point::contract_18_decimals_to_f64,
};

#[derive(Parser)]
#[command(name = "vm-sim")]
#[command(version = "0.1.0")]
#[command(about = "Volatility Mitigation AMM Simulation Framework", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file (defaults apply otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic stream and run it with mitigation off and on
    Run {
        /// Override the generator seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the simulated duration in hours
        #[arg(long)]
        hours: Option<u64>,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<String>,

        /// Also write the generated request stream
        #[arg(long)]
        save_requests: bool,

        /// Skip HTML report generation
        #[arg(long)]
        no_report: bool,
    },

    /// Replay a recorded request stream
    Replay {
        /// JSON file with requests
        #[arg(short, long)]
        input: PathBuf,

        /// Compare against a run without mitigation instead of a single run
        #[arg(long)]
        compare: bool,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<String>,

        /// Skip HTML report generation
        #[arg(long)]
        no_report: bool,
    },

    /// Largest swap that would pass after a stream has been executed
    Probe {
        /// Token sold by the probed swap
        #[arg(short, long)]
        token_in: String,

        /// JSON file with requests; a generated stream is used otherwise
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Generate report from existing simulation results
    Report {
        /// Input JSON file with simulation results
        #[arg(short, long)]
        input: PathBuf,

        /// Output HTML file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a short preset without writing files
    Quick,

    /// Print configuration info
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            seed,
            hours,
            output,
            save_requests,
            no_report,
        } => {
            let mut config = config;
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(hours) = hours {
                config.generator.duration_hours = hours;
            }
            if let Some(output) = output {
                config.output_dir = output;
            }
            run_simulation(config, save_requests, !no_report)?;
        }

        Commands::Replay {
            input,
            compare,
            output,
            no_report,
        } => {
            let mut config = config;
            if let Some(output) = output {
                config.output_dir = output;
            }
            replay(config, &input, compare, !no_report)?;
        }

        Commands::Probe { token_in, input } => {
            probe(config, &token_in, input.as_deref())?;
        }

        Commands::Report { input, output } => {
            generate_report_from_file(&input, output.as_deref())?;
        }

        Commands::Quick => {
            run_quick_simulation()?;
        }

        Commands::Info => {
            print_info(&config);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SimulationConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {:?}", path);
            SimulationConfig::from_json_file(path)
        }
        None => Ok(SimulationConfig::default()),
    }
}

fn generate_requests(config: &SimulationConfig) -> Result<Vec<Request>> {
    let mut generator = MonteCarloGenerator::new(config).context("Invalid generator configuration")?;
    Ok(generator.generate())
}

fn load_requests(path: &Path) -> Result<Vec<Request>> {
    let requests = SimulationLogger::load_requests(path)?;
    info!("Loaded {} requests from {:?}", requests.len(), path);
    Ok(RecordedRequests { requests }.generate())
}

fn save_outputs(
    results: &vm_simulation::simulation::SimulationResults,
    output_dir: &str,
    generate_html: bool,
) -> Result<()> {
    print_summary(results);

    let logger = SimulationLogger::new(output_dir);
    let json_path = logger.save_results(results)?;
    logger.save_summary(results)?;
    logger.save_audit(results)?;

    if generate_html {
        let report_path = format!("{}/reports/report.html", output_dir);
        generate_report(results, &report_path)?;

        println!();
        println!("📊 Report generated: {}", report_path);
        println!("   Open in browser to view interactive charts");
    }

    println!();
    println!("📁 Results saved to: {}", json_path);
    println!();
    Ok(())
}

fn run_simulation(config: SimulationConfig, save_requests: bool, generate_html: bool) -> Result<()> {
    println!();
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║       Volatility Mitigation Simulation                   ║");
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    info!("Configuration:");
    info!("  Seed:                {}", config.seed);
    info!("  Duration:            {} h", config.generator.duration_hours);
    info!(
        "  Swap rate:           {:.1}/h {} in, {:.1}/h {} in",
        config.generator.swaps_per_hour_x, config.token_x, config.generator.swaps_per_hour_y, config.token_y
    );
    info!(
        "  Oracle window:       {} s / {} observations",
        config.window_size, config.granularity
    );
    info!("  Tolerance threshold: {}", config.price_tolerance_threshold);
    println!();

    let requests = generate_requests(&config)?;
    let output_dir = config.output_dir.clone();
    if save_requests {
        SimulationLogger::new(&output_dir).save_requests(&requests)?;
    }

    let mut orchestrator = Orchestrator::new(config)?;
    let results = orchestrator.run(&requests)?;
    save_outputs(&results, &output_dir, generate_html)
}

fn replay(config: SimulationConfig, input: &Path, compare: bool, generate_html: bool) -> Result<()> {
    let requests = load_requests(input)?;
    let output_dir = config.output_dir.clone();

    let mut orchestrator = Orchestrator::new(config)?;
    let results = if compare {
        orchestrator.run(&requests)?
    } else {
        orchestrator.replay(&requests)?
    };
    save_outputs(&results, &output_dir, generate_html)
}

fn probe(config: SimulationConfig, token_in: &str, input: Option<&Path>) -> Result<()> {
    let requests = match input {
        Some(path) => load_requests(path)?,
        None => generate_requests(&config)?,
    };
    let mitigation_enabled = config.mitigation_enabled;

    let mut orchestrator = Orchestrator::new(config)?;
    orchestrator.run_single(&requests, mitigation_enabled)?;

    let amm = orchestrator.amm();
    let side = amm.pool().side_of(token_in)?;
    let block_timestamp = orchestrator
        .chain()
        .current_block_timestamp()
        .context("No block was produced; the request stream is empty")?;
    let upper_bound = amm.pool().reserve(side).saturating_mul(U256::from(10u64));

    println!();
    println!("Pool after {} requests:", requests.len());
    println!(
        "  Reserves: {:.4} {} / {:.4} {}",
        contract_18_decimals_to_f64(amm.pool().reserve_x()),
        amm.pool().token_x(),
        contract_18_decimals_to_f64(amm.pool().reserve_y()),
        amm.pool().token_y()
    );
    match amm.max_admissible_swap(side, block_timestamp, upper_bound)? {
        Some(max) => println!(
            "  Largest {} swap passing at block {}: {:.6} {}",
            token_in,
            block_timestamp,
            contract_18_decimals_to_f64(max),
            token_in
        ),
        None => println!("  No {} swap would pass at block {}", token_in, block_timestamp),
    }
    println!();
    Ok(())
}

fn generate_report_from_file(input: &Path, output: Option<&Path>) -> Result<()> {
    info!("Loading results from: {:?}", input);

    let input = input.to_str().context("Results path is not valid UTF-8")?;
    let results = SimulationLogger::load_results(input)?;

    let output_path = output
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("{}/reports/report.html", results.config.output_dir));

    generate_report(&results, &output_path)?;

    println!("📊 Report generated: {}", output_path);

    Ok(())
}

fn run_quick_simulation() -> Result<()> {
    println!();
    println!("🚀 Running quick simulation...");
    println!();

    let config = SimulationConfig::quick_test();
    let requests = generate_requests(&config)?;
    let mut orchestrator = Orchestrator::new(config)?;
    let results = orchestrator.run(&requests)?;

    print_summary(&results);

    Ok(())
}

fn print_info(config: &SimulationConfig) {
    println!();
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║       Volatility Mitigation Simulation - Info            ║");
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();
    println!("COMPONENTS:");
    println!("  • Pool                   - Constant-product AMM, 18-decimal reserves");
    println!("  • Sliding window oracle  - TWAP over Q112 cumulative prices");
    println!("  • Volatility mitigator   - Blocks swaps far from the TWAP");
    println!("  • Blockchain             - Groups transactions into blocks");
    println!("  • Generators             - Seeded Monte Carlo or recorded streams");
    println!("  • Analytics              - Summaries, audit logs and HTML reports");
    println!();
    println!("ACTIVE CONFIGURATION:");
    println!(
        "  Pool:        {:.2} {} / {:.2} {}",
        contract_18_decimals_to_f64(config.initial_reserve_x),
        config.token_x,
        contract_18_decimals_to_f64(config.initial_reserve_y),
        config.token_y
    );
    println!(
        "  Oracle:      {} s window, {} observations, {} s period",
        config.window_size,
        config.granularity,
        config.period_size()
    );
    println!("  Threshold:   {}", config.price_tolerance_threshold);
    println!("  Block time:  {} s", config.avg_block_time);
    println!("  Retry:       {} attempts", config.retry.max_attempts);
    println!();
    println!("USAGE:");
    println!("  vm-sim run --hours 72                  # Generate and compare");
    println!("  vm-sim replay -i requests.json         # Replay a recorded stream");
    println!("  vm-sim probe -t X                      # Largest passing swap");
    println!("  vm-sim report -i results.json          # Generate report");
    println!();
}
