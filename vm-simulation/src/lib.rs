//! Volatility Mitigation Simulation Framework
//!
//! Simulates a constant-product AMM whose swaps are checked against a
//! sliding-window TWAP oracle, and compares request streams executed with
//! and without the volatility mitigator.

pub mod analytics;
pub mod config;
pub mod errors;
pub mod generators;
pub mod simulation;
pub mod utils;

pub use analytics::report::generate_report;
pub use config::SimulationConfig;
pub use errors::SimulationError;
pub use simulation::orchestrator::Orchestrator;
