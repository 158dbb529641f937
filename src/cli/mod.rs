//! CLI module for the PMP Experiment Engine
//!
//! Provides subcommands for exercising the engine offline:
//! - `simulate`: seeded end-to-end two-arm experiment
//! - `sample-size`: per-arm sample size for a target effect

pub mod sample_size;
pub mod simulate;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging::init_logging;

/// PMP Experiment Engine - statistical A/B testing
#[derive(Parser)]
#[command(name = "pmp-experiment-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a seeded two-arm experiment and print its summary
    Simulate(simulate::SimulateArgs),

    /// Print the required sample size per arm
    SampleSize(sample_size::SampleSizeArgs),
}

/// Load `.env`, the layered configuration and the log subscriber
fn bootstrap() -> AppConfig {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    init_logging(&config.logging);

    config
}
