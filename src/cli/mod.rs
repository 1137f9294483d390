//! CLI interface for paper-desk
//!
//! Provides subcommands for:
//! - `run`: Replay market events through the paper desk
//! - `config`: Show the effective configuration

mod run;

pub use run::{OutputFormat, RunArgs};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "paper-desk")]
#[command(about = "Simulated execution and risk core for automated trading")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a market event file through the orchestrator
    Run(RunArgs),
    /// Show the effective configuration
    Config,
}
