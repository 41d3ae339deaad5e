//! CLI interface for risk-guard
//!
//! Provides subcommands for:
//! - `serve`: Run the risk service with its HTTP adapter
//! - `check`: Evaluate one order against a local account snapshot
//! - `config`: Show the effective configuration

mod check;
mod serve;

pub use check::CheckArgs;
pub use serve::ServeArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "risk-guard")]
#[command(about = "Pre-trade risk validation and emergency stop control")]
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
    /// Run the risk service
    Serve(ServeArgs),
    /// Evaluate an order against a local account snapshot
    Check(CheckArgs),
    /// Show configuration
    Config,
}
