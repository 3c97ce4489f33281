//! CLI command definitions and dispatch.

pub mod config;
pub mod inspect;
pub mod serve;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use obcache_core::config::AppConfig;
use obcache_core::error::AppError;

/// obcache: remote-backed caches with live introspection
#[derive(Debug, Parser)]
#[command(name = "obcache", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build the configured caches and serve the introspection API
    Serve(serve::ServeArgs),
    /// Connect the configured caches and print one snapshot
    Inspect(inspect::InspectArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Serve(args) => serve::execute(args, &self.config).await,
            Commands::Inspect(args) => inspect::execute(args, &self.config, self.format).await,
            Commands::Config(args) => config::execute(args, &self.config, self.format).await,
        }
    }
}

/// Helper: load configuration from file
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load(config_path)
}
