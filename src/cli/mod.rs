//! CLI module for the chain index cache
//!
//! Provides subcommands:
//! - `serve`: run the HTTP service and the periodic refresh loop
//! - `check`: probe the configured store and local cache, then exit

pub mod check;
pub mod serve;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// Chain Index Cache - caching and resilient upstream fetch layer
#[derive(Parser)]
#[command(name = "chain-index-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP service
    Serve,

    /// Probe the shared store and the local cache
    Check,
}

/// Loads `.env`, the configuration and the logging subscriber
fn bootstrap() -> AppConfig {
    dotenvy::dotenv().ok();

    let loaded = AppConfig::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();
    logging::init_logging(&config.logging);

    if let Err(e) = loaded {
        tracing::warn!(error = %e, "Failed to load configuration, using defaults");
    }

    config
}
