//! Command-line front end of the street-level sampler.

mod cli;
mod commands;
mod config;
mod headless;
mod overpass;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Plan { map_data, geojson } => {
            let config = AppConfig::load(&cli.config)?;
            commands::plan(&config, map_data.as_deref(), geojson.as_deref()).await
        }
        Command::Sample { tick_ms } => {
            let config = AppConfig::load(&cli.config)?;
            commands::sample(&config, Duration::from_millis(tick_ms.max(1))).await
        }
        Command::Repair { log } => commands::repair_log(&log),
    }
}
