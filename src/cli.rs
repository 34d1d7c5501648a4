use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "waysampler", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "waysampler.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the road network, solve the route cover and cache it
    Plan {
        /// Build from a previously fetched Overpass JSON file instead of
        /// querying the API
        #[arg(long)]
        map_data: Option<PathBuf>,
        /// Also write the walks as a GeoJSON feature collection
        #[arg(long)]
        geojson: Option<PathBuf>,
    },
    /// Run a sampling session with the headless capture backend
    Sample {
        /// Milliseconds between pipeline ticks
        #[arg(long, default_value_t = 16)]
        tick_ms: u64,
    },
    /// Repair and close an interrupted sample log
    Repair {
        /// Sample log to repair
        log: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sample_command() {
        let cli = Cli::parse_from(["waysampler", "-c", "city.toml", "sample", "--tick-ms", "5"]);
        assert_eq!(cli.config, PathBuf::from("city.toml"));
        assert!(matches!(cli.command, Command::Sample { tick_ms: 5 }));
    }
}
