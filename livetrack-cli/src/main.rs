//! LiveTrack CLI - command-line interface
//!
//! Runs either side of a tracked delivery: `drive` and `simulate` publish
//! positions, `watch` follows them.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use livetrack::config::{config_file_path, ConfigFile};
use livetrack::logging::{init_logging, LoggingGuard};

use commands::{config, drive, simulate, watch};
use error::CliError;

#[derive(Parser)]
#[command(name = "livetrack")]
#[command(version, about = "Live delivery position tracking", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.livetrack/config.ini
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mirror log output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish positions read from stdin, one "lat,lng[,accuracy_m]" per line
    Drive(drive::DriveArgs),

    /// Walk a list of waypoints as a demo courier
    Simulate(simulate::SimulateArgs),

    /// Follow a delivery and print position, trail, status and ETA updates
    Watch(watch::WatchArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.unwrap_or_else(config_file_path);

    if let Commands::Config { command } = cli.command {
        return config::run(command, &config_path);
    }

    let config = ConfigFile::load_from(&config_path)?;
    let _logging = start_logging(&config, cli.verbose)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let cancel = commands::common::shutdown_token()?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Drive(args) => drive::run(args, &config, cancel).await,
            Commands::Simulate(args) => simulate::run(args, &config, cancel).await,
            Commands::Watch(args) => watch::run(args, &config, cancel).await,
            Commands::Config { .. } => Ok(()),
        }
    })
}

fn start_logging(config: &ConfigFile, verbose: bool) -> Result<LoggingGuard, CliError> {
    init_logging(&config.logging.directory, &config.logging.file, verbose)
        .map_err(|e| CliError::LoggingInit(e.to_string()))
}
