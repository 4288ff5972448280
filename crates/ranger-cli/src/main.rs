mod cli;
mod commands;
mod project;
mod signal;

use std::process::ExitCode;

use clap::Parser;
use ranger_observe::{LoggerConfig, logger_init};
use tracing::error;

use crate::cli::{CacheCommand, Cli, Command};

/// Orchestration failure: lock contention, bad config, no binaries.
pub const EXIT_FAILURE: u8 = 1;
/// Interrupted by SIGINT.
pub const EXIT_INTERRUPTED: u8 = 130;
/// Interrupted by SIGTERM.
pub const EXIT_TERMINATED: u8 = 143;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log = LoggerConfig {
        format: cli.log_format,
        level: cli.log_level.clone(),
        ..if cli.verbose {
            LoggerConfig::verbose(cli.log_level.clone())
        } else {
            LoggerConfig::default()
        }
    };
    if let Err(e) = logger_init(&log) {
        eprintln!("error: {e}");
        return ExitCode::from(EXIT_FAILURE);
    }

    let result = match &cli.command {
        Command::Init { force } => commands::init(&cli.project, *force),
        Command::Run(args) => commands::run(&cli.project, args).await,
        Command::Status => commands::status(&cli.project).await,
        Command::Clean => commands::clean(&cli.project).await,
        Command::ListChrome { latest } => commands::list_chrome(*latest).await,
        Command::Cache {
            action: CacheCommand::Clean,
        } => commands::cache_clean(&cli.project).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
