use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use bizsync::cli::args::{Cli, Commands};
use bizsync::cli::commands;
use bizsync::config::{Config, Paths};
use bizsync::error::SyncError;
use bizsync::sync::SyncEngine;

/// Environment variable holding a `tracing` filter, e.g. `bizsync=debug`.
const LOG_ENV: &str = "BIZSYNC_LOG";

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = match cli.home {
        Some(root) => Paths::with_root(root),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    let format = cli.output;

    if matches!(cli.command, Commands::Config) {
        println!("{}", commands::config(&config.sync, format)?);
        return Ok(());
    }

    let engine = SyncEngine::from_config(&config, &paths)?;

    let output = match cli.command {
        Commands::Status => commands::status(&engine, format)?,
        Commands::Run { limit } => commands::run(&engine, limit, format)?,
        Commands::List { status, limit } => {
            commands::list(&engine, status.as_deref(), limit, format)?
        }
        Commands::Capture { table, id, operation, data } => {
            commands::capture(&engine, &table, &id, &operation, data.as_deref(), format)?
        }
        Commands::Retry { all, id, max_retries } => {
            commands::retry(&engine, all, id, max_retries, format)?
        }
        Commands::Purge { older_than_days } => commands::purge(&engine, older_than_days, format)?,
        Commands::Tables { command } => commands::tables(&engine, command, format)?,
        Commands::Watch => commands::watch(&engine, std::io::stdin().lock(), format)?,
        Commands::Config => commands::config(engine.config(), format)?,
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
