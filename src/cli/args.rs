use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::HOME_ENV;

#[derive(Parser)]
#[command(name = "bizsync")]
#[command(about = "Local-first change synchronization for business data")]
#[command(long_about = "bizsync - local-first change synchronization

Domain writes are captured into a durable outbox in the local SQLite
database. bizsync pushes that outbox to a remote REST backend, one change
at a time, in capture order.

QUICK START:
  bizsync status                    Show outbox counts
  bizsync capture contacts 42 create --data '{\"id\":42,\"name\":\"Alice\"}'
  bizsync run                       Push up to 100 pending changes
  bizsync list --status failed      Inspect failures
  bizsync retry --all               Requeue failed changes

CONFIGURATION:
  ~/.bizsync/config.yaml (or $BIZSYNC_HOME/config.yaml), overridden by
  SYNC_ENABLED, SYNC_REMOTE_URL, SYNC_REMOTE_KEY, SYNC_INTERVAL,
  SYNC_ON_STARTUP and SYNC_AUTO.

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub output: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory holding config.yaml and bizsync.db
    #[arg(long, env = HOME_ENV, global = true, hide_env_values = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show outbox status
    ///
    /// Displays pending, syncing, failed and synced counts and whether sync
    /// is enabled.
    #[command(alias = "s")]
    Status,

    /// Push pending changes now
    ///
    /// Runs one batch on the calling thread. Changes are pushed in capture
    /// order; a failure marks that change failed and moves on.
    ///
    /// # Examples
    ///
    ///   bizsync run               Push up to the configured batch size
    ///   bizsync run -n 10         Push at most 10 changes
    Run {
        /// Maximum changes to push (defaults to the configured batch size)
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// List captured changes
    ///
    /// Oldest first, in capture order.
    #[command(alias = "ls")]
    List {
        /// Filter by status (pending, syncing, synced, failed)
        #[arg(long, short = 's')]
        status: Option<String>,

        /// Maximum changes to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Capture a change into the outbox
    ///
    /// Records a mutation without touching any domain table. Useful for
    /// scripting and for backfilling records created before sync was enabled.
    ///
    /// # Examples
    ///
    ///   bizsync capture contacts 42 create --data '{"id":42,"name":"Alice"}'
    ///   bizsync capture invoices 7 delete
    Capture {
        /// Table (collection) name
        table: String,

        /// Record id
        id: String,

        /// Operation (create, update, delete)
        operation: String,

        /// Record snapshot as a JSON object (required for create/update)
        #[arg(long, short = 'd')]
        data: Option<String>,
    },

    /// Requeue failed changes
    ///
    /// Puts failed changes back to pending. Failed changes are never retried
    /// automatically.
    Retry {
        /// Requeue every failed change
        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// Specific change id to requeue
        #[arg(required_unless_present = "all")]
        id: Option<i64>,

        /// Skip changes that have already failed this many times
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Delete old synced changes
    Purge {
        /// Retention in days (defaults to the configured retention)
        #[arg(long)]
        older_than_days: Option<u32>,
    },

    /// Show or toggle per-table sync
    Tables {
        #[command(subcommand)]
        command: Option<TableCommands>,
    },

    /// Run the background worker in the foreground
    ///
    /// Starts the scheduler and prints a status line after every batch.
    /// Press Enter (or close stdin) to stop.
    Watch,

    /// Show the effective configuration
    ///
    /// The API key is masked.
    Config,
}

/// Per-table subcommands.
#[derive(Subcommand)]
pub enum TableCommands {
    /// Resume pushing changes for a table
    Enable {
        /// Table name
        table: String,
    },

    /// Hold back changes for a table
    ///
    /// Changes are still captured; they stay pending until re-enabled.
    Disable {
        /// Table name
        table: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_status() {
        let cli = Cli::try_parse_from(["bizsync", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status));
        assert_eq!(cli.output, OutputFormat::Pretty);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from(["bizsync", "status", "-o", "json", "-vv"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_run_limit() {
        let cli = Cli::try_parse_from(["bizsync", "run", "-n", "5"]).unwrap();
        if let Commands::Run { limit } = cli.command {
            assert_eq!(limit, Some(5));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_cli_capture() {
        let cli = Cli::try_parse_from([
            "bizsync", "capture", "contacts", "42", "create", "--data", "{}",
        ])
        .unwrap();
        if let Commands::Capture { table, id, operation, data } = cli.command {
            assert_eq!(table, "contacts");
            assert_eq!(id, "42");
            assert_eq!(operation, "create");
            assert_eq!(data.as_deref(), Some("{}"));
        } else {
            panic!("Expected Capture command");
        }
    }

    #[test]
    fn test_cli_retry_requires_target() {
        assert!(Cli::try_parse_from(["bizsync", "retry"]).is_err());
        assert!(Cli::try_parse_from(["bizsync", "retry", "--all", "3"]).is_err());

        let cli = Cli::try_parse_from(["bizsync", "retry", "--all", "--max-retries", "3"]).unwrap();
        if let Commands::Retry { all, id, max_retries } = cli.command {
            assert!(all);
            assert!(id.is_none());
            assert_eq!(max_retries, Some(3));
        } else {
            panic!("Expected Retry command");
        }
    }

    #[test]
    fn test_cli_tables_disable() {
        let cli = Cli::try_parse_from(["bizsync", "tables", "disable", "employees"]).unwrap();
        if let Commands::Tables { command: Some(TableCommands::Disable { table }) } = cli.command {
            assert_eq!(table, "employees");
        } else {
            panic!("Expected Tables disable");
        }
    }

    #[test]
    fn test_output_format_default() {
        assert!(matches!(OutputFormat::default(), OutputFormat::Pretty));
    }
}
