use std::{net::IpAddr, path::PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use hearth_core::CheckpointMode;

/// Operator tool for the Hearth database
///
/// Applies versioned SQL migrations, reports schema history, runs SQLite
/// housekeeping, and serves a liveness endpoint. Settings not given on the
/// command line are read from `DB_*` environment variables (and a `.env`
/// file in the working directory, if present).
#[derive(Parser)]
#[command(version, about, name = "hearth")]
pub struct Args {
    /// Path to the SQLite database file. Defaults to $DB_PATH or
    /// data/app.sqlite3
    #[arg(long, global = true)]
    pub database_file: Option<PathBuf>,

    /// Directory holding NNN_name.sql migrations. Defaults to
    /// $DB_MIGRATIONS_DIR or ./migrations
    #[arg(long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Open the database read-only; migrations are never applied
    #[arg(long, global = true)]
    pub read_only: bool,

    /// Disable colored output and use plain text
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending migrations
    Migrate,
    /// Show applied and pending migrations without changing anything
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that the database answers a trivial query
    Health,
    /// Fold the write-ahead log back into the database file
    Checkpoint {
        #[arg(long, value_enum, default_value_t = CheckpointArg::Full)]
        mode: CheckpointArg,
    },
    /// Rebuild the database file to reclaim free pages
    Vacuum,
    /// Serve GET /health over HTTP until interrupted
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 3000)]
        port: u16,
        /// Leave Ctrl-C and SIGTERM to the default handlers
        #[arg(long)]
        no_signal_handlers: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CheckpointArg {
    Passive,
    Full,
    Restart,
    Truncate,
}

impl From<CheckpointArg> for CheckpointMode {
    fn from(val: CheckpointArg) -> Self {
        match val {
            CheckpointArg::Passive => CheckpointMode::Passive,
            CheckpointArg::Full => CheckpointMode::Full,
            CheckpointArg::Restart => CheckpointMode::Restart,
            CheckpointArg::Truncate => CheckpointMode::Truncate,
        }
    }
}
