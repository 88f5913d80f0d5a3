use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// pgmigrate: apply and roll back PostgreSQL schema migrations.
#[derive(Parser)]
#[command(name = "pgmigrate", version, about)]
pub struct Cli {
    /// Path to the migrate.yaml configuration file.
    #[arg(long, global = true, default_value = "migrate.yaml")]
    pub config: PathBuf,

    /// Profile name to use; defaults to the config's default_profile.
    #[arg(long, global = true)]
    pub env: Option<String>,

    /// Override the profile's DSN (also overridable via PG_DSN).
    #[arg(long, global = true)]
    pub dsn: Option<String>,

    /// Override the profile's log directory.
    #[arg(long = "log-dir", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Override the profile's migrations directory.
    #[arg(long = "migrations-dir", global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Override the profile's default statement timeout, in seconds.
    #[arg(long = "timeout-sec", global = true)]
    pub timeout_sec: Option<u64>,

    /// Never prompt; fail instead of asking for confirmation.
    #[arg(long = "non-interactive", global = true)]
    pub non_interactive: bool,

    /// Acknowledge a production profile's confirm_prod requirement without prompting.
    #[arg(long = "confirm-prod", global = true)]
    pub confirm_prod: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show applied, pending, and failed migrations.
    Status,
    /// Show the migrations that would be applied.
    Plan {
        #[arg(long = "to")]
        to: Option<String>,
    },
    /// Apply pending migrations.
    Up {
        #[arg(long = "to")]
        to: Option<String>,
    },
    /// Roll back applied migrations down to and including a target.
    Down {
        #[arg(long = "to")]
        to: String,
    },
    /// Run verify.sql for one, the latest, or every migration.
    Verify {
        #[arg(long)]
        latest: bool,
        #[arg(long)]
        id: Option<String>,
    },
    /// Overwrite the stored checksum to match the file on disk.
    Repair {
        #[arg(long = "accept-checksum")]
        accept_checksum: bool,
        id: String,
    },
    /// Reset a stuck or failed migration and re-apply it.
    Retry {
        #[arg(long)]
        id: String,
        #[arg(long = "accept-checksum")]
        accept_checksum: bool,
        #[arg(long)]
        force: bool,
    },
    /// Clear a failed migration's bookkeeping row without running SQL.
    ResetFailed {
        #[arg(long)]
        id: String,
        #[arg(long)]
        delete: bool,
    },
}
