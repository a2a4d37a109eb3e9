//! PageSync CLI
//!
//! Maintenance tools for a PageSync store.
//!
//! # Commands
//!
//! - `status` - Entity counts, conflicts, WAL backlog and store health
//! - `log` - Query the sync log
//! - `conflicts` - List conflicted entities and their variants
//! - `wal` - List incomplete WAL rows left by an interrupted run
//! - `gc` - Purge expired soft-deleted entities and orphaned content

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PageSync store maintenance tools.
#[derive(Parser)]
#[command(name = "pagesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the sync database file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show entity counts, conflicts, WAL backlog and store health
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Query the sync log, newest first
    Log {
        /// Only entries for this entity id
        #[arg(short, long)]
        entity: Option<i64>,

        /// Only entries of this kind (push, pull, merge, conflict, delete, error)
        #[arg(short, long)]
        operation: Option<String>,

        /// Only entries from the last N hours
        #[arg(long)]
        since_hours: Option<u64>,

        /// Maximum number of entries
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Entries to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List conflicted entities
    Conflicts {
        /// Print both variants in conflict-file layout
        #[arg(short, long)]
        show: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List incomplete WAL rows
    Wal {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Purge expired soft-deleted entities and orphaned content
    Gc {
        /// Days a soft-deleted entity is kept
        #[arg(short, long, default_value = "30")]
        retention_days: u64,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Status { format } => {
            let path = cli.path.ok_or("Store path required for status")?;
            commands::status::run(&path, &format)?;
        }
        Commands::Log {
            entity,
            operation,
            since_hours,
            limit,
            offset,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for log")?;
            let filter = commands::log::LogFilter {
                entity,
                operation,
                since_hours,
                limit,
                offset,
            };
            commands::log::run(&path, &filter, &format)?;
        }
        Commands::Conflicts { show, format } => {
            let path = cli.path.ok_or("Store path required for conflicts")?;
            commands::conflicts::run(&path, show, &format)?;
        }
        Commands::Wal { format } => {
            let path = cli.path.ok_or("Store path required for wal")?;
            commands::wal::run(&path, &format)?;
        }
        Commands::Gc { retention_days } => {
            let path = cli.path.ok_or("Store path required for gc")?;
            commands::gc::run(&path, retention_days)?;
        }
        Commands::Version => {
            println!("PageSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
