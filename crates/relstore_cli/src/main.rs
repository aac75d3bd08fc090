//! relstore CLI
//!
//! Command-line tools for relstore stores.
//!
//! # Commands
//!
//! - `inspect` - List channels with record, row and tombstone counts
//! - `dump` - Print the raw rows of one record
//! - `check-schema` - Validate a JSON schema definition
//! - `purge` - Remove every record of a channel on a worker thread

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// relstore command-line tools.
#[derive(Parser)]
#[command(name = "relstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database file
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
    /// List channels with record, row and tombstone counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the raw rows of one record
    Dump {
        /// Channel holding the record
        #[arg(short, long)]
        channel: String,

        /// Record id
        #[arg(short, long)]
        id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate a JSON schema definition file
    CheckSchema {
        /// Schema definition file
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove every record of a channel
    Purge {
        /// Channel to purge
        #[arg(short, long)]
        channel: String,

        /// Request cancellation after this many milliseconds
        #[arg(long)]
        cancel_after_ms: Option<u64>,
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
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Dump {
            channel,
            id,
            format,
        } => {
            let path = cli.path.ok_or("Database path required for dump")?;
            commands::dump::run(&path, &channel, &id, &format)?;
        }
        Commands::CheckSchema { file, format } => {
            commands::check_schema::run(&file, &format)?;
        }
        Commands::Purge {
            channel,
            cancel_after_ms,
        } => {
            let path = cli.path.ok_or("Database path required for purge")?;
            commands::purge::run(&path, &channel, cancel_after_ms)?;
        }
        Commands::Version => {
            println!("relstore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("relstore Core v{}", relstore_core::VERSION);
        }
    }

    Ok(())
}
