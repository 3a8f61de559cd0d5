//! EntiWork CLI
//!
//! Command-line tools for file-backed entity stores.
//!
//! # Commands
//!
//! - `inspect` - List stored identities with their versions
//! - `show` - Print one decoded entity record
//! - `verify` - Decode every record and report failures
//! - `version` - Print tool and format versions

mod commands;
mod json;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// EntiWork entity store tools.
#[derive(Parser)]
#[command(name = "entiwork")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
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
    /// List stored identities with their versions
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print one decoded entity record as JSON
    Show {
        /// Identity of the entity
        identity: String,
    },

    /// Decode every stored record and report failures
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Show { identity } => {
            let path = cli.path.ok_or("Store path required for show")?;
            commands::show::run(&path, &identity)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("EntiWork CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Record format v{}", entiwork_codec::RECORD_FORMAT_VERSION);
            println!(
                "Snapshot format v{}",
                entiwork_storage::SNAPSHOT_FORMAT_VERSION
            );
        }
    }

    Ok(())
}
