//! listsync CLI
//!
//! Command-line tools for listsync snapshots and replicas.
//!
//! # Commands
//!
//! - `inspect` - Summarize a snapshot or a set of chunk files
//! - `verify` - Check a snapshot for integrity and transport problems
//! - `chunk` - Split a snapshot into transport units
//! - `store` - Show what a replica container holds
//! - `simulate` - Run a sync against an in-process companion replica

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// listsync snapshot and replica tools.
#[derive(Parser)]
#[command(name = "listsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a snapshot or a set of chunk files
    Inspect {
        /// Snapshot file, or every chunk file of one session
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Also list every list with its item count
        #[arg(short, long)]
        lists: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Check a snapshot for integrity and transport problems
    Verify {
        /// Snapshot file, or every chunk file of one session
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Transport size ceiling in bytes
        #[arg(short, long, default_value_t = listsync_protocol::SIZE_CEILING)]
        ceiling: usize,
    },

    /// Split a snapshot into transport units
    Chunk {
        /// Snapshot file
        file: PathBuf,

        /// Directory to write the units to
        #[arg(short, long)]
        out: PathBuf,

        /// Transport size ceiling in bytes
        #[arg(short, long, default_value_t = listsync_protocol::SIZE_CEILING)]
        ceiling: usize,
    },

    /// Show what a replica container holds
    Store {
        /// Root directory of the containers
        #[arg(short, long)]
        root: PathBuf,

        /// Container identifier
        #[arg(short, long)]
        container: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Run a sync against an in-process companion replica
    Simulate {
        /// Active lists on the primary replica
        #[arg(long, default_value_t = 3)]
        lists: usize,

        /// Items added in one batch after the merge rounds
        #[arg(long, default_value_t = 100)]
        items: usize,

        /// Transport size ceiling in bytes
        #[arg(short, long, default_value_t = listsync_protocol::SIZE_CEILING)]
        ceiling: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect {
            files,
            lists,
            format,
        } => commands::inspect::run(&files, lists, format)?,
        Commands::Verify { files, ceiling } => commands::verify::run(&files, ceiling)?,
        Commands::Chunk { file, out, ceiling } => commands::chunk::run(&file, &out, ceiling)?,
        Commands::Store {
            root,
            container,
            format,
        } => commands::store::run(&root, &container, format)?,
        Commands::Simulate {
            lists,
            items,
            ceiling,
            format,
        } => commands::simulate::run(lists, items, ceiling, format)?,
        Commands::Version => {
            println!("listsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("listsync core v{}", listsync_core::VERSION);
        }
    }

    Ok(())
}
