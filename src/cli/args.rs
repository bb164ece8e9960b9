//! CLI argument definitions using clap
//!
//! Commands:
//! - compound-table analyze <file> [--config <path>]
//! - compound-table sort <file> --column <name> [--descending] [--config <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Compound table engine: analyse and sort tab-separated tables
#[derive(Parser, Debug)]
#[command(name = "compound-table")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a table and print its column summaries as JSON
    Analyze {
        /// Tab-separated input; the first line holds the column names
        file: PathBuf,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Load a table and print its rows sorted by one column
    Sort {
        /// Tab-separated input; the first line holds the column names
        file: PathBuf,

        /// Column name or alias to sort by
        #[arg(long)]
        column: String,

        /// Sort in descending order
        #[arg(long)]
        descending: bool,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
