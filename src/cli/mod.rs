//! CLI module
//!
//! Provides command-line interface for:
//! - analyze: load a table and print column summaries
//! - sort: load a table and print its rows sorted by one column

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{analyze, load_config, load_table, run, run_command, sort};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{parse_tabular, read_tabular, TabularInput};
