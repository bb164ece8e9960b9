//! compound-table CLI entry point
//!
//! Parses arguments, dispatches to the CLI module and prints errors to
//! stderr with a non-zero exit code. All logic lives in `cli`.

use compound_table::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
