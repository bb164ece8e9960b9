//! CLI command implementations
//!
//! Commands drive the table through its loader boundary exactly like an
//! embedding application would:
//! 1. initialize_table
//! 2. set_column_name / set_total_data_at
//! 3. finalize_table
//! 4. wait_for_descriptors

use std::path::Path;

use serde_json::{json, Value};

use crate::config::TableConfig;
use crate::observability::Logger;
use crate::table::{CompoundTable, TableError};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_tabular, write_response, write_rows, TabularInput};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Analyze { file, config } => {
            let config = load_config(config.as_deref())?;
            write_response(analyze(&file, config)?)
        }
        Command::Sort {
            file,
            column,
            descending,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let (header, rows) = sort(&file, &column, descending, config)?;
            write_rows(&header, &rows)
        }
    }
}

/// Load the config file, or defaults, and apply its log level
pub fn load_config(path: Option<&Path>) -> CliResult<TableConfig> {
    let config = match path {
        Some(path) => TableConfig::load(path)?,
        None => TableConfig::default(),
    };
    Logger::set_min_severity(config.log_level);
    Ok(config)
}

/// Build a finalized table from tab-separated input
pub fn load_table(input: &TabularInput, config: TableConfig) -> CliResult<CompoundTable> {
    let mut table = CompoundTable::new(config);
    table.initialize_table(input.rows.len(), input.header.len());
    for (column, name) in input.header.iter().enumerate() {
        table.set_column_name(column, name)?;
    }
    for (row, fields) in input.rows.iter().enumerate() {
        for (column, value) in fields.iter().enumerate() {
            table.set_total_data_at(value.as_str(), row, column)?;
        }
    }
    table.finalize_table()?;
    table.wait_for_descriptors()?;
    Ok(table)
}

/// Column summaries of a tab-separated file
pub fn analyze(file: &Path, config: TableConfig) -> CliResult<Value> {
    let input = read_tabular(file)?;
    let table = load_table(&input, config)?;

    Ok(json!({
        "rows": table.total_row_count(),
        "columns": table.column_summaries(),
    }))
}

/// Rows of a tab-separated file sorted by `column`
pub fn sort(
    file: &Path,
    column: &str,
    descending: bool,
    config: TableConfig,
) -> CliResult<(Vec<String>, Vec<Vec<String>>)> {
    let input = read_tabular(file)?;
    let mut table = load_table(&input, config)?;

    let index = table
        .find_column(column)
        .ok_or_else(|| CliError::from(TableError::ColumnNotFound(column.to_string())))?;
    table.sort(index, descending, false)?;

    let rows = (0..table.row_count())
        .map(|row| {
            (0..table.column_count())
                .map(|column| table.get_value(row, column))
                .collect()
        })
        .collect();
    Ok((input.header, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn tsv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_analyze_reports_types() {
        let file = tsv("Name\tIC50\nA\t1\nB\t2\nC\t\nD\t4\n");
        let summary = analyze(file.path(), TableConfig::default()).unwrap();

        assert_eq!(summary["rows"], 4);
        let ic50 = &summary["columns"][1];
        assert_eq!(ic50["name"], "IC50");
        assert_eq!(ic50["complete"], false);
        assert_eq!(ic50["min"], 1.0);
        assert_eq!(ic50["max"], 4.0);
    }

    #[test]
    fn test_sort_descending_nan_last() {
        let file = tsv("Name\tIC50\nA\t1\nB\t\nC\t3\n");
        let (header, rows) = sort(file.path(), "IC50", true, TableConfig::default()).unwrap();

        assert_eq!(header, vec!["Name", "IC50"]);
        let names: Vec<&str> = rows.iter().map(|row| row[0].as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_sort_unknown_column() {
        let file = tsv("Name\nA\n");
        let err = sort(file.path(), "missing", false, TableConfig::default()).unwrap_err();
        assert!(err.message().contains("CT_COLUMN_NOT_FOUND"));
    }

    #[test]
    fn test_config_file_applied() {
        let file = tsv("Name\nA\n");
        let mut config_file = NamedTempFile::new().unwrap();
        config_file
            .write_all(br#"{"descriptor_workers": 1, "log_level": "warn"}"#)
            .unwrap();

        let config = load_config(Some(config_file.path())).unwrap();
        assert_eq!(config.descriptor_workers, Some(1));
        assert!(analyze(file.path(), config).is_ok());
        Logger::set_min_severity(crate::observability::Severity::Info);
    }
}
