//! Text I/O for the CLI
//!
//! Input is tab-separated UTF-8: first line column names, one record per
//! following line, no quoting. Output is JSON or tab-separated text on stdout.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Parsed tab-separated input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularInput {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Read a tab-separated file
///
/// Blank lines are skipped. Short rows are padded with empty cells.
pub fn read_tabular(path: &Path) -> CliResult<TabularInput> {
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::io_error(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_tabular(&content)
}

/// Parse tab-separated text
pub fn parse_tabular(content: &str) -> CliResult<TabularInput> {
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());
    let header: Vec<String> = lines
        .next()
        .ok_or_else(|| CliError::input_error("Empty input: no header line"))?
        .split('\t')
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (index, line) in lines.enumerate() {
        let mut fields: Vec<String> = line.split('\t').map(str::to_string).collect();
        if fields.len() > header.len() {
            return Err(CliError::input_error(format!(
                "Row {} has {} fields, header has {}",
                index + 1,
                fields.len(),
                header.len()
            )));
        }
        fields.resize(header.len(), String::new());
        rows.push(fields);
    }

    Ok(TabularInput { header, rows })
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

/// Write rows as tab-separated lines to stdout
pub fn write_rows(header: &[String], rows: &[Vec<String>]) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", header.join("\t"))?;
    for row in rows {
        writeln!(stdout, "{}", row.join("\t"))?;
    }
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pads_short_rows() {
        let input = parse_tabular("a\tb\n1\t2\n3\n\n").unwrap();
        assert_eq!(input.header, vec!["a", "b"]);
        assert_eq!(input.rows, vec![vec!["1", "2"], vec!["3", ""]]);
    }

    #[test]
    fn test_parse_rejects_long_rows() {
        let err = parse_tabular("a\n1\t2\n").unwrap_err();
        assert_eq!(err.code_str(), "CT_CLI_INPUT_ERROR");
    }

    #[test]
    fn test_parse_requires_header() {
        assert!(parse_tabular("\n\n").is_err());
    }
}
