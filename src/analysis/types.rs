//! Column type analysis
//!
//! Classification priority: numeric, then date, then opaque string. Runs
//! incrementally when rows are appended: only the new rows are scanned and
//! completeness or uniqueness found earlier can only be downgraded.

use crate::config::TableConfig;
use crate::table::{ColumnRegistry, ColumnType, RecordStore, TypeEvidence};

use super::parse::{NumericToken, ValueParser};

/// Classifies column data and maintains the numeric projection
pub struct TypeAnalyzer<'a> {
    parser: ValueParser<'a>,
}

impl<'a> TypeAnalyzer<'a> {
    pub fn new(config: &'a TableConfig) -> Self {
        Self {
            parser: ValueParser::new(&config.value_separator),
        }
    }

    /// Analyze `column` from `first_row` on
    ///
    /// `first_row == 0` re-derives everything from scratch.
    pub fn analyze(
        &self,
        store: &mut RecordStore,
        columns: &mut ColumnRegistry,
        column: usize,
        first_row: usize,
    ) {
        let parent = columns.parent_of(column);
        let Some(meta) = columns.get_mut(column) else {
            return;
        };

        if let Some(binding) = &meta.descriptor {
            meta.column_type = ColumnType::STRING;
            meta.categories = None;
            meta.complete = !binding.incomplete;
            meta.complete_as_child = meta.complete;
            meta.unique = false;
            return;
        }

        let records = store.as_mut_slice();
        let first_row = first_row.min(records.len());
        let previous_base = if first_row == 0 {
            meta.evidence = TypeEvidence::fresh();
            None
        } else {
            Some(meta.column_type.base())
        };

        // Pass 1: collect classification and uniqueness evidence of new rows.
        let evidence = &mut meta.evidence;
        for record in &records[first_row..] {
            let text = record.cell(column).as_text();
            let values = self.parser.split(&text);
            evidence.scanned_rows += 1;

            for value in &values {
                match self.parser.parse_numeric(value) {
                    NumericToken::Value { .. } => evidence.non_null_values += 1,
                    NumericToken::NotANumber => {}
                    NumericToken::Invalid => {
                        evidence.all_numeric = false;
                        evidence.non_null_values += 1;
                    }
                }
                if evidence.all_date && self.parser.parse_date(value).is_none() {
                    evidence.all_date = false;
                }
            }

            if values.len() == 1 {
                let duplicate = evidence
                    .seen_values
                    .as_mut()
                    .map(|seen| !seen.insert(values[0].to_string()))
                    .unwrap_or(false);
                if duplicate {
                    evidence.seen_values = None;
                }
            }
        }

        let base = if evidence.non_null_values == 0 {
            ColumnType::STRING
        } else if evidence.all_numeric {
            ColumnType::DOUBLE
        } else if evidence.all_date {
            ColumnType::DATE
        } else {
            ColumnType::STRING
        };
        meta.unique = evidence.seen_values.is_some();

        // A type change invalidates the projection of every row.
        let start = match previous_base {
            Some(previous) if previous == base => first_row,
            _ => 0,
        };
        if start == 0 {
            meta.complete = true;
            meta.complete_as_child = true;
            meta.min = f64::NAN;
            meta.max = f64::NAN;
        }
        meta.column_type = base;
        meta.categories = None;

        // Pass 2: projection, completeness and range.
        let summary = meta.properties.summary_mode;
        for record in &mut records[start..] {
            let text = record.cell(column).as_text();
            let values = self.parser.split(&text);

            let projection = if base == ColumnType::DOUBLE {
                self.parser
                    .numeric_values(&values)
                    .map(|numbers| summary.summarize(&numbers))
                    .unwrap_or(f64::NAN)
            } else if base == ColumnType::DATE {
                self.parser
                    .date_values(&values)
                    .map(|days| summary.summarize(&days))
                    .unwrap_or(f64::NAN)
            } else {
                f64::NAN
            };

            let is_null = if base.is_numeric() {
                projection.is_nan()
            } else {
                values.is_empty()
            };

            if is_null {
                meta.complete = false;
                let parent_is_null = parent.map(|p| record.cell(p).is_empty()).unwrap_or(false);
                if !parent_is_null {
                    meta.complete_as_child = false;
                }
            } else if base.is_numeric() {
                meta.min = if meta.min.is_nan() { projection } else { meta.min.min(projection) };
                meta.max = if meta.max.is_nan() { projection } else { meta.max.max(projection) };
            }

            record.set_double(column, projection);
        }
    }
}
