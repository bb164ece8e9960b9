//! Category indexing
//!
//! Builds the category list of a column and writes each record's category
//! index into the numeric projection of non-numeric category columns. The
//! projection holds `index + 0.5`; consumers rely on that offset.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::TableConfig;
use crate::observability::{log_event_with_fields, Event};
use crate::table::{Column, ColumnRegistry, ColumnType, Record, RecordStore};

use super::category::{CategoryList, CategoryOrder};
use super::parse::{NumericToken, ValueParser};

const RANGE_TOLERANCE: f64 = 1e-6;

fn range_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let number = r"[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?";
        Regex::new(&format!(r"^({number})\s*-\s*({number})$")).expect("valid range pattern")
    })
}

/// One parsed `"<low>-<high>"` value
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bin {
    low: f64,
    high: f64,
    decimals: usize,
}

fn parse_bin(value: &str) -> Option<Bin> {
    let captures = range_pattern().captures(value)?;
    let low_text = captures.get(1)?.as_str();
    let high_text = captures.get(2)?.as_str();
    let low: f64 = low_text.parse().ok()?;
    let high: f64 = high_text.parse().ok()?;
    (high > low).then(|| Bin {
        low,
        high,
        decimals: decimals_of(low_text).max(decimals_of(high_text)),
    })
}

fn decimals_of(number: &str) -> usize {
    number
        .split_once('.')
        .map(|(_, fraction)| fraction.chars().take_while(char::is_ascii_digit).count())
        .unwrap_or(0)
}

fn is_integral(value: f64) -> bool {
    (value - value.round()).abs() < RANGE_TOLERANCE * value.abs().max(1.0)
}

fn same(a: f64, b: f64) -> bool {
    (a - b).abs() <= RANGE_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Ordered bucket names of a detected range plus the bucket of every value
struct RangeBins {
    names: Vec<String>,
    members: Vec<(String, usize)>,
}

/// Generated buckets if every value is a bin of one consistent width
///
/// Several spellings of one bin (`"0-10"`, `"0.0-10.0"`) share a bucket; the
/// first one seen names it.
fn detect_range(values: &[&str], log_binning: bool, limit: usize) -> Option<RangeBins> {
    if values.len() < 2 {
        return None;
    }
    let bins: Vec<Bin> = values.iter().map(|v| parse_bin(v)).collect::<Option<_>>()?;
    let decimals = bins.iter().map(|bin| bin.decimals).max().unwrap_or(0);

    let project = |x: f64| if log_binning { x.log10() } else { x };
    if log_binning && bins.iter().any(|bin| bin.low <= 0.0) {
        return None;
    }

    let width = project(bins[0].high) - project(bins[0].low);
    let origin = bins
        .iter()
        .map(|bin| project(bin.low))
        .fold(f64::INFINITY, f64::min);
    let end = bins
        .iter()
        .map(|bin| project(bin.high))
        .fold(f64::NEG_INFINITY, f64::max);

    for bin in &bins {
        if !same(project(bin.high) - project(bin.low), width) {
            return None;
        }
        if !is_integral((project(bin.low) - origin) / width) {
            return None;
        }
    }

    let count = ((end - origin) / width).round() as usize;
    if count == 0 || count > limit {
        return None;
    }

    let members: Vec<(String, usize)> = bins
        .iter()
        .zip(values)
        .map(|(bin, value)| {
            let bucket = ((project(bin.low) - origin) / width).round().max(0.0) as usize;
            (value.to_string(), bucket.min(count - 1))
        })
        .collect();
    let mut existing: HashMap<usize, &str> = HashMap::new();
    for (value, bucket) in &members {
        existing.entry(*bucket).or_insert(value.as_str());
    }

    let unproject = |x: f64| if log_binning { 10f64.powf(x) } else { x };
    let names = (0..count)
        .map(|k| match existing.get(&k) {
            Some(name) => name.to_string(),
            None => {
                let low = unproject(origin + k as f64 * width);
                let high = unproject(origin + (k + 1) as f64 * width);
                format!("{:.*}-{:.*}", decimals, low, decimals, high)
            }
        })
        .collect();
    Some(RangeBins { names, members })
}

/// Per-record sub-values of a column as seen by the indexer
fn category_values<'t>(parser: &ValueParser<'_>, text: &'t str, numeric: bool) -> Vec<&'t str> {
    let mut values = parser.split(text);
    if numeric {
        values.retain(|value| parser.parse_numeric(value) != NumericToken::NotANumber);
    }
    values
}

/// Builds category lists and assigns records to categories
pub struct CategoryIndexer<'a> {
    parser: ValueParser<'a>,
    max_text_categories: usize,
    max_numeric_categories: usize,
}

impl<'a> CategoryIndexer<'a> {
    pub fn new(config: &'a TableConfig) -> Self {
        Self {
            parser: ValueParser::new(&config.value_separator),
            max_text_categories: config.max_text_categories,
            max_numeric_categories: config.max_numeric_categories,
        }
    }

    /// Rebuild the category list of `column`
    ///
    /// Leaves the column without categories once its distinct values exceed
    /// the ceiling for its kind.
    pub fn build_category_list(
        &self,
        store: &RecordStore,
        columns: &mut ColumnRegistry,
        column: usize,
    ) {
        let Some(meta) = columns.get_mut(column) else {
            return;
        };
        meta.categories = None;
        meta.column_type = meta
            .column_type
            .without(ColumnType::CATEGORY | ColumnType::RANGE_CATEGORY);
        if meta.is_descriptor() {
            return;
        }

        let base = meta.column_type.base();
        let limit = if base.is_numeric() {
            self.max_numeric_categories
        } else {
            self.max_text_categories
        };

        let mut distinct: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut has_empty = false;
        let mut has_multiple = false;

        for record in store.iter() {
            let text = record.cell(column).as_text();
            let values = category_values(&self.parser, &text, base.is_numeric());
            if values.is_empty() {
                has_empty = true;
                continue;
            }
            if self.parser.is_multi_category(&values) {
                has_multiple = true;
            }
            for value in values {
                if !seen.contains(value) {
                    seen.insert(value.to_string());
                    distinct.push(value.to_string());
                }
            }
            if distinct.len() > limit {
                log_event_with_fields(
                    Event::CategoryLimitExceeded,
                    &[("column", meta.name()), ("limit", &limit.to_string())],
                );
                return;
            }
        }

        let mut members = Vec::new();
        let (mut entries, order) = if base == ColumnType::STRING {
            let refs: Vec<&str> = distinct.iter().map(String::as_str).collect();
            match detect_range(&refs, meta.properties.log_binning, limit) {
                Some(range) => {
                    log_event_with_fields(
                        Event::RangeCategoryDetected,
                        &[("column", meta.name()), ("bins", &range.names.len().to_string())],
                    );
                    meta.column_type |= ColumnType::RANGE_CATEGORY;
                    members = range.members;
                    (range.names, CategoryOrder::Range)
                }
                None => self.ordered_entries(meta, distinct),
            }
        } else {
            self.ordered_entries(meta, distinct)
        };

        let offset = usize::from(has_empty);
        if has_empty {
            entries.insert(0, String::new());
        }

        let mut list = CategoryList::new(entries, order, has_multiple);
        for (value, bucket) in members {
            list.add_alias(value, bucket + offset);
        }
        meta.column_type |= ColumnType::CATEGORY;
        meta.categories = Some(list);
    }

    fn ordered_entries(&self, meta: &Column, mut distinct: Vec<String>) -> (Vec<String>, CategoryOrder) {
        let base = meta.column_type.base();
        self.sort_values(base, &mut distinct);

        match &meta.properties.custom_order {
            Some(custom) => {
                let listed: HashSet<&str> = custom.iter().map(String::as_str).collect();
                let mut entries = custom.clone();
                entries.extend(distinct.into_iter().filter(|v| !listed.contains(v.as_str())));
                (entries, CategoryOrder::Custom)
            }
            None => (distinct, CategoryOrder::Sorted),
        }
    }

    fn sort_values(&self, base: ColumnType, values: &mut [String]) {
        if base == ColumnType::DOUBLE {
            let key = |v: &str| match self.parser.parse_numeric(v) {
                NumericToken::Value { value, .. } => value,
                _ => f64::NAN,
            };
            values.sort_by(|a, b| key(a).total_cmp(&key(b)).then_with(|| a.cmp(b)));
        } else if base == ColumnType::DATE {
            let key = |v: &str| self.parser.parse_date(v).unwrap_or(f64::NAN);
            values.sort_by(|a, b| key(a).total_cmp(&key(b)).then_with(|| a.cmp(b)));
        } else {
            values.sort_by(|a, b| match a.to_lowercase().cmp(&b.to_lowercase()) {
                Ordering::Equal => a.cmp(b),
                other => other,
            });
        }
    }

    /// Category index of `record` in `column`, if the column has categories
    pub fn category_index(&self, record: &Record, column: usize, meta: &Column) -> Option<usize> {
        let categories = meta.categories.as_ref()?;
        let text = record.cell(column).as_text();
        let values = category_values(&self.parser, &text, meta.column_type.is_numeric());
        match values.first() {
            None => categories.index_of(""),
            Some(first) if !self.parser.is_multi_category(&values) => categories.index_of(first),
            Some(_) => categories.multiple_index(),
        }
    }

    /// Write `index + 0.5` into the projection of plain non-numeric category columns
    pub fn assign_records_to_categories(
        &self,
        store: &mut RecordStore,
        columns: &ColumnRegistry,
        column: usize,
    ) {
        let Some(meta) = columns.get(column) else {
            return;
        };
        if meta.categories.is_none() || meta.column_type.is_numeric() {
            return;
        }

        for record in store.as_mut_slice() {
            let projection = self
                .category_index(record, column, meta)
                .map(|index| index as f64 + 0.5)
                .unwrap_or(f64::NAN);
            record.set_double(column, projection);
        }
    }
}
