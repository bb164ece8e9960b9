//! Cell value parsing
//!
//! Cells may hold several values separated by the configured separator or a
//! newline. Numeric values may carry an inequality modifier (`<`, `>`, `<=`,
//! `>=`, `~`). A small set of tokens denotes "not a number".

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

/// Tokens that stand for a missing numeric value
pub const NAN_TOKENS: [&str; 7] = ["NaN", "nan", "NAN", "?", "n.d.", "n/a", "N/A"];

/// Inequality modifiers, longest first
pub const MODIFIERS: [&str; 5] = ["<=", ">=", "<", ">", "~"];

/// Date formats accepted, in order: `12-Jan-2020`, `Jan 12, 2020`
pub const DATE_FORMATS: [&str; 2] = ["%d-%b-%Y", "%b %d, %Y"];

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("valid number pattern")
    })
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch")
}

/// Classification of one sub-value as a number
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericToken<'a> {
    /// A finite number, with its modifier if any
    Value { modifier: Option<&'a str>, value: f64 },
    /// One of [`NAN_TOKENS`]
    NotANumber,
    /// Not numeric
    Invalid,
}

/// Splits and parses cell text
#[derive(Debug, Clone, Copy)]
pub struct ValueParser<'a> {
    separator: &'a str,
}

impl<'a> ValueParser<'a> {
    pub fn new(separator: &'a str) -> Self {
        Self { separator }
    }

    /// Non-empty trimmed sub-values of `text`
    pub fn split<'t>(&self, text: &'t str) -> Vec<&'t str> {
        text.split('\n')
            .flat_map(|line| line.split(self.separator))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .collect()
    }

    /// True if `text` holds more than one distinct sub-value
    pub fn is_multi_category(&self, values: &[&str]) -> bool {
        values.windows(2).any(|pair| pair[0] != pair[1])
    }

    /// Parse one sub-value as a number
    pub fn parse_numeric<'t>(&self, token: &'t str) -> NumericToken<'t> {
        if NAN_TOKENS.contains(&token) {
            return NumericToken::NotANumber;
        }

        let (modifier, rest) = MODIFIERS
            .iter()
            .find_map(|m| token.strip_prefix(m).map(|rest| (Some(&token[..m.len()]), rest)))
            .unwrap_or((None, token));
        let rest = rest.trim_start();

        if !number_pattern().is_match(rest) {
            return NumericToken::Invalid;
        }
        match rest.parse::<f64>() {
            Ok(value) if value.is_finite() => NumericToken::Value { modifier, value },
            _ => NumericToken::Invalid,
        }
    }

    /// Parse one sub-value as a date; days since 1970-01-01
    pub fn parse_date(&self, token: &str) -> Option<f64> {
        DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(token, format).ok())
            .map(|date| (date - epoch()).num_days() as f64)
    }

    /// Numeric sub-values of `values`, skipping NaN tokens
    ///
    /// `None` if any sub-value is neither a number nor a NaN token.
    pub fn numeric_values(&self, values: &[&str]) -> Option<Vec<f64>> {
        let mut numbers = Vec::with_capacity(values.len());
        for value in values {
            match self.parse_numeric(value) {
                NumericToken::Value { value, .. } => numbers.push(value),
                NumericToken::NotANumber => {}
                NumericToken::Invalid => return None,
            }
        }
        Some(numbers)
    }

    /// Date sub-values of `values` in days
    ///
    /// `None` if any sub-value is not a date.
    pub fn date_values(&self, values: &[&str]) -> Option<Vec<f64>> {
        values.iter().map(|value| self.parse_date(value)).collect()
    }
}

/// Format days since 1970-01-01 in the primary date format
pub fn format_date(days: f64) -> Option<String> {
    if !days.is_finite() {
        return None;
    }
    let date = epoch().checked_add_signed(chrono::Duration::days(days.round() as i64))?;
    Some(date.format(DATE_FORMATS[0]).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ValueParser<'static> {
        ValueParser::new("; ")
    }

    #[test]
    fn test_split_on_separator_and_newline() {
        assert_eq!(parser().split("1; 2\n3"), vec!["1", "2", "3"]);
        assert_eq!(parser().split("  "), Vec::<&str>::new());
        assert_eq!(parser().split("a;  ; b"), vec!["a", "b"]);
    }

    #[test]
    fn test_numeric_with_modifiers() {
        assert_eq!(
            parser().parse_numeric("<5"),
            NumericToken::Value { modifier: Some("<"), value: 5.0 }
        );
        assert_eq!(
            parser().parse_numeric(">=1.5e2"),
            NumericToken::Value { modifier: Some(">="), value: 150.0 }
        );
        assert_eq!(
            parser().parse_numeric("-.5"),
            NumericToken::Value { modifier: None, value: -0.5 }
        );
    }

    #[test]
    fn test_nan_tokens_and_invalid() {
        assert_eq!(parser().parse_numeric("NaN"), NumericToken::NotANumber);
        assert_eq!(parser().parse_numeric("?"), NumericToken::NotANumber);
        assert_eq!(parser().parse_numeric("inf"), NumericToken::Invalid);
        assert_eq!(parser().parse_numeric("1-5"), NumericToken::Invalid);
        assert_eq!(parser().parse_numeric("abc"), NumericToken::Invalid);
    }

    #[test]
    fn test_numeric_values_skip_nan() {
        assert_eq!(parser().numeric_values(&["1", "?", "3"]), Some(vec![1.0, 3.0]));
        assert_eq!(parser().numeric_values(&["1", "x"]), None);
    }

    #[test]
    fn test_dates() {
        assert_eq!(parser().parse_date("01-Jan-1970"), Some(0.0));
        assert_eq!(parser().parse_date("02-Jan-1970"), Some(1.0));
        assert_eq!(parser().parse_date("Jan 2, 1970"), Some(1.0));
        assert_eq!(parser().parse_date("1970-01-02"), None);
        assert_eq!(format_date(1.0).as_deref(), Some("02-Jan-1970"));
    }

    #[test]
    fn test_multi_category() {
        assert!(!parser().is_multi_category(&["a", "a"]));
        assert!(parser().is_multi_category(&["a", "b"]));
        assert!(!parser().is_multi_category(&["a"]));
    }
}
