//! Record comparators
//!
//! Ordering rules:
//! - numeric: cached projection, NaN last in both directions
//! - lexical: raw payload bytes
//! - structure: size metric descending, then bytes; zero-size last in both directions

use std::cmp::Ordering;

use crate::table::Record;

/// Size metric of an encoded structure, e.g. its non-hydrogen atom count
///
/// Supplied from outside; decoding structures is not the table's business.
pub trait StructureSizer: Send + Sync {
    fn size(&self, encoded: &[u8]) -> usize;
}

/// Fallback sizer: payload length
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodedLengthSizer;

impl StructureSizer for EncodedLengthSizer {
    fn size(&self, encoded: &[u8]) -> usize {
        encoded.len()
    }
}

/// Comparator family chosen per column
pub enum RecordComparator<'a> {
    Numeric,
    Lexical,
    Structure(&'a dyn StructureSizer),
}

impl RecordComparator<'_> {
    /// Compare two records on `column` in the requested direction
    pub fn compare(&self, a: &Record, b: &Record, column: usize, descending: bool) -> Ordering {
        match self {
            RecordComparator::Numeric => compare_numeric(a.double(column), b.double(column), descending),
            RecordComparator::Lexical => {
                let ordering = a.data(column).unwrap_or(&[]).cmp(b.data(column).unwrap_or(&[]));
                directed(ordering, descending)
            }
            RecordComparator::Structure(sizer) => {
                let a_bytes = a.data(column).unwrap_or(&[]);
                let b_bytes = b.data(column).unwrap_or(&[]);
                let a_size = if a_bytes.is_empty() { 0 } else { sizer.size(a_bytes) };
                let b_size = if b_bytes.is_empty() { 0 } else { sizer.size(b_bytes) };

                match (a_size == 0, b_size == 0) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => {
                        let ordering = b_size.cmp(&a_size).then_with(|| a_bytes.cmp(b_bytes));
                        directed(ordering, descending)
                    }
                }
            }
        }
    }
}

/// Numeric comparison with NaN always last
pub fn compare_numeric(a: f64, b: f64, descending: bool) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => directed(a.total_cmp(&b), descending),
    }
}

fn directed(ordering: Ordering, descending: bool) -> Ordering {
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}
