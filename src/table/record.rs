//! Records and row storage
//!
//! A record holds one row: its cell values, a cached numeric projection per
//! column, the 64-bit flag mask and a stable original index. Descriptor
//! results computed before a reorder are mapped back through the original
//! index.

use std::borrow::Cow;
use std::sync::Arc;

use crate::descriptor::Descriptor;

use super::flags::FlagId;

/// Value of one cell
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
    /// No value
    #[default]
    Empty,
    /// Encoded payload as delivered by the loader
    Data(Arc<[u8]>),
    /// Decoded descriptor of a derived column
    Descriptor(Arc<Descriptor>),
}

impl CellValue {
    /// True for [`CellValue::Empty`] and zero-length payloads
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Data(bytes) => bytes.is_empty(),
            CellValue::Descriptor(_) => false,
        }
    }

    /// Raw payload bytes, if this is a data cell
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CellValue::Data(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Payload as text; empty for non-data cells
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Data(bytes) => String::from_utf8_lossy(bytes),
            _ => Cow::Borrowed(""),
        }
    }

    /// Descriptor payload, if any
    pub fn as_descriptor(&self) -> Option<&Arc<Descriptor>> {
        match self {
            CellValue::Descriptor(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    /// Shared payload handle, cheap to clone into worker snapshots
    pub(crate) fn shared_bytes(&self) -> Option<Arc<[u8]>> {
        match self {
            CellValue::Data(bytes) if !bytes.is_empty() => Some(Arc::clone(bytes)),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        value.as_bytes().into()
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        value.into_bytes().into()
    }
}

impl From<&[u8]> for CellValue {
    fn from(value: &[u8]) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Data(Arc::from(value))
        }
    }
}

impl From<Vec<u8>> for CellValue {
    fn from(value: Vec<u8>) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Data(Arc::from(value))
        }
    }
}

impl From<Descriptor> for CellValue {
    fn from(value: Descriptor) -> Self {
        CellValue::Descriptor(Arc::new(value))
    }
}

/// One row of the table
#[derive(Debug, Clone)]
pub struct Record {
    cells: Vec<CellValue>,
    numeric: Vec<f64>,
    flags: u64,
    original_index: usize,
}

impl Record {
    /// Create an empty record with `columns` cells
    pub fn new(columns: usize, original_index: usize) -> Self {
        Self {
            cells: vec![CellValue::Empty; columns],
            numeric: vec![f64::NAN; columns],
            flags: 0,
            original_index,
        }
    }

    /// Cell value of `column`
    pub fn cell(&self, column: usize) -> &CellValue {
        &self.cells[column]
    }

    /// Raw payload of `column`
    pub fn data(&self, column: usize) -> Option<&[u8]> {
        self.cells[column].as_bytes()
    }

    /// Cached numeric projection of `column`
    pub fn double(&self, column: usize) -> f64 {
        self.numeric[column]
    }

    /// Full flag mask
    pub fn flags(&self) -> u64 {
        self.flags
    }

    /// True if `flag` is set on this record
    pub fn is_flag_set(&self, flag: FlagId) -> bool {
        self.flags & flag.mask() != 0
    }

    /// True if any bit of `mask` is set
    pub fn any_flag_of(&self, mask: u64) -> bool {
        self.flags & mask != 0
    }

    /// Index this record had in storage when it was created
    pub fn original_index(&self) -> usize {
        self.original_index
    }

    /// Number of cells
    pub fn column_count(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn set_cell(&mut self, column: usize, value: CellValue) {
        self.cells[column] = value;
    }

    pub(crate) fn set_double(&mut self, column: usize, value: f64) {
        self.numeric[column] = value;
    }

    pub(crate) fn set_flag(&mut self, flag: FlagId, value: bool) {
        if value {
            self.flags |= flag.mask();
        } else {
            self.flags &= !flag.mask();
        }
    }

    pub(crate) fn clear_flags(&mut self, mask: u64) {
        self.flags &= !mask;
    }

    fn append_columns(&mut self, count: usize) {
        self.cells.extend(std::iter::repeat(CellValue::Empty).take(count));
        self.numeric.extend(std::iter::repeat(f64::NAN).take(count));
    }

    fn retain_columns(&mut self, keep: &[bool]) {
        let mut column = 0;
        self.cells.retain(|_| {
            column += 1;
            keep[column - 1]
        });
        let mut column = 0;
        self.numeric.retain(|_| {
            column += 1;
            keep[column - 1]
        });
    }
}

/// Row storage in physical order
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<Record>,
    next_original: usize,
}

impl RecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all rows with `rows` empty records of `columns` cells
    pub fn reset(&mut self, rows: usize, columns: usize) {
        self.records = (0..rows).map(|row| Record::new(columns, row)).collect();
        self.next_original = rows;
    }

    /// Append `count` empty records; returns the index of the first
    pub fn append(&mut self, count: usize, columns: usize) -> usize {
        let first = self.records.len();
        for _ in 0..count {
            self.records.push(Record::new(columns, self.next_original));
            self.next_original += 1;
        }
        first
    }

    /// Append `count` empty cells to every record
    pub fn append_columns(&mut self, count: usize) {
        for record in &mut self.records {
            record.append_columns(count);
        }
    }

    /// Drop the cells of every column whose `keep` entry is false
    pub fn retain_columns(&mut self, keep: &[bool]) {
        for record in &mut self.records {
            record.retain_columns(keep);
        }
    }

    /// Remove every record whose row is marked in `remove`
    ///
    /// Rows beyond the end of `remove` are kept. Returns the old→new row
    /// mapping, `-1` for removed rows.
    pub fn compact_rows(&mut self, remove: &[bool]) -> Vec<i64> {
        let marked = |row: usize| remove.get(row).copied().unwrap_or(false);
        let mut mapping = Vec::with_capacity(self.records.len());
        let mut next = 0i64;
        for row in 0..self.records.len() {
            if marked(row) {
                mapping.push(-1);
            } else {
                mapping.push(next);
                next += 1;
            }
        }
        let mut row = 0;
        self.records.retain(|_| {
            let keep = !marked(row);
            row += 1;
            keep
        });
        mapping
    }

    /// Reorder records so that new row `i` is old row `order[i]`
    ///
    /// Returns the old→new row mapping.
    pub fn permute(&mut self, order: &[usize]) -> Vec<i64> {
        debug_assert_eq!(order.len(), self.records.len());
        let mut mapping = vec![-1i64; order.len()];
        for (new_row, &old_row) in order.iter().enumerate() {
            mapping[old_row] = new_row as i64;
        }

        let mut old: Vec<Option<Record>> = std::mem::take(&mut self.records)
            .into_iter()
            .map(Some)
            .collect();
        self.records = order
            .iter()
            .filter_map(|&old_row| old[old_row].take())
            .collect();
        mapping
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at physical `row`
    pub fn get(&self, row: usize) -> Option<&Record> {
        self.records.get(row)
    }

    pub(crate) fn get_mut(&mut self, row: usize) -> Option<&mut Record> {
        self.records.get_mut(row)
    }

    /// All records in physical order
    pub fn as_slice(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Record] {
        &mut self.records
    }

    /// Iterate records in physical order
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }
}
