//! Visible-row projection
//!
//! A record is visible exactly when none of its exclusion bits are set:
//!
//! ```text
//! visible(r) <=> r.flags & exclusion_mask == 0
//! ```
//!
//! The projection preserves storage order. It is recompiled after every
//! exclusion change, row insertion or deletion, and sort.

use super::record::Record;

/// Ordered list of visible physical row indices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleRows {
    rows: Vec<usize>,
}

impl VisibleRows {
    /// Number of visible rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Physical index of visible row `row`
    pub fn total_index(&self, row: usize) -> Option<usize> {
        self.rows.get(row).copied()
    }

    /// Visible position of physical row `total`, if visible
    pub fn visible_index(&self, total: usize) -> Option<usize> {
        self.rows.binary_search(&total).ok()
    }

    /// Physical indices in storage order
    pub fn as_slice(&self) -> &[usize] {
        &self.rows
    }
}

/// Stateless compiler of the visible projection
pub struct VisibilityCompiler;

impl VisibilityCompiler {
    /// Single O(n) scan over `records`
    pub fn compile(records: &[Record], exclusion_mask: u64) -> VisibleRows {
        let rows = records
            .iter()
            .enumerate()
            .filter(|(_, record)| !record.any_flag_of(exclusion_mask))
            .map(|(index, _)| index)
            .collect();
        VisibleRows { rows }
    }

    /// Visibility of a single record
    pub fn is_visible(record: &Record, exclusion_mask: u64) -> bool {
        !record.any_flag_of(exclusion_mask)
    }
}
