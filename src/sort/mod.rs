//! Record sorting
//!
//! Computes a stable permutation of the full row storage, not just of the
//! visible rows. The table applies the permutation.

pub mod comparator;

pub use comparator::{compare_numeric, EncodedLengthSizer, RecordComparator, StructureSizer};

use serde::{Deserialize, Serialize};

use crate::table::{ColumnRegistry, FlagId, Record, SPECIAL_TYPE_STRUCTURE};

/// Sort request for one column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRequest {
    pub column: usize,
    pub descending: bool,
    /// Selected rows precede unselected ones, overriding the column order
    pub selected_first: bool,
}

impl SortRequest {
    pub fn asc(column: usize) -> Self {
        Self {
            column,
            descending: false,
            selected_first: false,
        }
    }

    pub fn desc(column: usize) -> Self {
        Self {
            column,
            descending: true,
            selected_first: false,
        }
    }

    pub fn with_selected_first(mut self) -> Self {
        self.selected_first = true;
        self
    }
}

/// Chooses a comparator and computes sort permutations
pub struct SortEngine;

impl SortEngine {
    /// Comparator family for `column`
    pub fn comparator_for<'a>(
        columns: &ColumnRegistry,
        column: usize,
        sizer: &'a dyn StructureSizer,
    ) -> RecordComparator<'a> {
        let Some(meta) = columns.get(column) else {
            return RecordComparator::Lexical;
        };
        if meta.properties().special_type.as_deref() == Some(SPECIAL_TYPE_STRUCTURE) {
            RecordComparator::Structure(sizer)
        } else if meta.column_type().is_numeric() || meta.column_type().is_category() {
            RecordComparator::Numeric
        } else {
            RecordComparator::Lexical
        }
    }

    /// Permutation such that new row `i` is old row `order[i]`
    ///
    /// Stable: records comparing equal keep their relative order.
    pub fn order(
        records: &[Record],
        columns: &ColumnRegistry,
        request: &SortRequest,
        selection: FlagId,
        sizer: &dyn StructureSizer,
    ) -> Vec<usize> {
        let comparator = Self::comparator_for(columns, request.column, sizer);
        let mut order: Vec<usize> = (0..records.len()).collect();
        order.sort_by(|&a, &b| {
            let (a, b) = (&records[a], &records[b]);
            if request.selected_first {
                let (a_selected, b_selected) = (a.is_flag_set(selection), b.is_flag_set(selection));
                if a_selected != b_selected {
                    return b_selected.cmp(&a_selected);
                }
            }
            comparator.compare(a, b, request.column, request.descending)
        });
        order
    }
}
