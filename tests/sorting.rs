//! Sorting Tests
//!
//! - Numeric, category, lexical and structure ordering
//! - NaN last in both directions
//! - Selected-first override
//! - Active row follows its record

use std::sync::Arc;

use compound_table::sort::{SortRequest, StructureSizer};
use compound_table::table::{ColumnProperties, CompoundTable, SPECIAL_TYPE_STRUCTURE};
use compound_table::TableConfig;

// =============================================================================
// Helper Functions
// =============================================================================

fn table_with<const N: usize>(columns: &[(&str, [&str; N])]) -> CompoundTable {
    let mut table = CompoundTable::new(TableConfig::default().with_descriptor_workers(1));
    table.initialize_table(N, columns.len());
    for (column, (name, values)) in columns.iter().enumerate() {
        table.set_column_name(column, name).unwrap();
        for (row, value) in values.iter().enumerate() {
            table.set_total_data_at(*value, row, column).unwrap();
        }
    }
    table.finalize_table().unwrap();
    table
}

fn column_values(table: &CompoundTable, column: usize) -> Vec<String> {
    (0..table.row_count())
        .map(|row| table.get_value(row, column))
        .collect()
}

// =============================================================================
// Orderings
// =============================================================================

/// Numeric ascending and descending; missing values trail in both.
#[test]
fn test_numeric_nan_last() {
    let mut table = table_with(&[("IC50", ["3", "", "1", "2"])]);

    table.sort(0, false, false).unwrap();
    assert_eq!(column_values(&table, 0), vec!["1", "2", "3", ""]);

    table.sort(0, true, false).unwrap();
    assert_eq!(column_values(&table, 0), vec!["3", "2", "1", ""]);
}

/// Text category columns sort by category order.
#[test]
fn test_category_order() {
    let mut table = table_with(&[("Phase", ["late", "early", "mid", "early"])]);
    let properties = ColumnProperties {
        custom_order: Some(vec!["early".into(), "mid".into(), "late".into()]),
        ..ColumnProperties::default()
    };
    table.set_column_properties(0, properties).unwrap();

    table.sort(0, false, false).unwrap();
    assert_eq!(column_values(&table, 0), vec!["early", "early", "mid", "late"]);
}

/// Structure columns order by size, largest first.
#[test]
fn test_structure_order() {
    struct CarbonCount;
    impl StructureSizer for CarbonCount {
        fn size(&self, encoded: &[u8]) -> usize {
            encoded.iter().filter(|byte| **byte == b'C').count()
        }
    }

    let mut table = table_with(&[("Structure", ["CC", "", "CCCC", "C"])]);
    table
        .set_column_properties(
            0,
            ColumnProperties {
                special_type: Some(SPECIAL_TYPE_STRUCTURE.into()),
                ..ColumnProperties::default()
            },
        )
        .unwrap();
    table.set_structure_sizer(Arc::new(CarbonCount));

    table.sort(0, false, false).unwrap();
    assert_eq!(column_values(&table, 0), vec!["CCCC", "CC", "C", ""]);

    table.sort(0, true, false).unwrap();
    assert_eq!(column_values(&table, 0), vec!["C", "CC", "CCCC", ""]);
}

/// Equal keys keep their relative order.
#[test]
fn test_stable_for_equal_keys() {
    let mut table = table_with(&[("Value", ["1", "1", "0"]), ("Id", ["a", "b", "c"])]);

    table.sort(0, false, false).unwrap();
    assert_eq!(column_values(&table, 1), vec!["c", "a", "b"]);
}

// =============================================================================
// Overrides and bookkeeping
// =============================================================================

/// Selected rows come first regardless of direction.
#[test]
fn test_selected_first() {
    let mut table = table_with(&[("Value", ["1", "2", "3", "4"])]);
    table.select_rows(&[0, 2], true).unwrap();

    table.sort_by(SortRequest::desc(0).with_selected_first()).unwrap();

    assert_eq!(column_values(&table, 0), vec!["3", "1", "4", "2"]);
    assert_eq!(table.selected_rows(), vec![0, 1]);
}

/// The returned mapping sends old rows to new rows.
#[test]
fn test_mapping_and_active_row() {
    let mut table = table_with(&[("Value", ["b", "c", "a"])]);
    table.set_active_row(Some(1)).unwrap();

    let mapping = table.sort(0, false, false).unwrap();

    assert_eq!(mapping, vec![1, 2, 0]);
    assert_eq!(table.active_row(), Some(2));
    assert_eq!(table.get_total_value_at(2, 0), "c");
    assert_eq!(table.metrics().sorts, 1);
}

/// Sorting a table with hidden rows reorders storage; the projection follows.
#[test]
fn test_sort_with_hidden_rows() {
    let mut table = table_with(&[("Value", ["3", "1", "2"])]);
    let filter = table.allocate_flag(true).unwrap();
    table
        .apply_exclusion(filter, |record| record.data(0) == Some(&b"2"[..]))
        .unwrap();

    table.sort(0, false, false).unwrap();

    assert_eq!(column_values(&table, 0), vec!["1", "3"]);
    assert_eq!(table.total_row_count(), 3);
}
