//! Change Event Tests
//!
//! Every structural change is announced to subscribers with its kind,
//! specifier and, where rows or columns move, the old→new mapping.

use compound_table::table::{drain, ChangeKind, CompoundTable, HitlistSource, TableEvent};
use compound_table::TableConfig;

// =============================================================================
// Helper Functions
// =============================================================================

fn loaded(values: &[&str]) -> CompoundTable {
    let mut table = CompoundTable::new(TableConfig::default().with_descriptor_workers(1));
    table.initialize_table(values.len(), 1);
    table.set_column_name(0, "Value").unwrap();
    for (row, value) in values.iter().enumerate() {
        table.set_total_data_at(*value, row, 0).unwrap();
    }
    table
}

fn kinds(events: &[TableEvent]) -> Vec<ChangeKind> {
    events.iter().map(|event| event.kind).collect()
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Finalize announces a new table; loader calls before it are silent.
#[test]
fn test_new_table_event() {
    let mut table = loaded(&["1", "2"]);
    let mut events = table.subscribe();

    table.finalize_table().unwrap();

    assert_eq!(kinds(&drain(&mut events)), vec![ChangeKind::NewTable]);
}

/// Appended rows and columns carry their first index.
#[test]
fn test_add_rows_and_columns() {
    let mut table = loaded(&["1", "2"]);
    table.finalize_table().unwrap();
    let mut events = table.subscribe();

    let first_row = table.add_new_rows(2);
    table.finalize_new_rows(first_row).unwrap();
    let first_column = table.add_new_columns(&["Extra"]);
    table.finalize_new_columns(first_column).unwrap();

    let events = drain(&mut events);
    assert_eq!(events[0], TableEvent::with_specifier(ChangeKind::AddRows, 2));
    assert_eq!(events[1], TableEvent::with_specifier(ChangeKind::AddColumns, 1));
}

// =============================================================================
// Mappings
// =============================================================================

/// Deleting rows publishes the mapping and clears a deleted active row.
#[test]
fn test_delete_rows_mapping() {
    let mut table = loaded(&["a", "b", "c", "d"]);
    table.finalize_table().unwrap();
    table.set_active_row(Some(1)).unwrap();
    let mut events = table.subscribe();

    let mapping = table.delete_rows(&[1, 2]).unwrap();

    assert_eq!(mapping, vec![0, -1, -1, 1]);
    let events = drain(&mut events);
    assert_eq!(
        events[0],
        TableEvent::with_mapping(ChangeKind::DeleteRows, vec![0, -1, -1, 1])
    );
    assert_eq!(events[1], TableEvent::with_specifier(ChangeKind::ChangeActiveRow, -1));
    assert_eq!(table.active_row(), None);
    assert_eq!(table.total_row_count(), 2);
}

/// Sorting publishes the permutation as a mapping.
#[test]
fn test_sort_order_mapping() {
    let mut table = loaded(&["3", "1", "2"]);
    table.finalize_table().unwrap();
    let mut events = table.subscribe();

    table.sort(0, false, false).unwrap();

    assert_eq!(
        drain(&mut events),
        vec![TableEvent::with_mapping(ChangeKind::ChangeSortOrder, vec![2, 0, 1])]
    );
}

/// Removing a column also removes its dependents.
#[test]
fn test_remove_columns_mapping() {
    let mut table = CompoundTable::new(TableConfig::default().with_descriptor_workers(1));
    table.initialize_table(1, 3);
    table.set_column_name(0, "Structure").unwrap();
    table.set_column_name(1, "Coordinates").unwrap();
    table.set_column_name(2, "Name").unwrap();
    let mut properties = table.column(1).unwrap().properties().clone();
    properties.parent_column = Some("Structure".into());
    table.set_column_properties(1, properties).unwrap();
    table.finalize_table().unwrap();
    let mut events = table.subscribe();

    let mapping = table.remove_columns(&[0]).unwrap();

    assert_eq!(mapping, vec![-1, -1, 0]);
    assert_eq!(
        drain(&mut events),
        vec![TableEvent::with_mapping(ChangeKind::RemoveColumns, vec![-1, -1, 0])]
    );
    assert_eq!(table.find_column("Name"), Some(0));
}

// =============================================================================
// Flags
// =============================================================================

/// Selection, exclusion and hitlist changes each have their own kind.
#[test]
fn test_flag_events() {
    let mut table = loaded(&["a", "b"]);
    table.finalize_table().unwrap();
    let mut events = table.subscribe();

    table.set_selected(0, true).unwrap();
    let filter = table.allocate_flag(true).unwrap();
    table.apply_exclusion(filter, |_| false).unwrap();
    table.create_hitlist("Actives", HitlistSource::Rows(vec![1])).unwrap();

    let events = drain(&mut events);
    assert_eq!(
        kinds(&events),
        vec![
            ChangeKind::ChangeSelection,
            ChangeKind::ChangeExcluded,
            ChangeKind::ChangeExtensionData,
        ]
    );
    assert_eq!(events[0].specifier, table.selection_flag().position() as i64);
}

/// Dropped subscribers do not block publishing.
#[test]
fn test_dropped_subscriber() {
    let mut table = loaded(&["a"]);
    let events = table.subscribe();
    drop(events);
    let mut live = table.subscribe();

    table.finalize_table().unwrap();

    assert_eq!(kinds(&drain(&mut live)), vec![ChangeKind::NewTable]);
}

/// Column edits announce the edited column.
#[test]
fn test_edit_cell_event() {
    let mut table = loaded(&["1", "2"]);
    table.finalize_table().unwrap();
    let mut events = table.subscribe();

    table.edit_cell(1, 0, "5").unwrap();

    assert_eq!(
        drain(&mut events),
        vec![TableEvent::with_specifier(ChangeKind::ChangeColumnData, 0)]
    );
    assert_eq!(table.column(0).unwrap().max(), 5.0);
}
