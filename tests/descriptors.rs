//! Descriptor Column Tests
//!
//! - Background generation and integration
//! - Version tags: outdated columns are recomputed
//! - Per-record failures surface as one column error
//! - Similarity queries

use std::sync::Arc;
use std::time::Duration;

use compound_table::descriptor::{
    CancellationToken, Descriptor, DescriptorError, DescriptorHandler, DescriptorKind,
    DescriptorResult, ParentCell,
};
use compound_table::table::{ColumnProperties, CompoundTable, TableError};
use compound_table::TableConfig;

// =============================================================================
// Helper Functions
// =============================================================================

/// Counts the bytes of the parent; fails on "bad"
struct LengthHandler {
    version: &'static str,
    delay: Duration,
}

impl DescriptorHandler for LengthHandler {
    type Object = String;

    fn short_name(&self) -> &str {
        "Len"
    }

    fn version(&self) -> &str {
        self.version
    }

    fn kind(&self) -> DescriptorKind {
        DescriptorKind::IntVector
    }

    fn decode_object(&self, parent: ParentCell<'_>) -> DescriptorResult<String> {
        let text = String::from_utf8(parent.encoded.to_vec())
            .map_err(|e| DescriptorError::Decode(e.to_string()))?;
        if text == "bad" {
            return Err(DescriptorError::Decode("unparsable structure".into()));
        }
        Ok(text)
    }

    fn create_descriptor(&self, object: &String) -> DescriptorResult<Descriptor> {
        std::thread::sleep(self.delay);
        Ok(Descriptor::IntVector(vec![object.len() as i32]))
    }
}

fn handler(version: &'static str) -> Arc<LengthHandler> {
    Arc::new(LengthHandler {
        version,
        delay: Duration::ZERO,
    })
}

fn slow_handler(delay: Duration) -> Arc<LengthHandler> {
    Arc::new(LengthHandler {
        version: "1.0",
        delay,
    })
}

fn slow_structures(values: &[&str]) -> CompoundTable {
    let mut table = CompoundTable::new(TableConfig::default().with_descriptor_workers(1));
    table.initialize_table(values.len(), 1);
    table.set_column_name(0, "Structure").unwrap();
    for (row, value) in values.iter().enumerate() {
        table.set_total_data_at(*value, row, 0).unwrap();
    }
    table.finalize_table().unwrap();
    table
}

fn structures(values: &[&str]) -> CompoundTable {
    let mut table = CompoundTable::new(TableConfig::default().with_descriptor_workers(3));
    table.initialize_table(values.len(), 1);
    table.set_column_name(0, "Structure").unwrap();
    for (row, value) in values.iter().enumerate() {
        table.set_total_data_at(*value, row, 0).unwrap();
    }
    table.finalize_table().unwrap();
    table
}

// =============================================================================
// Generation
// =============================================================================

/// A new descriptor column becomes available after waiting.
#[test]
fn test_add_descriptor_column_computes_values() {
    let mut table = structures(&["abc", "de", "", "fghi"]);
    let column = table.add_descriptor_column(0, handler("1.0")).unwrap();
    assert_eq!(table.column(column).unwrap().name(), "Len");

    table.wait_for_descriptors().unwrap();

    assert!(table.is_descriptor_available(column));
    assert!(!table.is_descriptor_calculation_running());
    assert_eq!(table.get_total_value_at(0, column), "3");
    assert_eq!(table.get_total_value_at(1, column), "2");
    assert_eq!(table.get_total_value_at(2, column), "");
    assert_eq!(table.get_total_value_at(3, column), "4");
    assert_eq!(
        table.column(column).unwrap().properties().descriptor_version.as_deref(),
        Some("1.0")
    );
}

/// A second column with the same handler gets a distinct name.
#[test]
fn test_descriptor_column_names_unique() {
    let mut table = structures(&["abc"]);
    let first = table.add_descriptor_column(0, handler("1.0")).unwrap();
    let second = table.add_descriptor_column(0, handler("1.0")).unwrap();

    assert_ne!(
        table.column(first).unwrap().name(),
        table.column(second).unwrap().name()
    );
    table.wait_for_descriptors().unwrap();
}

/// Descriptors cannot derive from descriptors.
#[test]
fn test_descriptor_parent_must_be_plain() {
    let mut table = structures(&["abc"]);
    let column = table.add_descriptor_column(0, handler("1.0")).unwrap();

    let err = table.add_descriptor_column(column, handler("1.0")).unwrap_err();
    assert!(matches!(err, TableError::InvalidParentColumn(_)));
    table.wait_for_descriptors().unwrap();
}

/// Failing records leave nulls and one aggregate message.
#[test]
fn test_failures_reported_per_column() {
    let mut table = structures(&["abc", "bad", "de"]);
    let column = table.add_descriptor_column(0, handler("1.0")).unwrap();
    table.wait_for_descriptors().unwrap();

    assert!(table.is_descriptor_available(column));
    assert_eq!(table.get_total_value_at(1, column), "");
    let message = table.descriptor_error(column).unwrap();
    assert!(message.contains("1 of 3"));
    assert!(message.contains("unparsable structure"));
    assert_eq!(table.metrics().descriptors_failed, 1);
}

/// Editing a parent cell recomputes the derived value.
#[test]
fn test_edit_parent_recomputes() {
    let mut table = structures(&["abc", "de"]);
    let column = table.add_descriptor_column(0, handler("1.0")).unwrap();
    table.wait_for_descriptors().unwrap();

    table.edit_cell(1, 0, "defgh").unwrap();
    table.wait_for_descriptors().unwrap();

    assert_eq!(table.get_total_value_at(1, column), "5");
    assert_eq!(table.edit_cell(0, column, "9"), Err(TableError::DerivedColumn(column)));
}

/// Sorting by a descriptor column is refused and leaves the rows in place.
#[test]
fn test_sort_by_descriptor_column_refused() {
    let mut table = structures(&["abc", "d", "ef"]);
    let column = table.add_descriptor_column(0, handler("1.0")).unwrap();
    table.wait_for_descriptors().unwrap();
    let mut events = table.subscribe();

    assert_eq!(table.sort(column, false, false), Err(TableError::DerivedColumn(column)));

    assert_eq!(table.get_total_value_at(0, 0), "abc");
    assert_eq!(table.get_total_value_at(1, 0), "d");
    assert_eq!(table.metrics().sorts, 0);
    assert!(events.try_recv().is_err());
}

// =============================================================================
// Version tags
// =============================================================================

fn loaded_descriptors(stored_version: &str, handler_version: &'static str) -> CompoundTable {
    let mut table = CompoundTable::new(TableConfig::default().with_descriptor_workers(2));
    table.initialize_table(2, 2);
    table.set_column_name(0, "Structure").unwrap();
    table.set_column_name(1, "Len").unwrap();
    table
        .set_column_properties(
            1,
            ColumnProperties {
                parent_column: Some("Structure".into()),
                descriptor_version: Some(stored_version.into()),
                ..ColumnProperties::default()
            },
        )
        .unwrap();
    for (row, (structure, stored)) in [("abc", "9"), ("de", "9")].iter().enumerate() {
        table.set_total_data_at(*structure, row, 0).unwrap();
        table.set_total_data_at(*stored, row, 1).unwrap();
    }
    table.bind_descriptor_handler(1, handler(handler_version)).unwrap();
    table.finalize_table().unwrap();
    table
}

/// A stored "v1" column under a "v2" handler is recomputed although every record holds a value.
#[test]
fn test_outdated_version_recomputed() {
    let mut table = loaded_descriptors("v1", "v2");

    assert!(table.column(1).unwrap().is_descriptor_outdated());
    assert!(!table.is_descriptor_available(1));

    table.wait_for_descriptors().unwrap();

    assert!(table.is_descriptor_available(1));
    assert_eq!(table.get_total_value_at(0, 1), "3");
    assert_eq!(table.get_total_value_at(1, 1), "2");
    assert_eq!(
        table.column(1).unwrap().properties().descriptor_version.as_deref(),
        Some("v2")
    );
}

/// Matching version tags keep the stored values.
#[test]
fn test_current_version_kept() {
    let mut table = loaded_descriptors("v2", "v2");
    table.wait_for_descriptors().unwrap();

    assert!(table.is_descriptor_available(1));
    assert_eq!(table.get_total_value_at(0, 1), "9");
    assert_eq!(table.metrics().descriptors_computed, 0);
}

// =============================================================================
// Cancellation and reordering
// =============================================================================

/// Sorting during a generation still yields correct values per row.
#[test]
fn test_sort_during_generation() {
    let mut table = structures(&["a", "abcd", "ab", "abc"]);
    let column = table.add_descriptor_column(0, handler("1.0")).unwrap();

    table.sort(0, false, false).unwrap();
    table.wait_for_descriptors().unwrap();

    for row in 0..table.total_row_count() {
        let parent = table.get_total_value_at(row, 0);
        assert_eq!(table.get_total_value_at(row, column), parent.len().to_string());
    }
}

/// Stopping leaves the column unavailable until the next run.
#[test]
fn test_stop_then_resume() {
    let mut table = structures(&["abc", "de"]);
    let column = table.add_descriptor_column(0, handler("1.0")).unwrap();
    table.stop_descriptor_calculation();
    assert!(!table.is_descriptor_calculation_running());

    table.update_descriptors().unwrap();
    table.wait_for_descriptors().unwrap();
    assert!(table.is_descriptor_available(column));
}

/// Requests arriving during a generation collapse into exactly one rerun.
#[test]
fn test_requests_during_generation_coalesce() {
    let mut table = slow_structures(&["a", "bb", "ccc", "dddd", "eeeee", "ffffff"]);
    let column = table
        .add_descriptor_column(0, slow_handler(Duration::from_millis(20)))
        .unwrap();
    assert!(table.is_descriptor_calculation_running());

    table.edit_cell(1, 0, "bbbbbbb").unwrap();
    table.update_descriptors().unwrap();
    table.update_descriptors().unwrap();
    table.wait_for_descriptors().unwrap();

    let metrics = table.metrics();
    assert_eq!(metrics.generations_started, 2);
    assert_eq!(metrics.generations_completed, 2);
    assert!(table.is_descriptor_available(column));
    assert_eq!(table.get_total_value_at(1, column), "7");
    assert_eq!(table.get_total_value_at(5, column), "6");
}

/// A stopped generation leaves no partial values or version tag behind.
#[test]
fn test_cancelled_generation_writes_nothing() {
    let values = ["a", "bb", "ccc", "dddd", "eeeee", "ffffff", "g", "hh"];
    let mut table = slow_structures(&values);
    let column = table
        .add_descriptor_column(0, slow_handler(Duration::from_millis(40)))
        .unwrap();

    std::thread::sleep(Duration::from_millis(100));
    assert!(table.stop_descriptor_calculation());

    let meta = table.column(column).unwrap();
    assert_eq!(meta.properties().descriptor_version, None);
    assert!(!table.is_descriptor_available(column));
    for row in 0..values.len() {
        assert_eq!(table.get_total_value_at(row, column), "");
    }
    let metrics = table.metrics();
    assert_eq!(metrics.generations_cancelled, 1);
    assert_eq!(metrics.generations_completed, 0);
}

// =============================================================================
// Similarity
// =============================================================================

/// Pairwise and query similarity over computed descriptors.
#[test]
fn test_similarity() {
    let mut table = structures(&["abc", "ab", ""]);
    let column = table.add_descriptor_column(0, handler("1.0")).unwrap();
    table.wait_for_descriptors().unwrap();

    let pair = table.get_descriptor_similarity(column, 0, 1).unwrap();
    assert!((pair - 2.0 / 3.0).abs() < 1e-6);

    let scores = table
        .similarity_to(column, &Descriptor::IntVector(vec![3]))
        .unwrap();
    assert_eq!(scores.len(), 3);
    assert_eq!(scores[0], 1.0);
    assert!((scores[1] - 2.0 / 3.0).abs() < 1e-6);
    assert!(scores[2].is_nan());
}

/// A cancelled similarity query returns an error.
#[test]
fn test_similarity_cancelled() {
    let mut table = structures(&["abc"]);
    let column = table.add_descriptor_column(0, handler("1.0")).unwrap();
    table.wait_for_descriptors().unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = table
        .similarity_to_with(column, &Descriptor::IntVector(vec![1]), &cancel)
        .unwrap_err();
    assert!(matches!(err, TableError::Descriptor(DescriptorError::Cancelled)));
}

/// Similarity on a plain column is refused.
#[test]
fn test_similarity_requires_descriptor_column() {
    let table = structures(&["abc"]);
    let err = table
        .similarity_to(0, &Descriptor::IntVector(vec![1]))
        .unwrap_err();
    assert_eq!(err, TableError::NotDescriptorColumn(0));
}
