//! Descriptor jobs
//!
//! One job is the pending recomputation of one descriptor column within a
//! generation. The job owns an immutable snapshot of the parent cells and
//! one write-once result slot per record; workers only ever touch the slot
//! of the record index they claimed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::observability::TableMetrics;
use crate::table::ColumnId;

use super::errors::DescriptorError;
use super::handler::{Descriptor, ParentCell, SharedHandler};

/// Inputs of one job, captured by the owner when the generation starts
pub struct JobSnapshot {
    pub column_id: ColumnId,
    pub column_name: String,
    pub handler: SharedHandler,
    /// Stored version differs from the handler's: recompute every record
    pub outdated: bool,
    /// Column epoch at snapshot time
    pub epoch: u64,
    /// Encoded parent cell per record
    pub parents: Vec<Option<Arc<[u8]>>>,
    /// Coordinate side-data per record, for handlers that need it
    pub coordinates: Option<Vec<Option<Arc<[u8]>>>>,
    /// Whether the record already holds a descriptor
    pub existing: Vec<bool>,
}

/// A pending derived-column computation with its per-batch counters
pub struct DescriptorJob {
    snapshot: JobSnapshot,
    results: Vec<OnceLock<Option<Arc<Descriptor>>>>,
    updates: AtomicUsize,
    errors: AtomicUsize,
    first_error: OnceLock<String>,
}

impl DescriptorJob {
    pub fn new(snapshot: JobSnapshot) -> Self {
        let rows = snapshot.parents.len();
        Self {
            snapshot,
            results: (0..rows).map(|_| OnceLock::new()).collect(),
            updates: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            first_error: OnceLock::new(),
        }
    }

    pub fn column_id(&self) -> ColumnId {
        self.snapshot.column_id
    }

    pub fn is_outdated(&self) -> bool {
        self.snapshot.outdated
    }

    /// Records written so far
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::Relaxed)
    }

    /// Records that failed so far
    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Compute the descriptor of record `row`
    ///
    /// An existing value is kept unless the job is outdated. Failures and
    /// handler panics leave a null descriptor and count as errors.
    pub(crate) fn process(&self, row: usize, metrics: &TableMetrics) {
        let snapshot = &self.snapshot;
        if !snapshot.outdated && snapshot.existing[row] {
            metrics.increment_descriptors_kept();
            return;
        }

        let outcome = match &snapshot.parents[row] {
            None => None,
            Some(encoded) => {
                let parent = ParentCell {
                    encoded,
                    coordinates: snapshot
                        .coordinates
                        .as_ref()
                        .and_then(|coordinates| coordinates[row].as_deref()),
                };
                let handler = &snapshot.handler;
                let result = panic::catch_unwind(AssertUnwindSafe(|| handler.compute(parent)))
                    .unwrap_or_else(|payload| Err(DescriptorError::HandlerPanic(panic_message(&payload))));

                match result {
                    Ok(descriptor) => {
                        metrics.increment_descriptors_computed();
                        Some(Arc::new(descriptor))
                    }
                    Err(err) => {
                        metrics.increment_descriptors_failed();
                        self.errors.fetch_add(1, Ordering::Relaxed);
                        let _ = self.first_error.set(err.to_string());
                        None
                    }
                }
            }
        };

        if outcome.is_some() || snapshot.existing[row] {
            self.updates.fetch_add(1, Ordering::Relaxed);
        }
        let _ = self.results[row].set(outcome);
    }

    /// Summarize the job once every worker has drained
    pub(crate) fn report(&self, original_indices: &[usize]) -> JobReport {
        let snapshot = &self.snapshot;
        let errors = self.errors();
        let error_message = (errors > 0).then(|| {
            format!(
                "{} descriptor of column '{}' could not be calculated for {} of {} rows: {}",
                snapshot.handler.short_name(),
                snapshot.column_name,
                errors,
                self.results.len(),
                self.first_error.get().map(String::as_str).unwrap_or("unknown error"),
            )
        });

        let results = self
            .results
            .iter()
            .enumerate()
            .filter_map(|(row, slot)| slot.get().map(|value| (original_indices[row], value.clone())))
            .collect();

        JobReport {
            column_id: snapshot.column_id,
            column_name: snapshot.column_name.clone(),
            version: snapshot.handler.version().to_string(),
            epoch: snapshot.epoch,
            updates: self.updates(),
            errors,
            error_message,
            results,
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Outcome of one job in a completed generation
#[derive(Debug, Clone)]
pub struct JobReport {
    pub column_id: ColumnId,
    pub column_name: String,
    /// Version tag to stamp on the column
    pub version: String,
    pub epoch: u64,
    pub updates: usize,
    pub errors: usize,
    /// One aggregate message if any record failed
    pub error_message: Option<String>,
    /// Written slots keyed by original record index; `None` is a null descriptor
    pub results: Vec<(usize, Option<Arc<Descriptor>>)>,
}
