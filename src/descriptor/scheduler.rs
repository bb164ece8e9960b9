//! Descriptor scheduler
//!
//! Recomputes derived descriptor columns on a pool of worker threads.
//!
//! Protocol of one generation:
//! 1. The owner snapshots every incomplete or outdated descriptor column
//!    into a fixed job list and calls [`DescriptorScheduler::start`].
//! 2. `W` workers claim record indices from one shared, decrementing
//!    counter until it is exhausted or the cancellation token is set.
//! 3. The worker that drives the completion counter to zero builds the
//!    generation outcome under the outcome lock and wakes any waiter.
//! 4. The owner collects the outcome ([`DescriptorScheduler::try_collect`]
//!    or [`DescriptorScheduler::wait`]) and integrates it into the table.
//!    An owner that sleeps between tasks installs a [`DrainNotifier`] so the
//!    finalizing worker can wake it.
//!
//! Requests arriving while a generation runs are coalesced into a single
//! rerun flag. A cancelled generation is discarded wholesale.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use uuid::Uuid;

use crate::observability::{log_event_with_fields, Event, TableMetrics};

use super::cancel::CancellationToken;
use super::errors::{DescriptorError, DescriptorResult};
use super::job::{DescriptorJob, JobReport};

/// Called by the finalizing worker once a generation completed
pub type DrainNotifier = Arc<dyn Fn() + Send + Sync>;

/// Result of a drained generation
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub id: Uuid,
    pub jobs: Vec<JobReport>,
}

/// How a generation ended
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    /// All records processed; results are ready to integrate
    Completed(GenerationReport),
    /// Stopped before completion; nothing may be integrated
    Cancelled { id: Uuid },
}

/// Shared state of one generation
struct Generation {
    id: Uuid,
    jobs: Vec<DescriptorJob>,
    original_indices: Vec<usize>,
    remaining: AtomicUsize,
    active_workers: AtomicUsize,
    cancel: CancellationToken,
    outcome: Mutex<Option<GenerationOutcome>>,
    drained: Condvar,
    metrics: Arc<TableMetrics>,
    notifier: Option<DrainNotifier>,
}

/// Decrements the completion counter even if a worker unwinds
struct CompletionGuard<'a>(&'a Generation);

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_worker();
    }
}

impl Generation {
    /// Next unclaimed record index, counting down
    fn claim(&self) -> Option<usize> {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }

    fn run_worker(&self) {
        let _guard = CompletionGuard(self);
        while !self.cancel.is_cancelled() {
            let Some(row) = self.claim() else {
                break;
            };
            for job in &self.jobs {
                job.process(row, &self.metrics);
            }
        }
    }

    fn finish_worker(&self) {
        if self.active_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finalize();
        }
    }

    fn finalize(&self) {
        let outcome = if self.cancel.is_cancelled() {
            self.metrics.increment_generations_cancelled();
            GenerationOutcome::Cancelled { id: self.id }
        } else {
            self.metrics.increment_generations_completed();
            GenerationOutcome::Completed(GenerationReport {
                id: self.id,
                jobs: self
                    .jobs
                    .iter()
                    .map(|job| job.report(&self.original_indices))
                    .collect(),
            })
        };

        let completed = matches!(outcome, GenerationOutcome::Completed(_));
        {
            let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = Some(outcome);
            self.drained.notify_all();
        }
        if completed {
            if let Some(notify) = &self.notifier {
                notify();
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn wait(&self) -> GenerationOutcome {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = slot.take() {
                return outcome;
            }
            slot = self
                .drained
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct Running {
    generation: Arc<Generation>,
    workers: Vec<JoinHandle<()>>,
}

/// Worker-pool engine for derived descriptor columns
pub struct DescriptorScheduler {
    worker_count: usize,
    metrics: Arc<TableMetrics>,
    running: Option<Running>,
    rerun_requested: bool,
    notifier: Option<DrainNotifier>,
}

impl DescriptorScheduler {
    pub fn new(worker_count: usize, metrics: Arc<TableMetrics>) -> Self {
        Self {
            worker_count: worker_count.max(1),
            metrics,
            running: None,
            rerun_requested: false,
            notifier: None,
        }
    }

    /// Install or clear the hook run when a later generation completes
    pub fn set_drain_notifier(&mut self, notifier: Option<DrainNotifier>) {
        self.notifier = notifier;
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// True while a generation has not been collected
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Coalesce an update request into the running generation
    pub fn request_rerun(&mut self) {
        self.rerun_requested = true;
    }

    /// Clear and return the coalesced rerun request
    pub fn take_rerun_request(&mut self) -> bool {
        std::mem::take(&mut self.rerun_requested)
    }

    /// Spawn the workers of a new generation
    ///
    /// `original_indices[i]` is the stable index of the record at physical
    /// row `i` when the jobs were snapshotted.
    pub fn start(
        &mut self,
        jobs: Vec<DescriptorJob>,
        original_indices: Vec<usize>,
    ) -> DescriptorResult<Uuid> {
        if self.running.is_some() {
            self.stop();
        }

        let rows = original_indices.len();
        let workers = self.worker_count.min(rows);
        let generation = Arc::new(Generation {
            id: Uuid::new_v4(),
            remaining: AtomicUsize::new(rows),
            active_workers: AtomicUsize::new(workers),
            cancel: CancellationToken::new(),
            outcome: Mutex::new(None),
            drained: Condvar::new(),
            metrics: Arc::clone(&self.metrics),
            notifier: self.notifier.clone(),
            jobs,
            original_indices,
        });
        let id = generation.id;

        self.metrics.increment_generations_started();
        log_event_with_fields(
            Event::DescriptorGenerationStart,
            &[
                ("generation", &id.to_string()),
                ("jobs", &generation.jobs.len().to_string()),
                ("rows", &rows.to_string()),
                ("workers", &workers.to_string()),
            ],
        );

        if workers == 0 {
            generation.finalize();
        }

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let worker = Arc::clone(&generation);
            let spawned = thread::Builder::new()
                .name(format!("descriptor-worker-{}", index))
                .spawn(move || worker.run_worker());

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    generation.cancel.cancel();
                    for _ in index..workers {
                        generation.finish_worker();
                    }
                    self.running = Some(Running {
                        generation,
                        workers: handles,
                    });
                    self.stop();
                    return Err(DescriptorError::SpawnFailed(err.to_string()));
                }
            }
        }

        self.running = Some(Running {
            generation,
            workers: handles,
        });
        Ok(id)
    }

    /// Take the outcome of a drained generation without blocking
    pub fn try_collect(&mut self) -> Option<GenerationOutcome> {
        let finished = self
            .running
            .as_ref()
            .map(|running| running.generation.is_finished())
            .unwrap_or(false);
        if !finished {
            return None;
        }
        self.running.take().map(Self::join)
    }

    /// Block until the running generation drains and take its outcome
    pub fn wait(&mut self) -> Option<GenerationOutcome> {
        self.running.take().map(Self::join)
    }

    /// Cancel the running generation, join its workers and discard it
    ///
    /// Returns true if a generation was running or a rerun was pending.
    pub fn stop(&mut self) -> bool {
        let pending = std::mem::take(&mut self.rerun_requested);
        match self.running.take() {
            Some(running) => {
                running.generation.cancel.cancel();
                let outcome = Self::join(running);
                let id = match outcome {
                    GenerationOutcome::Cancelled { id } => id,
                    GenerationOutcome::Completed(report) => report.id,
                };
                log_event_with_fields(
                    Event::DescriptorGenerationCancelled,
                    &[("generation", &id.to_string())],
                );
                true
            }
            None => pending,
        }
    }

    fn join(running: Running) -> GenerationOutcome {
        let outcome = running.generation.wait();
        for handle in running.workers {
            if handle.join().is_err() {
                log_event_with_fields(
                    Event::DescriptorWorkerPanicked,
                    &[("generation", &running.generation.id.to_string())],
                );
            }
        }
        outcome
    }
}

impl Drop for DescriptorScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.generation.cancel.cancel();
            Self::join(running);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        Descriptor, DescriptorHandler, DescriptorKind, DescriptorResult, JobSnapshot, ParentCell,
        SharedHandler,
    };
    use crate::table::ColumnRegistry;
    use std::time::Duration;

    struct ByteSum {
        delay: Duration,
    }

    impl DescriptorHandler for ByteSum {
        type Object = Vec<u8>;

        fn short_name(&self) -> &str {
            "ByteSum"
        }

        fn version(&self) -> &str {
            "1"
        }

        fn kind(&self) -> DescriptorKind {
            DescriptorKind::IntVector
        }

        fn decode_object(&self, parent: ParentCell<'_>) -> DescriptorResult<Vec<u8>> {
            if parent.encoded.first() == Some(&b'!') {
                return Err(DescriptorError::Decode("bang".into()));
            }
            Ok(parent.encoded.to_vec())
        }

        fn create_descriptor(&self, object: &Vec<u8>) -> DescriptorResult<Descriptor> {
            std::thread::sleep(self.delay);
            Ok(Descriptor::IntVector(vec![object.iter().map(|b| *b as i32).sum()]))
        }
    }

    fn job(cells: &[&str], existing: Vec<bool>, delay: Duration) -> DescriptorJob {
        let mut columns = ColumnRegistry::new();
        columns.push("fp".into());
        let handler: SharedHandler = Arc::new(ByteSum { delay });
        DescriptorJob::new(JobSnapshot {
            column_id: columns.get(0).unwrap().id(),
            column_name: "fp".into(),
            handler,
            outdated: false,
            epoch: 0,
            parents: cells
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| Arc::from(cell.as_bytes())))
                .collect(),
            coordinates: None,
            existing,
        })
    }

    fn scheduler(workers: usize) -> DescriptorScheduler {
        DescriptorScheduler::new(workers, Arc::new(TableMetrics::new()))
    }

    #[test]
    fn test_generation_completes_with_all_rows() {
        let mut scheduler = scheduler(3);
        let cells: Vec<String> = (0..50).map(|i| format!("r{}", i)).collect();
        let refs: Vec<&str> = cells.iter().map(String::as_str).collect();
        scheduler
            .start(vec![job(&refs, vec![false; 50], Duration::ZERO)], (0..50).collect())
            .unwrap();

        let GenerationOutcome::Completed(report) = scheduler.wait().unwrap() else {
            panic!("generation was cancelled");
        };
        assert_eq!(report.jobs[0].updates, 50);
        assert_eq!(report.jobs[0].results.len(), 50);
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_failures_counted_not_fatal() {
        let mut scheduler = scheduler(2);
        scheduler
            .start(
                vec![job(&["a", "!x", "", "b"], vec![false; 4], Duration::ZERO)],
                vec![0, 1, 2, 3],
            )
            .unwrap();

        let GenerationOutcome::Completed(report) = scheduler.wait().unwrap() else {
            panic!("generation was cancelled");
        };
        let job = &report.jobs[0];
        assert_eq!(job.errors, 1);
        assert_eq!(job.updates, 2);
        assert!(job.error_message.as_deref().unwrap().contains("1 of 4 rows"));
    }

    #[test]
    fn test_existing_values_kept() {
        let mut scheduler = scheduler(1);
        scheduler
            .start(vec![job(&["a", "b"], vec![true, false], Duration::ZERO)], vec![7, 8])
            .unwrap();

        let GenerationOutcome::Completed(report) = scheduler.wait().unwrap() else {
            panic!("generation was cancelled");
        };
        let results = &report.jobs[0].results;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 8);
    }

    #[test]
    fn test_empty_generation_finishes_immediately() {
        let mut scheduler = scheduler(4);
        scheduler.start(vec![job(&[], vec![], Duration::ZERO)], vec![]).unwrap();
        assert!(matches!(scheduler.try_collect(), Some(GenerationOutcome::Completed(_))));
    }

    #[test]
    fn test_stop_discards_generation() {
        let mut scheduler = scheduler(2);
        let cells = vec!["x"; 200];
        scheduler
            .start(
                vec![job(&cells, vec![false; 200], Duration::from_millis(2))],
                (0..200).collect(),
            )
            .unwrap();

        assert!(scheduler.stop());
        assert!(!scheduler.is_running());
        assert!(scheduler.try_collect().is_none());
    }

    #[test]
    fn test_notifier_fires_on_completion_only() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let mut scheduler = scheduler(2);
        scheduler.set_drain_notifier(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        scheduler
            .start(vec![job(&["a", "b", "c"], vec![false; 3], Duration::ZERO)], vec![0, 1, 2])
            .unwrap();
        assert!(matches!(scheduler.wait(), Some(GenerationOutcome::Completed(_))));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let cells = vec!["x"; 200];
        scheduler
            .start(
                vec![job(&cells, vec![false; 200], Duration::from_millis(2))],
                (0..200).collect(),
            )
            .unwrap();
        assert!(scheduler.stop());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rerun_request_coalesces() {
        let mut scheduler = scheduler(1);
        scheduler.request_rerun();
        scheduler.request_rerun();
        assert!(scheduler.take_rerun_request());
        assert!(!scheduler.take_rerun_request());
    }
}
