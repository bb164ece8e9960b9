//! Parallel similarity search
//!
//! Same shape as a descriptor generation: workers claim record indices from
//! one shared decrementing counter and write disjoint per-record slots.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use super::cancel::CancellationToken;
use super::errors::{DescriptorError, DescriptorResult};
use super::handler::{AnyDescriptorHandler, Descriptor};

/// Worker pool computing the similarity of every record to one query
pub struct SimilarityPool {
    worker_count: usize,
}

impl SimilarityPool {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
        }
    }

    /// Similarity of `query` to each entry of `descriptors`
    ///
    /// Records without a descriptor, or whose comparison panicked, get NaN.
    pub fn run(
        &self,
        handler: &dyn AnyDescriptorHandler,
        query: &Descriptor,
        descriptors: &[Option<Arc<Descriptor>>],
        cancel: &CancellationToken,
    ) -> DescriptorResult<Vec<f32>> {
        let rows = descriptors.len();
        let remaining = AtomicUsize::new(rows);
        let slots: Vec<AtomicU32> = (0..rows).map(|_| AtomicU32::new(f32::NAN.to_bits())).collect();
        let abort = AtomicBool::new(false);

        let spawned = thread::scope(|scope| -> DescriptorResult<()> {
            let (remaining, slots, abort) = (&remaining, &slots, &abort);
            for index in 0..self.worker_count.min(rows) {
                thread::Builder::new()
                    .name(format!("similarity-worker-{}", index))
                    .spawn_scoped(scope, move || loop {
                        if cancel.is_cancelled() || abort.load(Ordering::Acquire) {
                            break;
                        }
                        let Ok(previous) = remaining
                            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                        else {
                            break;
                        };
                        let row = previous - 1;
                        if let Some(descriptor) = &descriptors[row] {
                            let value = panic::catch_unwind(AssertUnwindSafe(|| {
                                handler.similarity(query, descriptor)
                            }))
                            .unwrap_or(f32::NAN);
                            slots[row].store(value.to_bits(), Ordering::Relaxed);
                        }
                    })
                    .map_err(|err| {
                        abort.store(true, Ordering::Release);
                        DescriptorError::SpawnFailed(err.to_string())
                    })?;
            }
            Ok(())
        });
        spawned?;

        if cancel.is_cancelled() {
            return Err(DescriptorError::Cancelled);
        }
        Ok(slots
            .into_iter()
            .map(|slot| f32::from_bits(slot.into_inner()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorHandler, DescriptorKind, ParentCell};

    struct Fingerprints;

    impl DescriptorHandler for Fingerprints {
        type Object = ();

        fn short_name(&self) -> &str {
            "Fp"
        }

        fn version(&self) -> &str {
            "1"
        }

        fn kind(&self) -> DescriptorKind {
            DescriptorKind::BinaryFingerprint
        }

        fn decode_object(&self, _parent: ParentCell<'_>) -> DescriptorResult<()> {
            Ok(())
        }

        fn create_descriptor(&self, _object: &()) -> DescriptorResult<Descriptor> {
            Ok(Descriptor::BinaryFingerprint(vec![0]))
        }
    }

    fn fp(word: u64) -> Option<Arc<Descriptor>> {
        Some(Arc::new(Descriptor::BinaryFingerprint(vec![word])))
    }

    #[test]
    fn test_similarity_per_record() {
        let pool = SimilarityPool::new(3);
        let query = Descriptor::BinaryFingerprint(vec![0b11]);
        let records = vec![fp(0b11), None, fp(0b01), fp(0b100)];

        let values = pool
            .run(&Fingerprints, &query, &records, &CancellationToken::new())
            .unwrap();

        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 0.5);
        assert_eq!(values[3], 0.0);
    }

    #[test]
    fn test_cancelled_search() {
        let pool = SimilarityPool::new(2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let query = Descriptor::BinaryFingerprint(vec![1]);

        let result = pool.run(&Fingerprints, &query, &[fp(1)], &cancel);
        assert_eq!(result, Err(DescriptorError::Cancelled));
    }

    #[test]
    fn test_empty_input() {
        let pool = SimilarityPool::new(2);
        let query = Descriptor::BinaryFingerprint(vec![1]);
        assert!(pool
            .run(&Fingerprints, &query, &[], &CancellationToken::new())
            .unwrap()
            .is_empty());
    }
}
