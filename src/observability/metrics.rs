//! Table metrics
//!
//! Counters only, monotonic, shared between the owner context and
//! descriptor workers. Relaxed ordering: values are exact once the
//! generation that wrote them has been joined.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one table
#[derive(Debug, Default)]
pub struct TableMetrics {
    descriptors_computed: AtomicU64,
    descriptors_failed: AtomicU64,
    descriptors_kept: AtomicU64,
    generations_started: AtomicU64,
    generations_completed: AtomicU64,
    generations_cancelled: AtomicU64,
    sorts: AtomicU64,
    similarity_searches: AtomicU64,
}

/// Point-in-time copy of [`TableMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub descriptors_computed: u64,
    pub descriptors_failed: u64,
    pub descriptors_kept: u64,
    pub generations_started: u64,
    pub generations_completed: u64,
    pub generations_cancelled: u64,
    pub sorts: u64,
    pub similarity_searches: u64,
}

impl TableMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_descriptors_computed(&self) {
        self.descriptors_computed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_descriptors_failed(&self) {
        self.descriptors_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_descriptors_kept(&self) {
        self.descriptors_kept.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_generations_started(&self) {
        self.generations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_generations_completed(&self) {
        self.generations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_generations_cancelled(&self) {
        self.generations_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sorts(&self) {
        self.sorts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_similarity_searches(&self) {
        self.similarity_searches.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            descriptors_computed: self.descriptors_computed.load(Ordering::Relaxed),
            descriptors_failed: self.descriptors_failed.load(Ordering::Relaxed),
            descriptors_kept: self.descriptors_kept.load(Ordering::Relaxed),
            generations_started: self.generations_started.load(Ordering::Relaxed),
            generations_completed: self.generations_completed.load(Ordering::Relaxed),
            generations_cancelled: self.generations_cancelled.load(Ordering::Relaxed),
            sorts: self.sorts.load(Ordering::Relaxed),
            similarity_searches: self.similarity_searches.load(Ordering::Relaxed),
        }
    }
}
