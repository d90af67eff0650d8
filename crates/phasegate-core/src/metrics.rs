//! Global atomic counters for phasegate observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a workflow cycle).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    tasks_executed: AtomicU64,
    tasks_failed: AtomicU64,
    boundary_denials: AtomicU64,
    permission_cache_hits: AtomicU64,
    rollbacks: AtomicU64,
    inheritance_cache_hits: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            tasks_executed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            boundary_denials: AtomicU64::new(0),
            permission_cache_hits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            inheritance_cache_hits: AtomicU64::new(0),
        }
    }

    pub fn inc_tasks_executed(&self) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tasks_executed", "counter incremented");
    }

    pub fn inc_tasks_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tasks_failed", "counter incremented");
    }

    pub fn inc_boundary_denials(&self) {
        self.boundary_denials.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "boundary_denials", "counter incremented");
    }

    pub fn inc_permission_cache_hits(&self) {
        self.permission_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rollbacks(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rollbacks", "counter incremented");
    }

    pub fn inc_inheritance_cache_hits(&self) {
        self.inheritance_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            tasks_executed = self.tasks_executed(),
            tasks_failed = self.tasks_failed(),
            boundary_denials = self.boundary_denials(),
            permission_cache_hits = self.permission_cache_hits(),
            rollbacks = self.rollbacks(),
            inheritance_cache_hits = self.inheritance_cache_hits(),
        );
    }

    pub fn tasks_executed(&self) -> u64 {
        self.tasks_executed.load(Ordering::Relaxed)
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    pub fn boundary_denials(&self) -> u64 {
        self.boundary_denials.load(Ordering::Relaxed)
    }

    pub fn permission_cache_hits(&self) -> u64 {
        self.permission_cache_hits.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    pub fn inheritance_cache_hits(&self) -> u64 {
        self.inheritance_cache_hits.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.tasks_executed.store(0, Ordering::Relaxed);
        self.tasks_failed.store(0, Ordering::Relaxed);
        self.boundary_denials.store(0, Ordering::Relaxed);
        self.permission_cache_hits.store(0, Ordering::Relaxed);
        self.rollbacks.store(0, Ordering::Relaxed);
        self.inheritance_cache_hits.store(0, Ordering::Relaxed);
    }
}
