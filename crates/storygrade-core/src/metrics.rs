//! Global atomic counters for evaluation observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a batch finishes).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free atomic counters.
pub struct Metrics {
    evaluations_started: AtomicU64,
    evaluations_joined: AtomicU64,
    evaluations_rated: AtomicU64,
    evaluations_failed: AtomicU64,
    evaluations_cancelled: AtomicU64,
    stale_completions: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            evaluations_started: AtomicU64::new(0),
            evaluations_joined: AtomicU64::new(0),
            evaluations_rated: AtomicU64::new(0),
            evaluations_failed: AtomicU64::new(0),
            evaluations_cancelled: AtomicU64::new(0),
            stale_completions: AtomicU64::new(0),
        }
    }

    /// A new job was created for a story.
    pub fn inc_started(&self) {
        self.evaluations_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_started", "counter incremented");
    }

    /// A request attached to an already in-flight job.
    pub fn inc_joined(&self) {
        self.evaluations_joined.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_joined", "counter incremented");
    }

    pub fn inc_rated(&self) {
        self.evaluations_rated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_rated", "counter incremented");
    }

    pub fn inc_failed(&self) {
        self.evaluations_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_failed", "counter incremented");
    }

    pub fn inc_cancelled(&self) {
        self.evaluations_cancelled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_cancelled", "counter incremented");
    }

    /// A completion arrived for a job that is no longer current.
    pub fn inc_stale(&self) {
        self.stale_completions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stale_completions", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a batch, CLI exit, etc.)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            evaluations_started = self.evaluations_started(),
            evaluations_joined = self.evaluations_joined(),
            evaluations_rated = self.evaluations_rated(),
            evaluations_failed = self.evaluations_failed(),
            evaluations_cancelled = self.evaluations_cancelled(),
            stale_completions = self.stale_completions(),
        );
    }

    pub fn evaluations_started(&self) -> u64 {
        self.evaluations_started.load(Ordering::Relaxed)
    }

    pub fn evaluations_joined(&self) -> u64 {
        self.evaluations_joined.load(Ordering::Relaxed)
    }

    pub fn evaluations_rated(&self) -> u64 {
        self.evaluations_rated.load(Ordering::Relaxed)
    }

    pub fn evaluations_failed(&self) -> u64 {
        self.evaluations_failed.load(Ordering::Relaxed)
    }

    pub fn evaluations_cancelled(&self) -> u64 {
        self.evaluations_cancelled.load(Ordering::Relaxed)
    }

    pub fn stale_completions(&self) -> u64 {
        self.stale_completions.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.evaluations_started.store(0, Ordering::Relaxed);
        self.evaluations_joined.store(0, Ordering::Relaxed);
        self.evaluations_rated.store(0, Ordering::Relaxed);
        self.evaluations_failed.store(0, Ordering::Relaxed);
        self.evaluations_cancelled.store(0, Ordering::Relaxed);
        self.stale_completions.store(0, Ordering::Relaxed);
    }
}
