//! Global atomic counters for loop observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a cycle).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    cases_evaluated: AtomicU64,
    patches_applied: AtomicU64,
    patches_skipped: AtomicU64,
    regressions_detected: AtomicU64,
    cycles_completed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cases_evaluated: AtomicU64::new(0),
            patches_applied: AtomicU64::new(0),
            patches_skipped: AtomicU64::new(0),
            regressions_detected: AtomicU64::new(0),
            cycles_completed: AtomicU64::new(0),
        }
    }

    pub fn inc_cases_evaluated(&self) {
        self.cases_evaluated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cases_evaluated", "counter incremented");
    }

    pub fn inc_patches_applied(&self) {
        self.patches_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "patches_applied", "counter incremented");
    }

    pub fn inc_patches_skipped(&self) {
        self.patches_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "patches_skipped", "counter incremented");
    }

    pub fn inc_regressions(&self) {
        self.regressions_detected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "regressions_detected", "counter incremented");
    }

    pub fn inc_cycles_completed(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cycles_completed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            cases_evaluated = self.cases_evaluated(),
            patches_applied = self.patches_applied(),
            patches_skipped = self.patches_skipped(),
            regressions_detected = self.regressions_detected(),
            cycles_completed = self.cycles_completed(),
        );
    }

    pub fn cases_evaluated(&self) -> u64 {
        self.cases_evaluated.load(Ordering::Relaxed)
    }

    pub fn patches_applied(&self) -> u64 {
        self.patches_applied.load(Ordering::Relaxed)
    }

    pub fn patches_skipped(&self) -> u64 {
        self.patches_skipped.load(Ordering::Relaxed)
    }

    pub fn regressions_detected(&self) -> u64 {
        self.regressions_detected.load(Ordering::Relaxed)
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.cases_evaluated.store(0, Ordering::Relaxed);
        self.patches_applied.store(0, Ordering::Relaxed);
        self.patches_skipped.store(0, Ordering::Relaxed);
        self.regressions_detected.store(0, Ordering::Relaxed);
        self.cycles_completed.store(0, Ordering::Relaxed);
    }
}
