//! Structured observability hooks for cycle lifecycle events.
//!
//! This module provides:
//! - Cycle-scoped tracing spans via [`cycle_span`], attached to the cycle
//!   future with `Instrument`
//! - Emission functions for stage completions, patch outcomes and validation
//!
//! Events are emitted at `info!` level (`warn!` for skipped patches and
//! regressions). Filter with `RUST_LOG`; pass `--json` to the CLI for
//! newline-delimited JSON.

use tracing::{info, warn};

/// Span carrying `cycle` for everything a cycle emits.
///
/// ```ignore
/// self.drive_cycle(4).instrument(cycle_span(4)).await
/// ```
pub fn cycle_span(cycle: u32) -> tracing::Span {
    tracing::info_span!("speechloop.cycle", cycle = cycle)
}

/// Emit event: cycle started in `phase` against the stored baseline.
pub fn emit_cycle_started(cycle: u32, phase: &str, baseline: Option<f64>) {
    info!(
        event = "cycle.started",
        cycle = cycle,
        phase = %phase,
        baseline = ?baseline,
    );
}

/// Emit event: corpus written.
pub fn emit_corpus_generated(cycle: u32, phase: &str, total: usize) {
    info!(event = "corpus.generated", cycle = cycle, phase = %phase, total = total);
}

/// Emit event: evaluation finished.
pub fn emit_evaluation_completed(cycle: u32, overall_score: f64, passed: usize, total: usize) {
    info!(
        event = "evaluation.completed",
        cycle = cycle,
        overall_score = overall_score,
        passed = passed,
        total = total,
    );
}

/// Emit event: patch committed to the artifact.
pub fn emit_patch_applied(cycle: u32, patch_id: &str, kind: &str, changed: bool) {
    info!(
        event = "patch.applied",
        cycle = cycle,
        patch_id = %patch_id,
        kind = %kind,
        changed = changed,
    );
}

/// Emit event: patch rejected (warning level).
pub fn emit_patch_skipped(cycle: u32, patch_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "patch.skipped", cycle = cycle, patch_id = %patch_id, error = %error);
}

/// Emit event: validation finished with its verdict.
pub fn emit_validation_completed(cycle: u32, overall_score: f64, score_change: f64, passed: bool) {
    if passed {
        info!(
            event = "validation.completed",
            cycle = cycle,
            overall_score = overall_score,
            score_change = score_change,
            passed = passed,
        );
    } else {
        warn!(
            event = "validation.regression",
            cycle = cycle,
            overall_score = overall_score,
            score_change = score_change,
            passed = passed,
        );
    }
}

/// Emit event: artifact restored from a cycle backup.
pub fn emit_rollback(cycle: u32, digest: &str) {
    warn!(event = "artifact.rolled_back", cycle = cycle, digest = %digest);
}

/// Emit event: cycle finished with duration and final baseline.
pub fn emit_cycle_finished(cycle: u32, duration_ms: u64, baseline: Option<f64>) {
    info!(
        event = "cycle.finished",
        cycle = cycle,
        duration_ms = duration_ms,
        baseline = ?baseline,
    );
}
