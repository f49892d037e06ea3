//! Human-readable renderings of evaluation, validation and cycle results.

use std::path::Path;

use crate::domain::{CycleResult, ErrorType, Result, ValidationRecord};
use crate::orchestrator::CycleReport;
use crate::storage;

fn percent(score: f64) -> String {
    format!("{:.2}%", score * 100.0)
}

/// Error types by descending count, taxonomy order on ties.
pub fn ranked_failure_patterns(result: &CycleResult) -> Vec<(ErrorType, usize)> {
    let mut ranked: Vec<(ErrorType, usize)> = result
        .failure_summary
        .iter()
        .map(|(error_type, count)| (*error_type, *count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

/// Human-readable summary written next to the results JSON.
pub fn render_summary_text(result: &CycleResult) -> String {
    let mut out = String::new();
    let title = format!("Cycle {} evaluation summary", result.cycle);
    out.push_str(&title);
    out.push('\n');
    out.push_str(&"=".repeat(title.len()));
    out.push_str("\n\n");
    out.push_str(&format!(
        "Overall score: {} ({}/{} passed)\n",
        percent(result.overall_score),
        result.passed,
        result.total
    ));
    out.push_str(&format!("Evaluated at: {}\n\n", result.timestamp.to_rfc3339()));

    out.push_str("Category scores:\n");
    for (category, score) in &result.category_scores {
        out.push_str(&format!("- {}: {}\n", category, percent(*score)));
    }

    if !result.failure_summary.is_empty() {
        out.push_str("\nTop failure patterns:\n");
        for (error_type, count) in ranked_failure_patterns(result) {
            out.push_str(&format!("- {}: {}\n", error_type, count));
        }
    }
    out
}

/// Write `cycle_<N>_summary.txt`.
pub fn write_summary_text(path: &Path, result: &CycleResult) -> Result<()> {
    storage::write_atomic(path, render_summary_text(result).as_bytes())
}

/// Markdown verdict for a validation record.
pub fn render_validation_md(record: &ValidationRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Cycle {} validation\n\n", record.cycle));
    let verdict = if record.validation_passed {
        "PASS"
    } else {
        "REGRESSION"
    };
    out.push_str(&format!("- verdict: **{}**\n", verdict));
    out.push_str(&format!(
        "- score: {} ({}/{})\n",
        percent(record.overall_score),
        record.passed,
        record.total
    ));
    match record.baseline_score {
        Some(baseline) => out.push_str(&format!(
            "- baseline: {}\n- change: {:+.2} pts\n",
            percent(baseline),
            record.score_change * 100.0
        )),
        None => out.push_str("- baseline: none\n"),
    }
    out
}

/// Markdown overview of one orchestrated cycle.
pub fn render_cycle_report_md(report: &CycleReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Cycle {} ({})\n\n", report.cycle, report.phase));
    out.push_str(&format!(
        "- corpus: {} examples in {} categories\n",
        report.corpus.total_examples,
        report.corpus.categories.len()
    ));
    out.push_str(&format!(
        "- evaluation: {} ({}/{})\n",
        percent(report.evaluation.overall_score),
        report.evaluation.passed,
        report.evaluation.total
    ));
    match (report.baseline_before, report.baseline_after) {
        (Some(before), Some(after)) => out.push_str(&format!(
            "- baseline: {} -> {}\n",
            percent(before),
            percent(after)
        )),
        (None, Some(after)) => out.push_str(&format!("- baseline: none -> {}\n", percent(after))),
        _ => out.push_str("- baseline: none\n"),
    }
    out.push_str(&format!("- duration: {} ms\n", report.duration_ms));

    if !report.patches.is_empty() {
        out.push_str("\n## Patches\n");
        for patch in &report.patches {
            let status = match (patch.applied, patch.changed) {
                (true, true) => "applied",
                (true, false) => "no-op",
                (false, _) => "skipped",
            };
            out.push_str(&format!("- [{}] {}", status, patch.description));
            if !patch.applied {
                out.push_str(&format!(" ({})", patch.message));
            }
            out.push('\n');
        }
    }

    if let Some(validation) = &report.validation {
        out.push('\n');
        out.push_str(&render_validation_md(validation).replacen("# ", "## ", 1));
    }
    if report.rolled_back {
        out.push_str("\nArtifact rolled back to its pre-cycle backup.\n");
    }
    out
}
