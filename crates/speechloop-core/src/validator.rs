//! Post-patch regression check.
//!
//! Re-evaluates a corpus against the patched artifact and compares the
//! score with a baseline. Never modifies the artifact.

use std::path::Path;

use crate::domain::{CycleResult, Result, ValidationRecord};
use crate::metrics::METRICS;
use crate::obs;
use crate::runner::EvaluationRunner;
use crate::storage::{self, Layout};

#[derive(Clone)]
pub struct RegressionValidator {
    runner: EvaluationRunner,
    layout: Layout,
}

impl RegressionValidator {
    pub fn new(runner: EvaluationRunner, layout: Layout) -> Self {
        Self { runner, layout }
    }

    /// Evaluate `corpus_path` for `cycle` and compare against `baseline`.
    ///
    /// The record is persisted to `validation/cycle_<N>_validation.json`.
    pub async fn validate(
        &self,
        cycle: u32,
        corpus_path: &Path,
        baseline: Option<f64>,
    ) -> Result<ValidationRecord> {
        let corpus = EvaluationRunner::load_corpus(corpus_path)?;
        let result = self.runner.evaluate(cycle, &corpus).await?;
        self.persist(cycle, ValidationRecord::compare(&result, baseline))
    }

    /// Record a cycle that needed no patches: `result` is compared with its
    /// own score, so the record always passes. Nothing is re-evaluated.
    pub fn record_clean(&self, cycle: u32, result: &CycleResult) -> Result<ValidationRecord> {
        self.persist(cycle, ValidationRecord::compare(result, Some(result.overall_score)))
    }

    fn persist(&self, cycle: u32, record: ValidationRecord) -> Result<ValidationRecord> {
        storage::write_json(&self.layout.validation_path(cycle), &record)?;
        if record.regression_found {
            METRICS.inc_regressions();
        }
        obs::emit_validation_completed(
            cycle,
            record.overall_score,
            record.score_change,
            record.validation_passed,
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Corpus, TestCase};
    use speechloop_engine::{ArtifactEngineLoader, RuleArtifact};
    use std::sync::Arc;

    fn fixture(cases: &[(&str, &str, &str)]) -> (tempfile::TempDir, Layout, RegressionValidator) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        RuleArtifact::reference()
            .save(&layout.default_artifact_path())
            .unwrap();

        let mut corpus = Corpus::new();
        for (category, expression, expected) in cases {
            corpus.push(TestCase::new(*category, *expression, *expected));
        }
        storage::write_json(&layout.corpus_path(1), &corpus).unwrap();

        let runner = EvaluationRunner::new(
            Arc::new(ArtifactEngineLoader),
            layout.default_artifact_path(),
            layout.clone(),
        );
        let validator = RegressionValidator::new(runner, layout.clone());
        (dir, layout, validator)
    }

    #[tokio::test]
    async fn score_below_baseline_is_a_regression() {
        let (_dir, layout, validator) = fixture(&[
            ("arithmetic", "6 * 7", "six times seven"),
            ("arithmetic", "2 + 3 = 5", "two plus three is five"),
        ]);

        let record = validator
            .validate(1, &layout.corpus_path(1), Some(1.0))
            .await
            .unwrap();
        assert!(record.regression_found);
        assert!(!record.validation_passed);
        assert!((record.score_change + 0.5).abs() < 1e-9);

        let persisted: ValidationRecord = storage::read_json(&layout.validation_path(1)).unwrap();
        assert_eq!(persisted, record);
    }

    #[tokio::test]
    async fn equal_score_passes() {
        let (_dir, layout, validator) = fixture(&[("arithmetic", "6 * 7", "six times seven")]);
        let record = validator
            .validate(1, &layout.corpus_path(1), Some(1.0))
            .await
            .unwrap();
        assert!(record.validation_passed);
        assert_eq!(record.score_change, 0.0);
    }

    #[tokio::test]
    async fn validation_does_not_modify_artifact() {
        let (_dir, layout, validator) = fixture(&[("algebra", "x^2", "x squared")]);
        let before = std::fs::read(layout.default_artifact_path()).unwrap();
        validator
            .validate(1, &layout.corpus_path(1), None)
            .await
            .unwrap();
        assert_eq!(std::fs::read(layout.default_artifact_path()).unwrap(), before);
    }

    #[test]
    fn clean_cycle_still_persists_a_passing_record() {
        let (_dir, layout, validator) = fixture(&[("arithmetic", "6 * 7", "six times seven")]);
        let result = CycleResult::aggregate(
            1,
            chrono::Utc::now(),
            [crate::domain::CaseOutcome::passed("arithmetic")],
        );

        let record = validator.record_clean(1, &result).unwrap();
        assert!(record.validation_passed);
        assert_eq!(record.baseline_score, Some(1.0));
        assert_eq!(record.score_change, 0.0);

        let persisted: ValidationRecord = storage::read_json(&layout.validation_path(1)).unwrap();
        assert_eq!(persisted, record);
    }
}
