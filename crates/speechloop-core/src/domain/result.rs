//! Evaluation outcomes: failure records, cycle results, validation records.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::case::TestCase;

/// Version of the [`ErrorType`] taxonomy written into every result file.
pub const TAXONOMY_VERSION: &str = "1";

/// Closed taxonomy of failure causes.
///
/// Declaration order doubles as the tie-break order when two error types
/// are equally frequent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    DerivativeNotation,
    PartialDerivativeNotation,
    EqualsVsIs,
    PowerNotation,
    FractionNames,
    Exception,
    Other,
}

impl ErrorType {
    pub const ALL: [ErrorType; 7] = [
        ErrorType::DerivativeNotation,
        ErrorType::PartialDerivativeNotation,
        ErrorType::EqualsVsIs,
        ErrorType::PowerNotation,
        ErrorType::FractionNames,
        ErrorType::Exception,
        ErrorType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DerivativeNotation => "derivative_notation",
            Self::PartialDerivativeNotation => "partial_derivative_notation",
            Self::EqualsVsIs => "equals_vs_is",
            Self::PowerNotation => "power_notation",
            Self::FractionNames => "fraction_names",
            Self::Exception => "exception",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub category: String,
    pub expression: String,
    #[serde(rename = "expected")]
    pub expected_speech: String,
    #[serde(rename = "actual")]
    pub actual_speech: String,
    pub error_type: ErrorType,
    pub cycle: u32,
    /// Engine error text for `exception` failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FailureRecord {
    pub fn mismatch(case: &TestCase, actual: String, error_type: ErrorType, cycle: u32) -> Self {
        Self {
            category: case.category.clone(),
            expression: case.expression.clone(),
            expected_speech: case.expected_speech.clone(),
            actual_speech: actual,
            error_type,
            cycle,
            detail: None,
        }
    }

    pub fn exception(case: &TestCase, message: String, cycle: u32) -> Self {
        Self {
            category: case.category.clone(),
            expression: case.expression.clone(),
            expected_speech: case.expected_speech.clone(),
            actual_speech: format!("<exception: {}>", message),
            error_type: ErrorType::Exception,
            cycle,
            detail: Some(message),
        }
    }
}

/// Per-case evaluation outcome; `failure` is `None` when the case passed.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseOutcome {
    pub category: String,
    pub failure: Option<FailureRecord>,
}

impl CaseOutcome {
    pub fn passed(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            failure: None,
        }
    }

    pub fn failed(record: FailureRecord) -> Self {
        Self {
            category: record.category.clone(),
            failure: Some(record),
        }
    }
}

/// Aggregate outcome of evaluating one corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle: u32,
    pub timestamp: DateTime<Utc>,
    pub taxonomy_version: String,
    pub overall_score: f64,
    pub passed: usize,
    pub total: usize,
    /// Pass ratio per category. Categories with no cases are absent.
    pub category_scores: BTreeMap<String, f64>,
    pub failures: Vec<FailureRecord>,
    pub failure_summary: BTreeMap<ErrorType, usize>,
}

impl CycleResult {
    /// Fold per-case outcomes into scores, counts and the failure summary.
    pub fn aggregate(
        cycle: u32,
        timestamp: DateTime<Utc>,
        outcomes: impl IntoIterator<Item = CaseOutcome>,
    ) -> Self {
        let mut tallies: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        let mut failures = Vec::new();
        let mut failure_summary = BTreeMap::new();

        for outcome in outcomes {
            let tally = tallies.entry(outcome.category).or_insert((0, 0));
            tally.1 += 1;
            match outcome.failure {
                None => tally.0 += 1,
                Some(record) => {
                    *failure_summary.entry(record.error_type).or_insert(0) += 1;
                    failures.push(record);
                }
            }
        }

        let passed = tallies.values().map(|(p, _)| p).sum();
        let total = tallies.values().map(|(_, t)| t).sum();
        let category_scores = tallies
            .into_iter()
            .map(|(name, (p, t))| (name, p as f64 / t as f64))
            .collect();

        Self {
            cycle,
            timestamp,
            taxonomy_version: TAXONOMY_VERSION.to_string(),
            overall_score: if total == 0 {
                0.0
            } else {
                passed as f64 / total as f64
            },
            passed,
            total,
            category_scores,
            failures,
            failure_summary,
        }
    }

    pub fn failed(&self) -> usize {
        self.total - self.passed
    }

    pub fn score(&self, category: &str) -> Option<f64> {
        self.category_scores.get(category).copied()
    }

    pub fn failures_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a FailureRecord> {
        self.failures.iter().filter(move |f| f.category == category)
    }
}

/// Post-patch regression check for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub cycle: u32,
    pub timestamp: DateTime<Utc>,
    pub overall_score: f64,
    pub baseline_score: Option<f64>,
    pub score_change: f64,
    pub regression_found: bool,
    pub validation_passed: bool,
    pub passed: usize,
    pub total: usize,
    pub failures: Vec<FailureRecord>,
}

impl ValidationRecord {
    /// Compare a fresh evaluation against `baseline`.
    ///
    /// Without a baseline there is nothing to regress from: the record
    /// passes and `score_change` is zero.
    pub fn compare(result: &CycleResult, baseline: Option<f64>) -> Self {
        let regression_found = baseline.is_some_and(|b| result.overall_score < b);
        Self {
            cycle: result.cycle,
            timestamp: result.timestamp,
            overall_score: result.overall_score,
            baseline_score: baseline,
            score_change: baseline.map_or(0.0, |b| result.overall_score - b),
            regression_found,
            validation_passed: !regression_found,
            passed: result.passed,
            total: result.total,
            failures: result.failures.clone(),
        }
    }
}
