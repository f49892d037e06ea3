//! Orchestrator state persisted between cycles.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cross-cycle bookkeeping, stored as `state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleState {
    /// Last cycle that started (0 before the first cycle).
    pub cycle_number: u32,
    /// Score of the last accepted evaluation.
    pub baseline_score: Option<f64>,
    pub current_corpus: Option<PathBuf>,
    pub current_results: Option<PathBuf>,
    pub updated_at: DateTime<Utc>,
}

impl Default for CycleState {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleState {
    pub fn new() -> Self {
        Self {
            cycle_number: 0,
            baseline_score: None,
            current_corpus: None,
            current_results: None,
            updated_at: Utc::now(),
        }
    }

    pub fn next_cycle(&self) -> u32 {
        self.cycle_number + 1
    }

    pub fn begin(&mut self, cycle: u32, corpus: PathBuf) {
        self.cycle_number = cycle;
        self.current_corpus = Some(corpus);
        self.current_results = None;
        self.updated_at = Utc::now();
    }

    pub fn record_results(&mut self, results: PathBuf) {
        self.current_results = Some(results);
        self.updated_at = Utc::now();
    }

    /// Accept `score` as the new baseline.
    pub fn advance(&mut self, score: f64) {
        self.baseline_score = Some(score);
        self.updated_at = Utc::now();
    }
}
