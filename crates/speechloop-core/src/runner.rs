//! Corpus evaluation against the current engine artifact.
//!
//! The engine is loaded once per run and shared across workers. Each case
//! runs on the blocking pool, so an engine error or panic is contained to
//! that case and recorded as an `exception` failure.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use speechloop_engine::{EngineLoader, Naturalizer};
use tokio::task::JoinError;
use tracing::debug;

use crate::classify::classify;
use crate::domain::{
    CaseOutcome, Corpus, CycleResult, ErrorType, FailureRecord, LoopError, Result, TestCase,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::reporting;
use crate::storage::{self, Layout};

/// Compact view of a [`CycleResult`] for reports and task payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub overall_score: f64,
    pub passed: usize,
    pub total: usize,
    pub category_scores: BTreeMap<String, f64>,
    pub failure_summary: BTreeMap<ErrorType, usize>,
    pub results_path: PathBuf,
}

impl EvaluationSummary {
    pub fn new(result: &CycleResult, results_path: PathBuf) -> Self {
        Self {
            overall_score: result.overall_score,
            passed: result.passed,
            total: result.total,
            category_scores: result.category_scores.clone(),
            failure_summary: result.failure_summary.clone(),
            results_path,
        }
    }
}

/// Runs a corpus through the engine and scores the outputs.
#[derive(Clone)]
pub struct EvaluationRunner {
    loader: Arc<dyn EngineLoader>,
    artifact_path: PathBuf,
    layout: Layout,
    workers: usize,
}

impl EvaluationRunner {
    pub fn new(loader: Arc<dyn EngineLoader>, artifact_path: PathBuf, layout: Layout) -> Self {
        Self {
            loader,
            artifact_path,
            layout,
            workers: 4,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Read a corpus file.
    pub fn load_corpus(path: &Path) -> Result<Corpus> {
        if !path.exists() {
            return Err(LoopError::CorpusNotFound(path.to_path_buf()));
        }
        storage::read_json(path)
    }

    /// Evaluate without persisting anything.
    pub async fn evaluate(&self, cycle: u32, corpus: &Corpus) -> Result<CycleResult> {
        let engine = self
            .loader
            .load(&self.artifact_path)
            .await
            .map_err(|source| LoopError::EngineLoad {
                path: self.artifact_path.clone(),
                source,
            })?;

        let cases: Vec<TestCase> = corpus.iter().cloned().collect();
        debug!(cycle, cases = cases.len(), workers = self.workers, "Evaluating corpus");

        let outcomes: Vec<CaseOutcome> = stream::iter(cases.into_iter().map(|case| {
            let engine = Arc::clone(&engine);
            evaluate_case(engine, case, cycle)
        }))
        .buffered(self.workers)
        .collect()
        .await;

        let result = CycleResult::aggregate(cycle, Utc::now(), outcomes);
        obs::emit_evaluation_completed(cycle, result.overall_score, result.passed, result.total);
        Ok(result)
    }

    /// Evaluate the corpus at `corpus_path` and persist results plus summary.
    pub async fn run(&self, cycle: u32, corpus_path: &Path) -> Result<CycleResult> {
        let corpus = Self::load_corpus(corpus_path)?;
        let result = self.evaluate(cycle, &corpus).await?;

        storage::write_json(&self.layout.results_path(cycle), &result)?;
        reporting::write_summary_text(&self.layout.summary_path(cycle), &result)?;
        Ok(result)
    }
}

async fn evaluate_case(engine: Arc<dyn Naturalizer>, case: TestCase, cycle: u32) -> CaseOutcome {
    let expression = case.expression.clone();
    let context = case.context.clone();
    let joined =
        tokio::task::spawn_blocking(move || engine.naturalize(&expression, context.as_deref()))
            .await;
    METRICS.inc_cases_evaluated();

    match joined {
        Ok(Ok(actual)) if actual == case.expected_speech => CaseOutcome::passed(case.category),
        Ok(Ok(actual)) => {
            let error_type = classify(&case.expected_speech, &actual);
            CaseOutcome::failed(FailureRecord::mismatch(&case, actual, error_type, cycle))
        }
        Ok(Err(err)) => {
            CaseOutcome::failed(FailureRecord::exception(&case, err.to_string(), cycle))
        }
        Err(join_err) => CaseOutcome::failed(FailureRecord::exception(
            &case,
            panic_message(join_err),
            cycle,
        )),
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("engine panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("engine panicked: {}", message)
    } else {
        "engine panicked".to_string()
    }
}
