//! Cycle orchestration.
//!
//! One cycle runs, strictly in order:
//! select phase → generate corpus → evaluate → (if failures) synthesize
//! and apply patches → validate → update baseline → persist state.
//!
//! Corpus, evaluation and state persistence failures abort the cycle.
//! Per-case and per-patch failures are recorded and the cycle continues.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use speechloop_engine::{ArtifactEngineLoader, EngineLoader, RuleArtifact};
use tracing::{debug, info, warn, Instrument};

use crate::applicator::{ensure_artifact, PatchApplicator};
use crate::backup::{BackupArtifact, BackupStore};
use crate::config::LoopConfig;
use crate::corpus::{CorpusGenerator, CorpusSummary, Phase, PhaseSelector};
use crate::domain::{CycleResult, CycleState, LoopError, PatchOutcome, Result, ValidationRecord};
use crate::metrics::METRICS;
use crate::obs;
use crate::runner::{EvaluationRunner, EvaluationSummary};
use crate::storage::{self, Layout};
use crate::synthesis::PatchSynthesizer;
use crate::task::{
    GenerateParams, ImproveParams, RunParams, TaskDescriptor, TaskResult, TaskType,
    ValidateParams,
};
use crate::validator::RegressionValidator;

/// Everything one cycle did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u32,
    pub phase: Phase,
    pub corpus: CorpusSummary,
    pub evaluation: EvaluationSummary,
    pub patches: Vec<PatchOutcome>,
    pub validation: Option<ValidationRecord>,
    pub baseline_before: Option<f64>,
    pub baseline_after: Option<f64>,
    pub rolled_back: bool,
    pub duration_ms: u64,
}

impl CycleReport {
    pub fn patches_changed(&self) -> usize {
        self.patches.iter().filter(|p| p.changed).count()
    }
}

pub struct Orchestrator {
    config: LoopConfig,
    layout: Layout,
    artifact_path: PathBuf,
    generator: CorpusGenerator,
    selector: PhaseSelector,
    runner: EvaluationRunner,
    synthesizer: PatchSynthesizer,
    applicator: PatchApplicator,
    validator: RegressionValidator,
    state: CycleState,
}

impl Orchestrator {
    /// Orchestrator over the JSON artifact engine.
    pub fn new(config: LoopConfig) -> Result<Self> {
        Self::with_loader(config, Arc::new(ArtifactEngineLoader))
    }

    pub fn with_loader(config: LoopConfig, loader: Arc<dyn EngineLoader>) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();
        let artifact_path = config.artifact_path();

        let runner = EvaluationRunner::new(loader, artifact_path.clone(), layout.clone())
            .with_workers(config.workers);
        let synthesizer = PatchSynthesizer::new(artifact_path.clone())
            .with_threshold(config.improvement_threshold)
            .with_max_issues(config.max_issues_per_category);
        let state = load_state(&layout)?;

        Ok(Self {
            generator: CorpusGenerator::new(layout.clone()),
            selector: PhaseSelector::new(config.phases, config.saturation_threshold),
            validator: RegressionValidator::new(runner.clone(), layout.clone()),
            applicator: PatchApplicator::new(BackupStore::new(layout.backups_dir())),
            runner,
            synthesizer,
            state,
            artifact_path,
            layout,
            config,
        })
    }

    /// Swap the synthesizer, e.g. to register custom issue handlers.
    pub fn with_synthesizer(mut self, synthesizer: PatchSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn runner(&self) -> &EvaluationRunner {
        &self.runner
    }

    pub fn backups(&self) -> &BackupStore {
        self.applicator.backups()
    }

    /// Write the reference artifact. Returns false if one already exists
    /// and `force` is not set.
    pub fn init_artifact(&self, force: bool) -> Result<bool> {
        if self.artifact_path.exists() && !force {
            return Ok(false);
        }
        storage::write_atomic(
            &self.artifact_path,
            RuleArtifact::reference().to_json_pretty()?.as_bytes(),
        )?;
        info!(path = %self.artifact_path.display(), "Wrote reference artifact");
        Ok(true)
    }

    fn save_state(&self) -> Result<()> {
        storage::write_json(&self.layout.state_path(), &self.state)
    }

    fn current_artifact(&self) -> Result<RuleArtifact> {
        ensure_artifact(&self.artifact_path)?;
        Ok(RuleArtifact::load(&self.artifact_path)?)
    }

    fn previous_result(&self, cycle: u32) -> Option<CycleResult> {
        let previous = cycle.checked_sub(1).filter(|c| *c > 0)?;
        match storage::read_results(&self.layout.results_path(previous)) {
            Ok(result) => Some(result),
            Err(err) => {
                debug!(cycle, error = %err, "No usable previous results");
                None
            }
        }
    }

    /// Run the cycle after the last recorded one.
    pub async fn run_next_cycle(&mut self) -> Result<CycleReport> {
        let cycle = self.state.next_cycle();
        self.run_cycle(cycle).await
    }

    /// Run `count` consecutive cycles. A failed cycle is reported and the
    /// next one still runs.
    pub async fn run_cycles(&mut self, count: u32) -> Vec<Result<CycleReport>> {
        let first = self.state.next_cycle();
        let mut reports = Vec::with_capacity(count as usize);
        for cycle in first..first + count {
            let report = self.run_cycle(cycle).await;
            if let Err(err) = &report {
                warn!(cycle, error = %err, "Cycle aborted");
            }
            reports.push(report);
        }
        reports
    }

    pub async fn run_cycle(&mut self, cycle: u32) -> Result<CycleReport> {
        self.drive_cycle(cycle)
            .instrument(obs::cycle_span(cycle))
            .await
    }

    async fn drive_cycle(&mut self, cycle: u32) -> Result<CycleReport> {
        let started = Instant::now();

        let previous = self.previous_result(cycle);
        let phase = self.selector.select(cycle, previous.as_ref());
        let baseline_before = self.state.baseline_score;
        obs::emit_cycle_started(cycle, phase.as_str(), baseline_before);

        let corpus = self.generator.generate(cycle, phase)?;
        self.state.begin(cycle, corpus.path.clone());

        ensure_artifact(&self.artifact_path)?;
        let evaluation = self.runner.run(cycle, &corpus.path).await?;
        let results_path = self.layout.results_path(cycle);
        self.state.record_results(results_path.clone());

        let mut patches = Vec::new();
        let mut validation = None;
        let mut rolled_back = false;

        if evaluation.failures.is_empty() {
            info!(cycle, "All cases passed; nothing to improve");
            validation = Some(self.validator.record_clean(cycle, &evaluation)?);
            self.state.advance(evaluation.overall_score);
        } else {
            self.applicator.backups().discard(cycle)?;
            let artifact = self.current_artifact()?;
            let synthesized = self.synthesizer.synthesize(&evaluation, &artifact);
            patches = self.applicator.apply_all(cycle, &synthesized);

            let record = self
                .validator
                .validate(cycle, &corpus.path, Some(evaluation.overall_score))
                .await?;
            if record.validation_passed {
                self.state.advance(record.overall_score);
            } else if self.config.rollback_on_regression && self.applicator.backups().exists(cycle)
            {
                self.rollback(cycle)?;
                rolled_back = true;
            }
            validation = Some(record);
        }

        self.save_state()?;
        METRICS.inc_cycles_completed();
        METRICS.flush();

        let duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_cycle_finished(cycle, duration_ms, self.state.baseline_score);

        Ok(CycleReport {
            cycle,
            phase,
            corpus,
            evaluation: EvaluationSummary::new(&evaluation, results_path),
            patches,
            validation,
            baseline_before,
            baseline_after: self.state.baseline_score,
            rolled_back,
            duration_ms,
        })
    }

    /// Restore the artifact as it was before `cycle` applied any patch.
    pub fn rollback(&mut self, cycle: u32) -> Result<BackupArtifact> {
        let backup = self
            .applicator
            .backups()
            .restore(cycle, &self.artifact_path)?;
        obs::emit_rollback(cycle, &backup.digest);
        Ok(backup)
    }

    /// Execute one stage on request. Never fails; errors become
    /// `status = "error"` results.
    pub async fn run_task(&mut self, task: &TaskDescriptor) -> TaskResult {
        match self.dispatch(task).await {
            Ok(payload) => TaskResult::completed(task, payload),
            Err(err) => {
                warn!(task_id = %task.id, task_type = ?task.task_type, error = %err, "Task failed");
                TaskResult::error(task, err.to_string())
            }
        }
    }

    async fn dispatch(&mut self, task: &TaskDescriptor) -> Result<serde_json::Value> {
        let cycle = task.cycle;
        if cycle == 0 {
            return Err(LoopError::InvalidTask("cycle numbers start at 1".to_string()));
        }

        match task.task_type {
            TaskType::GenerateExamples => {
                let params: GenerateParams = task.params()?;
                let phase = match params.phase {
                    Some(phase) => phase,
                    None => self.selector.select(cycle, self.previous_result(cycle).as_ref()),
                };
                let summary = self.generator.generate(cycle, phase)?;
                self.state.begin(cycle, summary.path.clone());
                self.save_state()?;
                Ok(serde_json::to_value(summary)?)
            }
            TaskType::RunTests => {
                let params: RunParams = task.params()?;
                let corpus_path = params
                    .corpus_path
                    .unwrap_or_else(|| self.layout.corpus_path(cycle));
                let result = self.runner.run(cycle, &corpus_path).await?;
                let results_path = self.layout.results_path(cycle);
                self.state.record_results(results_path.clone());
                self.save_state()?;
                Ok(serde_json::to_value(EvaluationSummary::new(
                    &result,
                    results_path,
                ))?)
            }
            TaskType::ImplementImprovements => {
                let params: ImproveParams = task.params()?;
                let results_path = params
                    .results_path
                    .unwrap_or_else(|| self.layout.results_path(cycle));
                let result: CycleResult = storage::read_results(&results_path)?;
                self.applicator.backups().discard(cycle)?;
                let artifact = self.current_artifact()?;
                let patches = self.synthesizer.synthesize(&result, &artifact);
                let outcomes = self.applicator.apply_all(cycle, &patches);
                Ok(json!({
                    "synthesized": patches.len(),
                    "applied": outcomes.iter().filter(|o| o.applied).count(),
                    "changed": outcomes.iter().filter(|o| o.changed).count(),
                    "outcomes": outcomes,
                }))
            }
            TaskType::ValidateImprovements => {
                let params: ValidateParams = task.params()?;
                let corpus_path = params
                    .corpus_path
                    .unwrap_or_else(|| self.layout.corpus_path(cycle));
                let baseline = params.baseline.or(self.state.baseline_score);
                let record = self.validator.validate(cycle, &corpus_path, baseline).await?;
                if record.validation_passed {
                    self.state.advance(record.overall_score);
                    self.save_state()?;
                }
                Ok(serde_json::to_value(record)?)
            }
        }
    }
}

fn load_state(layout: &Layout) -> Result<CycleState> {
    let path = layout.state_path();
    if !path.exists() {
        return Ok(CycleState::new());
    }
    storage::read_json(&path)
}
