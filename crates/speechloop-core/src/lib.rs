//! speechloop core library
//!
//! The test-driven improvement loop around a math-to-speech engine:
//! corpus generation, parallel evaluation, failure classification, patch
//! synthesis, backed-up patch application, regression validation and
//! cycle orchestration.

pub mod applicator;
pub mod backup;
pub mod classify;
pub mod config;
pub mod corpus;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod reporting;
pub mod runner;
pub mod storage;
pub mod synthesis;
pub mod task;
pub mod telemetry;
pub mod validator;

pub use domain::{
    CaseOutcome, Corpus, CycleResult, CycleState, Edit, ErrorType, FailureRecord, LoopError,
    Patch, PatchKind, PatchOutcome, Result, TestCase, ValidationRecord, TAXONOMY_VERSION,
};

pub use applicator::PatchApplicator;
pub use backup::{BackupArtifact, BackupStore};
pub use classify::{classify, select_issues, Issue};
pub use config::LoopConfig;
pub use corpus::{CorpusGenerator, CorpusSummary, Phase, PhaseSchedule, PhaseSelector};
pub use orchestrator::{CycleReport, Orchestrator};
pub use runner::{EvaluationRunner, EvaluationSummary};
pub use storage::Layout;
pub use synthesis::{IssueSynthesizer, PatchDraft, PatchSynthesizer};
pub use task::{TaskDescriptor, TaskResult, TaskStatus, TaskType};
pub use validator::RegressionValidator;
