//! Domain-level error taxonomy for speechloop.
//!
//! Only cycle-aborting conditions are errors. Per-case engine failures and
//! per-patch failures are recorded as values (`FailureRecord`,
//! `PatchOutcome`) and never surface here.

use std::path::PathBuf;

use speechloop_engine::EngineError;

/// speechloop domain errors.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("failed to load engine from {path:?}: {source}")]
    EngineLoad { path: PathBuf, source: EngineError },

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("corpus not found: {0:?}")]
    CorpusNotFound(PathBuf),

    #[error("results not found: {0:?}")]
    ResultsNotFound(PathBuf),

    #[error("backup not found for cycle {0}")]
    BackupNotFound(u32),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for speechloop domain operations.
pub type Result<T> = std::result::Result<T, LoopError>;
