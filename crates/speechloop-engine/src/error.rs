//! Error types for speechloop-engine

use thiserror::Error;

/// Errors raised while loading, compiling, or running the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Expression was empty or whitespace only
    #[error("Expression is empty")]
    EmptyExpression,

    /// A rule pattern failed to compile
    #[error("Invalid rule '{rule_id}' in table '{table}': {source}")]
    InvalidRule {
        table: String,
        rule_id: String,
        source: regex::Error,
    },

    /// A section references a rule table the artifact does not define
    #[error("Section references unknown rule table: {0}")]
    UnknownTable(String),

    /// Two sections share a name, so named replacement would be ambiguous
    #[error("Duplicate section name: {0}")]
    DuplicateSection(String),

    /// Artifact could not be read or written
    #[error("Artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact could not be (de)serialized
    #[error("Artifact serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
