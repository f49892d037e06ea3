//! speechloop-engine: artifact-driven math-to-speech engine
//!
//! The engine's behavior lives entirely in a persisted [`RuleArtifact`]:
//! ordered, prioritized rule tables plus a tree of named processing
//! sections. The improvement loop patches the artifact; the engine only
//! reads it.
//!
//! ## Key Components
//!
//! - `RuleArtifact`: persisted rule tables and the section tree
//! - `RuleTable`: precedence-ordered pattern → replacement rules
//! - `RuleEngine`: compiled artifact implementing [`Naturalizer`]
//! - `ArtifactEngineLoader`: loads an engine from an artifact on disk

pub mod artifact;
pub mod engine;
mod error;
pub mod numbers;
pub mod rules;

pub use artifact::{RelationStrategy, RuleArtifact, Section, SectionBody, SCHEMA_VERSION};
pub use engine::{ArtifactEngineLoader, EngineLoader, Naturalizer, RuleEngine};
pub use error::EngineError;
pub use numbers::{number_to_words, spell_numerals};
pub use rules::{
    InsertOutcome, Rule, RuleTable, PRIORITY_CATCH_ALL, PRIORITY_DEFAULT, PRIORITY_SPECIFIC,
};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
