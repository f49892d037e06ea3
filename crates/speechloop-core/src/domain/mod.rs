//! Domain models for speechloop.
//!
//! Canonical definitions for the loop's entities:
//! - `TestCase` / `Corpus`: generated inputs with expected speech
//! - `FailureRecord` / `CycleResult`: one evaluation run, scored and classified
//! - `Patch`: a synthesized, atomic artifact modification
//! - `ValidationRecord`: post-patch regression check
//! - `CycleState`: the orchestrator's cross-cycle baseline

pub mod case;
pub mod digest;
pub mod error;
pub mod patch;
pub mod result;
pub mod state;

// Re-export main types and errors
pub use case::{Corpus, TestCase};
pub use error::{LoopError, Result};
pub use patch::{Edit, Patch, PatchKind, PatchOutcome};
pub use result::{
    CaseOutcome, CycleResult, ErrorType, FailureRecord, ValidationRecord, TAXONOMY_VERSION,
};
pub use state::CycleState;
