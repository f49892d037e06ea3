//! Patch synthesis: turn classified failures into artifact edits.
//!
//! Each [`IssueSynthesizer`] handles one [`ErrorType`]. Issues without a
//! dedicated synthesizer fall through to [`GenericDiffSynthesizer`].
//! Synthesizers only read the artifact; applying edits is the
//! applicator's job.

mod generic;
mod notation;

use std::collections::HashSet;
use std::path::PathBuf;

use speechloop_engine::RuleArtifact;
use tracing::{debug, info};
use uuid::Uuid;

use crate::classify::{select_issues, Issue};
use crate::domain::{CycleResult, Edit, ErrorType, Patch, PatchKind};

pub use generic::{diff_rules, GenericDiffSynthesizer};
pub use notation::{
    DerivativeOrderSynthesizer, EqualsIsSynthesizer, FractionNameSynthesizer,
    PartialDerivativeSynthesizer, PowerNotationSynthesizer,
};

/// Edits proposed for one issue, before they become a [`Patch`].
#[derive(Debug, Clone, PartialEq)]
pub struct PatchDraft {
    pub kind: PatchKind,
    pub description: String,
    pub edits: Vec<Edit>,
}

/// Proposes edits for one error type.
pub trait IssueSynthesizer: Send + Sync {
    fn error_type(&self) -> ErrorType;

    /// `None` when nothing can be proposed for this issue.
    fn synthesize(&self, issue: &Issue, artifact: &RuleArtifact) -> Option<PatchDraft>;
}

/// Routes issues to synthesizers and assembles patches.
pub struct PatchSynthesizer {
    target_artifact: PathBuf,
    synthesizers: Vec<Box<dyn IssueSynthesizer>>,
    fallback: GenericDiffSynthesizer,
    threshold: f64,
    max_issues: usize,
}

impl PatchSynthesizer {
    pub fn new(target_artifact: PathBuf) -> Self {
        Self {
            target_artifact,
            synthesizers: vec![
                Box::new(DerivativeOrderSynthesizer),
                Box::new(PartialDerivativeSynthesizer),
                Box::new(EqualsIsSynthesizer::default()),
                Box::new(PowerNotationSynthesizer),
                Box::new(FractionNameSynthesizer),
            ],
            fallback: GenericDiffSynthesizer,
            threshold: 0.98,
            max_issues: 3,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_issues(mut self, max_issues: usize) -> Self {
        self.max_issues = max_issues;
        self
    }

    /// Register a synthesizer, replacing any existing one for the same
    /// error type.
    pub fn with_synthesizer(mut self, synthesizer: Box<dyn IssueSynthesizer>) -> Self {
        let error_type = synthesizer.error_type();
        self.synthesizers.retain(|s| s.error_type() != error_type);
        self.synthesizers.push(synthesizer);
        self
    }

    /// One patch per issue that yields at least one edit not already
    /// proposed earlier in this batch.
    pub fn synthesize(&self, result: &CycleResult, artifact: &RuleArtifact) -> Vec<Patch> {
        let issues = select_issues(result, self.threshold, self.max_issues);
        let mut seen = HashSet::new();
        let mut patches = Vec::new();

        for issue in issues {
            if issue.error_type == ErrorType::Exception {
                info!(
                    category = %issue.category,
                    count = issue.count,
                    "Engine exceptions need manual attention; no patch synthesized"
                );
                continue;
            }

            let draft = match self
                .synthesizers
                .iter()
                .find(|s| s.error_type() == issue.error_type)
            {
                Some(synthesizer) => synthesizer.synthesize(&issue, artifact),
                None => self.fallback.synthesize(&issue, artifact),
            };
            let Some(draft) = draft else {
                debug!(
                    category = %issue.category,
                    error_type = %issue.error_type,
                    "No patch for issue"
                );
                continue;
            };

            let edits: Vec<Edit> = draft
                .edits
                .into_iter()
                .filter(|edit| seen.insert(edit.identity()))
                .collect();
            if edits.is_empty() {
                debug!(
                    category = %issue.category,
                    error_type = %issue.error_type,
                    "Edits already proposed by an earlier patch"
                );
                continue;
            }

            patches.push(Patch {
                id: Uuid::new_v4(),
                cycle: result.cycle,
                target_artifact: self.target_artifact.clone(),
                kind: draft.kind,
                description: draft.description,
                category: issue.category,
                issue: issue.error_type,
                edits,
            });
        }

        info!(cycle = result.cycle, patches = patches.len(), "Synthesized patches");
        patches
    }
}
