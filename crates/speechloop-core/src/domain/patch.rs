//! Synthesized modifications to the engine artifact.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use speechloop_engine::{Rule, Section};
use uuid::Uuid;

use super::result::ErrorType;

/// Kind of modification a patch makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    /// Rules inserted into existing (or new) rule tables.
    RuleTableUpdate,
    /// One named section swapped for a new definition.
    FunctionReplacement,
    /// Structural change: new sections plus the rules they need.
    EngineUpdate,
}

/// One atomic step of a patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    /// Insert `rule` into `table` at its precedence position.
    InsertRule { table: String, rule: Rule },
    /// Replace the section with the same name; appended at top level if absent.
    ReplaceSection { section: Section },
}

impl Edit {
    /// Key used to drop edits that an earlier patch in the same cycle
    /// already carries.
    pub fn identity(&self) -> String {
        match self {
            Self::InsertRule { table, rule } => {
                format!("rule:{}:{}:{}", table, rule.context, rule.pattern)
            }
            Self::ReplaceSection { section } => {
                format!("section:{}:{:?}", section.name, section.body)
            }
        }
    }
}

/// A modification proposed for one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub id: Uuid,
    pub cycle: u32,
    pub target_artifact: PathBuf,
    pub kind: PatchKind,
    pub description: String,
    pub category: String,
    pub issue: ErrorType,
    pub edits: Vec<Edit>,
}

/// What happened when a patch was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOutcome {
    pub patch_id: Uuid,
    pub kind: PatchKind,
    pub description: String,
    /// Patch passed validation and was committed (possibly as a no-op).
    pub applied: bool,
    /// The artifact on disk actually changed.
    pub changed: bool,
    pub message: String,
}

impl PatchOutcome {
    pub fn applied(patch: &Patch, changed: bool) -> Self {
        let message = if changed {
            "applied".to_string()
        } else {
            "artifact already contained every edit".to_string()
        };
        Self {
            patch_id: patch.id,
            kind: patch.kind,
            description: patch.description.clone(),
            applied: true,
            changed,
            message,
        }
    }

    pub fn skipped(patch: &Patch, reason: impl Into<String>) -> Self {
        Self {
            patch_id: patch.id,
            kind: patch.kind,
            description: patch.description.clone(),
            applied: false,
            changed: false,
            message: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speechloop_engine::RelationStrategy;

    #[test]
    fn edit_json_is_tagged_by_op() {
        let edit = Edit::ReplaceSection {
            section: Section::relation("relations", RelationStrategy::AlwaysIs),
        };
        let json = serde_json::to_value(&edit).expect("serialize");
        assert_eq!(json["op"], "replace_section");
        assert_eq!(json["section"]["body"]["kind"], "relation");
    }

    #[test]
    fn identity_ignores_rule_id_and_replacement() {
        let a = Edit::InsertRule {
            table: "powers".to_string(),
            rule: Rule::new("a", r"\^2\b", " squared", "power"),
        };
        let b = Edit::InsertRule {
            table: "powers".to_string(),
            rule: Rule::new("b", r"\^2\b", " to the second", "power"),
        };
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn skipped_outcome_is_not_applied() {
        let patch = Patch {
            id: Uuid::new_v4(),
            cycle: 1,
            target_artifact: PathBuf::from("artifact.json"),
            kind: PatchKind::RuleTableUpdate,
            description: "test".to_string(),
            category: "algebra".to_string(),
            issue: ErrorType::PowerNotation,
            edits: Vec::new(),
        };
        let outcome = PatchOutcome::skipped(&patch, "invalid rule");
        assert!(!outcome.applied);
        assert!(!outcome.changed);
        assert_eq!(outcome.message, "invalid rule");
        assert!(PatchOutcome::applied(&patch, true).changed);
    }
}
