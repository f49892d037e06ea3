//! Applies synthesized patches to the engine artifact.
//!
//! Every patch is all-or-nothing: edits are applied to an in-memory copy,
//! the copy must compile, and only then is it written (atomically). The
//! pre-patch artifact is backed up before the first write of a cycle.
//! A failing patch is logged and skipped; it never aborts the cycle.

use std::collections::BTreeSet;
use std::path::Path;

use speechloop_engine::{RuleArtifact, RuleEngine};
use tracing::{debug, info};

use crate::backup::BackupStore;
use crate::domain::{Edit, LoopError, Patch, PatchOutcome, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::storage;

pub struct PatchApplicator {
    backups: BackupStore,
}

impl PatchApplicator {
    pub fn new(backups: BackupStore) -> Self {
        Self { backups }
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Apply patches in order. Outcomes line up with `patches`.
    pub fn apply_all(&self, cycle: u32, patches: &[Patch]) -> Vec<PatchOutcome> {
        patches.iter().map(|p| self.apply(cycle, p)).collect()
    }

    pub fn apply(&self, cycle: u32, patch: &Patch) -> PatchOutcome {
        match self.try_apply(cycle, patch) {
            Ok(changed) => {
                METRICS.inc_patches_applied();
                obs::emit_patch_applied(
                    cycle,
                    &patch.id.to_string(),
                    &format!("{:?}", patch.kind),
                    changed,
                );
                PatchOutcome::applied(patch, changed)
            }
            Err(err) => {
                METRICS.inc_patches_skipped();
                obs::emit_patch_skipped(cycle, &patch.id.to_string(), &err);
                PatchOutcome::skipped(patch, err.to_string())
            }
        }
    }

    fn try_apply(&self, cycle: u32, patch: &Patch) -> Result<bool> {
        let path = patch.target_artifact.as_path();
        ensure_artifact(path)?;

        let original = std::fs::read(path)?;
        self.backups.snapshot_once(cycle, &original)?;

        let json = std::str::from_utf8(&original)
            .map_err(|e| LoopError::InvalidArtifact(format!("{}: {}", path.display(), e)))?;
        let before = RuleArtifact::from_json(json)?;
        let after = apply_edits(&before, &patch.edits);

        RuleEngine::from_artifact(&after)?;

        if after == before {
            debug!(patch_id = %patch.id, "Patch is a no-op for current artifact");
            return Ok(false);
        }
        storage::write_atomic(path, after.to_json_pretty()?.as_bytes())?;
        Ok(true)
    }
}

/// Write the minimal template if no artifact exists yet.
pub fn ensure_artifact(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    storage::write_atomic(path, RuleArtifact::template().to_json_pretty()?.as_bytes())?;
    info!(path = %path.display(), "Materialized template artifact");
    Ok(true)
}

/// Apply `edits` to a copy of `artifact`.
///
/// A replaced section that does not exist is appended at top level; a
/// rule table that no section applies gets a top-level stage.
pub fn apply_edits(artifact: &RuleArtifact, edits: &[Edit]) -> RuleArtifact {
    let mut next = artifact.clone();
    let mut touched_tables = BTreeSet::new();

    for edit in edits {
        match edit {
            Edit::ReplaceSection { section } => {
                if !next.replace_section(&section.name, section) {
                    next.append_top_level(section.clone());
                }
            }
            Edit::InsertRule { table, rule } => {
                let outcome = next.ensure_table(table).insert_rule(rule.clone());
                debug!(table = %table, rule = %rule.id, ?outcome, "Rule inserted");
                touched_tables.insert(table.clone());
            }
        }
    }

    for table in touched_tables {
        next.ensure_table_referenced(&table);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorType, PatchKind};
    use speechloop_engine::{Naturalizer, RelationStrategy, Rule, Section, PRIORITY_SPECIFIC};
    use uuid::Uuid;

    fn patch(target: &Path, kind: PatchKind, edits: Vec<Edit>) -> Patch {
        Patch {
            id: Uuid::new_v4(),
            cycle: 1,
            target_artifact: target.to_path_buf(),
            kind,
            description: "test patch".to_string(),
            category: "algebra".to_string(),
            issue: ErrorType::PowerNotation,
            edits,
        }
    }

    fn squared_edit() -> Edit {
        Edit::InsertRule {
            table: "powers".to_string(),
            rule: Rule::new("power-squared", r"\^2\b", " squared", "power")
                .with_priority(PRIORITY_SPECIFIC),
        }
    }

    fn setup() -> (tempfile::TempDir, std::path::PathBuf, PatchApplicator) {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("engine").join("artifact.json");
        RuleArtifact::reference().save(&target).unwrap();
        let applicator = PatchApplicator::new(BackupStore::new(dir.path().join("backups")));
        (dir, target, applicator)
    }

    #[test]
    fn rule_insert_lands_before_catch_all_and_is_backed_up() {
        let (_dir, target, applicator) = setup();
        let original = std::fs::read(&target).unwrap();

        let outcome = applicator.apply(
            1,
            &patch(&target, PatchKind::RuleTableUpdate, vec![squared_edit()]),
        );
        assert!(outcome.applied);
        assert!(outcome.changed);

        let artifact = RuleArtifact::load(&target).unwrap();
        let powers = artifact.table("powers").unwrap();
        assert_eq!(powers.position_of("power-squared"), Some(0));
        assert_eq!(powers.position_of("power-generic"), Some(1));

        assert_eq!(applicator.backups().read(1).unwrap(), original);
    }

    #[test]
    fn reapplying_same_patch_is_a_no_op() {
        let (_dir, target, applicator) = setup();
        let p = patch(&target, PatchKind::RuleTableUpdate, vec![squared_edit()]);

        assert!(applicator.apply(1, &p).changed);
        let after_first = std::fs::read(&target).unwrap();
        let second = applicator.apply(1, &p);

        assert!(second.applied);
        assert!(!second.changed);
        assert_eq!(std::fs::read(&target).unwrap(), after_first);
    }

    #[test]
    fn function_replacement_swaps_one_section() {
        let (_dir, target, applicator) = setup();
        let section = Section::relation(
            "relations",
            RelationStrategy::ContextAware { max_operands: 3 },
        );
        let outcome = applicator.apply(
            1,
            &patch(
                &target,
                PatchKind::FunctionReplacement,
                vec![Edit::ReplaceSection {
                    section: section.clone(),
                }],
            ),
        );
        assert!(outcome.changed);

        let artifact = RuleArtifact::load(&target).unwrap();
        assert_eq!(artifact.find_section("relations"), Some(&section));
        assert_eq!(artifact.tables, RuleArtifact::reference().tables);
    }

    #[test]
    fn invalid_rule_is_rejected_without_touching_artifact() {
        let (_dir, target, applicator) = setup();
        let before = std::fs::read(&target).unwrap();
        let bad = Edit::InsertRule {
            table: "powers".to_string(),
            rule: Rule::new("broken", "(unclosed", "x", "power"),
        };

        let outcome = applicator.apply(
            1,
            &patch(&target, PatchKind::RuleTableUpdate, vec![squared_edit(), bad]),
        );
        assert!(!outcome.applied);
        assert!(outcome.message.contains("broken"));
        assert_eq!(std::fs::read(&target).unwrap(), before);
    }

    #[test]
    fn missing_artifact_is_materialized_from_template() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("engine").join("artifact.json");
        let applicator = PatchApplicator::new(BackupStore::new(dir.path().join("backups")));
        let edit = Edit::InsertRule {
            table: "output_fixes".to_string(),
            rule: Rule::new("output-fix-det", r"\bdet\b", "determinant", "output_fix"),
        };

        let outcome = applicator.apply(1, &patch(&target, PatchKind::RuleTableUpdate, vec![edit]));
        assert!(outcome.changed);

        let artifact = RuleArtifact::load(&target).unwrap();
        assert!(artifact.root.references_table("output_fixes"));
        let engine = RuleEngine::from_artifact(&artifact).unwrap();
        assert_eq!(engine.naturalize("det", None).unwrap(), "determinant");
        assert_eq!(
            applicator.backups().read(1).unwrap(),
            RuleArtifact::template().to_json_pretty().unwrap().into_bytes()
        );
    }

    #[test]
    fn missing_section_is_appended_at_top_level() {
        let artifact = RuleArtifact::template();
        let section = Section::relation("relations", RelationStrategy::AlwaysIs);
        let next = apply_edits(&artifact, &[Edit::ReplaceSection { section: section.clone() }]);

        assert_eq!(next.root.children().last(), Some(&section));
        assert_eq!(artifact, RuleArtifact::template());
    }
}
