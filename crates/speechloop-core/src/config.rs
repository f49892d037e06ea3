//! Loop configuration, loaded from `speechloop.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::corpus::PhaseSchedule;
use crate::domain::{LoopError, Result};
use crate::storage::Layout;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "speechloop.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Root of corpora, results, validations, backups and state.
    pub data_dir: PathBuf,
    /// Engine artifact; defaults to `<data_dir>/engine/artifact.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    /// Concurrent engine invocations during evaluation.
    pub workers: usize,
    /// Categories scoring below this are improvement targets.
    pub improvement_threshold: f64,
    /// Error types considered per category.
    pub max_issues_per_category: usize,
    /// Score at which a phase's focus categories count as done.
    pub saturation_threshold: f64,
    /// Restore the cycle backup when validation finds a regression.
    pub rollback_on_regression: bool,
    pub phases: PhaseSchedule,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".speechloop"),
            artifact_path: None,
            workers: 4,
            improvement_threshold: 0.98,
            max_issues_per_category: 3,
            saturation_threshold: 0.95,
            rollback_on_regression: false,
            phases: PhaseSchedule::default(),
        }
    }
}

impl LoopConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| LoopError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| LoopError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Explicit path if given, else `speechloop.toml` in the working
    /// directory if present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| LoopError::Config(e.to_string()))
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.data_dir)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.artifact_path
            .clone()
            .unwrap_or_else(|| self.layout().default_artifact_path())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(LoopError::Config("workers must be at least 1".to_string()));
        }
        for (name, value) in [
            ("improvement_threshold", self.improvement_threshold),
            ("saturation_threshold", self.saturation_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LoopError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Phase, PhaseWindow};

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = LoopConfig::from_toml(
            r#"
            data_dir = "/tmp/loop"
            workers = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/loop"));
        assert_eq!(config.workers, 8);
        assert_eq!(config.improvement_threshold, 0.98);
        assert_eq!(
            config.artifact_path(),
            PathBuf::from("/tmp/loop/engine/artifact.json")
        );
    }

    #[test]
    fn phase_windows_are_configurable() {
        let config = LoopConfig::from_toml(
            r#"
            [phases.edge_cases]
            first = 20
            last = 22
            "#,
        )
        .unwrap();

        assert_eq!(config.phases.edge_cases, PhaseWindow { first: 20, last: 22 });
        assert_eq!(config.phases.phase_for(21), Phase::EdgeCases);
        assert_eq!(config.phases.phase_for(12), Phase::Broad);
        assert_eq!(config.phases.phase_for(2), Phase::StructuralFixes);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = LoopConfig::from_toml("improvement_threshold = 1.5").unwrap_err();
        assert!(err.to_string().contains("improvement_threshold"));
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(LoopConfig::from_toml("workers = 0").is_err());
    }

    #[test]
    fn default_config_serializes_and_reloads() {
        let text = LoopConfig::default().to_toml_string().unwrap();
        let reloaded = LoopConfig::from_toml(&text).unwrap();
        assert_eq!(reloaded, LoopConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speechloop.toml");
        std::fs::write(&path, "rollback_on_regression = true\n").unwrap();

        let config = LoopConfig::load_or_default(Some(&path)).unwrap();
        assert!(config.rollback_on_regression);
        assert!(LoopConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
