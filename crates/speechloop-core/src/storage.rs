//! On-disk layout of a speechloop data directory and atomic file helpers.
//!
//! Layout:
//! ```text
//! <root>/corpus/cycle_<N>.json
//! <root>/results/cycle_<N>_results.json
//! <root>/results/cycle_<N>_summary.txt
//! <root>/validation/cycle_<N>_validation.json
//! <root>/backups/cycle_<N>_artifact.{json,digest}
//! <root>/engine/artifact.json
//! <root>/state.json
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::domain::{LoopError, Result};

/// Paths inside one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn corpus_path(&self, cycle: u32) -> PathBuf {
        self.root.join("corpus").join(format!("cycle_{}.json", cycle))
    }

    pub fn results_path(&self, cycle: u32) -> PathBuf {
        self.root
            .join("results")
            .join(format!("cycle_{}_results.json", cycle))
    }

    pub fn summary_path(&self, cycle: u32) -> PathBuf {
        self.root
            .join("results")
            .join(format!("cycle_{}_summary.txt", cycle))
    }

    pub fn validation_path(&self, cycle: u32) -> PathBuf {
        self.root
            .join("validation")
            .join(format!("cycle_{}_validation.json", cycle))
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn default_artifact_path(&self) -> PathBuf {
        self.root.join("engine").join("artifact.json")
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }
}

/// Atomic write: temp file in the target directory, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Read a cycle result file, mapping a missing file to
/// [`LoopError::ResultsNotFound`].
pub fn read_results<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(LoopError::ResultsNotFound(path.to_path_buf()));
    }
    read_json(path)
}
