//! Cycle-keyed artifact backups with digest sidecars.
//!
//! Layout: `<dir>/cycle_<N>_artifact.json` plus `<dir>/cycle_<N>_artifact.digest`.
//! Within one run of a cycle the first snapshot is kept, so restoring cycle N
//! yields the artifact as it was before that run's first patch. A new run of
//! the same cycle number discards the old backup first.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::digest::{compute_digest, short_digest};
use crate::domain::{LoopError, Result};
use crate::storage;

/// Metadata of one stored backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArtifact {
    pub cycle: u32,
    pub path: PathBuf,
    pub digest: String,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, cycle: u32) -> PathBuf {
        self.dir.join(format!("cycle_{}_artifact.json", cycle))
    }

    fn digest_path(&self, cycle: u32) -> PathBuf {
        self.dir.join(format!("cycle_{}_artifact.digest", cycle))
    }

    pub fn exists(&self, cycle: u32) -> bool {
        self.artifact_path(cycle).exists() && self.digest_path(cycle).exists()
    }

    /// Store `bytes` as the backup for `cycle`, overwriting any previous one.
    pub fn snapshot(&self, cycle: u32, bytes: &[u8]) -> Result<BackupArtifact> {
        let digest = compute_digest(bytes);
        let path = self.artifact_path(cycle);
        storage::write_atomic(&path, bytes)?;
        storage::write_atomic(&self.digest_path(cycle), digest.as_bytes())?;
        debug!(cycle, digest = short_digest(&digest), "Artifact backup written");

        Ok(BackupArtifact {
            cycle,
            path,
            digest,
            size: bytes.len(),
        })
    }

    /// Like [`snapshot`](Self::snapshot), but keeps an existing backup for
    /// the cycle untouched.
    pub fn snapshot_once(&self, cycle: u32, bytes: &[u8]) -> Result<BackupArtifact> {
        if self.exists(cycle) {
            let stored = self.read(cycle)?;
            return Ok(BackupArtifact {
                cycle,
                path: self.artifact_path(cycle),
                digest: compute_digest(&stored),
                size: stored.len(),
            });
        }
        self.snapshot(cycle, bytes)
    }

    /// Drop the backup for `cycle` so the next [`snapshot_once`](Self::snapshot_once)
    /// captures the current artifact. Returns whether a backup existed.
    pub fn discard(&self, cycle: u32) -> Result<bool> {
        let mut removed = false;
        for path in [self.artifact_path(cycle), self.digest_path(cycle)] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        if removed {
            debug!(cycle, "Stale artifact backup discarded");
        }
        Ok(removed)
    }

    /// Read a backup and verify it against its digest sidecar.
    pub fn read(&self, cycle: u32) -> Result<Vec<u8>> {
        if !self.exists(cycle) {
            return Err(LoopError::BackupNotFound(cycle));
        }
        let bytes = fs::read(self.artifact_path(cycle))?;
        let expected = fs::read_to_string(self.digest_path(cycle))?;
        let actual = compute_digest(&bytes);
        if expected.trim() != actual {
            return Err(LoopError::DigestMismatch {
                expected: expected.trim().to_string(),
                actual,
            });
        }
        Ok(bytes)
    }

    /// Write the verified backup for `cycle` over `target`.
    pub fn restore(&self, cycle: u32, target: &Path) -> Result<BackupArtifact> {
        let bytes = self.read(cycle)?;
        storage::write_atomic(target, &bytes)?;
        Ok(BackupArtifact {
            cycle,
            path: self.artifact_path(cycle),
            digest: compute_digest(&bytes),
            size: bytes.len(),
        })
    }

    /// Cycles with a stored backup, ascending.
    pub fn cycles(&self) -> Result<Vec<u32>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut cycles = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(cycle) = name
                .strip_prefix("cycle_")
                .and_then(|rest| rest.strip_suffix("_artifact.json"))
                .and_then(|n| n.parse::<u32>().ok())
            {
                cycles.push(cycle);
            }
        }
        cycles.sort_unstable();
        Ok(cycles)
    }

    pub fn latest(&self) -> Result<Option<u32>> {
        Ok(self.cycles()?.last().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_and_restore_are_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("backups"));
        let target = dir.path().join("artifact.json");

        let original = b"{\"name\": \"reference\"}\n";
        let backup = store.snapshot(3, original).unwrap();
        assert_eq!(backup.size, original.len());
        assert_eq!(backup.digest, compute_digest(original));

        fs::write(&target, b"patched").unwrap();
        store.restore(3, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), original);
    }

    #[test]
    fn snapshot_once_keeps_first_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());

        store.snapshot_once(1, b"before any patch").unwrap();
        let second = store.snapshot_once(1, b"after first patch").unwrap();

        assert_eq!(second.digest, compute_digest(b"before any patch"));
        assert_eq!(store.read(1).unwrap(), b"before any patch");
    }

    #[test]
    fn discard_lets_a_rerun_capture_the_current_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());

        store.snapshot_once(1, b"first run").unwrap();
        assert!(store.discard(1).unwrap());
        assert!(!store.exists(1));
        assert!(!store.discard(1).unwrap());

        store.snapshot_once(1, b"second run").unwrap();
        assert_eq!(store.read(1).unwrap(), b"second run");
    }

    #[test]
    fn tampered_backup_fails_digest_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        store.snapshot(2, b"original").unwrap();
        fs::write(store.artifact_path(2), b"tampered").unwrap();

        let err = store.read(2).unwrap_err();
        assert!(matches!(err, LoopError::DigestMismatch { .. }));
    }

    #[test]
    fn missing_backup_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        assert!(matches!(
            store.restore(9, &dir.path().join("artifact.json")),
            Err(LoopError::BackupNotFound(9))
        ));
    }

    #[test]
    fn cycles_are_listed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        assert_eq!(store.latest().unwrap(), None);

        store.snapshot(10, b"c").unwrap();
        store.snapshot(2, b"a").unwrap();
        store.snapshot(7, b"b").unwrap();

        assert_eq!(store.cycles().unwrap(), vec![2, 7, 10]);
        assert_eq!(store.latest().unwrap(), Some(10));
    }
}
