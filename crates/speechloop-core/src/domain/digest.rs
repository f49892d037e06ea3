//! SHA-256 digests for persisted artifacts.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of raw bytes.
pub fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// First 12 hex chars, for log lines.
pub fn short_digest(digest: &str) -> &str {
    &digest[..12.min(digest.len())]
}
