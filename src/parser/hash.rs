//! Content hashing for change and conflict detection.
//!
//! Hashes are SHA256 over the raw file bytes, rendered as lowercase hex.
//! The same function is used when staging a change and when comparing git's
//! version of a file against the hash stored in the database, so the two
//! must never diverge.

use sha2::{Digest, Sha256};

/// Compute the SHA256 hash of file content.
#[must_use]
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Check if content has changed against a stored hash.
///
/// Returns `true` if there is no stored hash or the hashes differ.
#[must_use]
pub fn has_changed(current_hash: &str, stored_hash: Option<&str>) -> bool {
    stored_hash.is_none_or(|h| h != current_hash)
}
