//! Command identity and content hashing.

use sha2::{Digest, Sha256};
use tasktree_common::util::normalize_separators;

/// Stable command id derived from ecosystem kind, source path and name.
///
/// Path separators are normalized so the same command gets the same id on
/// every platform.
pub fn command_id(kind: &str, file_path: &str, name: &str) -> String {
    format!("{kind}:{}:{name}", normalize_separators(file_path))
}

/// Lowercase hex SHA-256 of a command's source text.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
