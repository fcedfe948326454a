//! Row types returned by the command store.

use serde::{Deserialize, Serialize};

/// A persisted command record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRow {
    pub command_id: String,
    /// Digest of the content present at last write
    pub content_hash: String,
    /// Empty when no summarization has succeeded yet
    pub summary: String,
    pub security_warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Unix millis
    pub last_updated: i64,
}

impl CommandRow {
    /// Whether a command with `current_hash` needs a fresh summary.
    pub fn needs_summary(&self, current_hash: &str) -> bool {
        self.summary.is_empty() || self.content_hash != current_hash
    }

    /// Whether the row has a summary but nothing to search it by.
    pub fn needs_embedding(&self) -> bool {
        !self.summary.is_empty() && self.embedding.is_none()
    }
}

/// A search hit joined with its stored summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCommand {
    pub command_id: String,
    pub summary: String,
    pub security_warning: Option<String>,
    pub score: f32,
}

/// Parse an RFC3339 timestamp into Unix millis, 0 if unparseable.
pub(crate) fn parse_millis(ts: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}
