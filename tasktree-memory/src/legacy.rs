//! Import from the pre-SQLite JSON formats.
//!
//! Two flat files are understood:
//! - summaries: `{ "<commandId>": { "contentHash", "summary", "lastUpdated" } }`
//! - tags: `{ "<tagName>": ["<commandId or pattern>", ...] }`

use crate::sqlite::CommandStore;
use rusqlite::params;
use serde::Deserialize;
use std::collections::BTreeMap;
use tasktree_common::{Error, Result};

/// One entry of the legacy summary file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySummary {
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub last_updated: Option<LegacyTimestamp>,
}

/// Older files wrote either an ISO string or epoch millis.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LegacyTimestamp {
    Text(String),
    Millis(i64),
}

impl LegacyTimestamp {
    fn to_rfc3339(&self) -> Option<String> {
        match self {
            Self::Text(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&chrono::Utc).to_rfc3339()),
            Self::Millis(ms) => {
                chrono::DateTime::<chrono::Utc>::from_timestamp_millis(*ms).map(|dt| dt.to_rfc3339())
            }
        }
    }
}

/// Outcome of a legacy import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Rows or associations written
    pub imported: usize,
    /// Entries skipped because a row already existed
    pub skipped: usize,
}

pub fn parse_legacy_summaries(json: &str) -> Result<BTreeMap<String, LegacySummary>> {
    serde_json::from_str(json)
        .map_err(|e| Error::InvalidInput(format!("legacy summary file: {e}")))
}

pub fn parse_legacy_tags(json: &str) -> Result<BTreeMap<String, Vec<String>>> {
    serde_json::from_str(json).map_err(|e| Error::InvalidInput(format!("legacy tag file: {e}")))
}

impl CommandStore {
    /// Bring forward records from the JSON summary store.
    ///
    /// Existing rows win; embeddings start out null.
    pub fn import_legacy_summaries(
        &self,
        entries: &BTreeMap<String, LegacySummary>,
    ) -> Result<ImportReport> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut report = ImportReport::default();

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO commands
                    (command_id, content_hash, summary, security_warning, embedding, last_updated)
                 VALUES (?1, ?2, ?3, NULL, NULL, ?4)",
            )?;
            let now = chrono::Utc::now().to_rfc3339();
            for (command_id, entry) in entries {
                let last_updated = entry
                    .last_updated
                    .as_ref()
                    .and_then(LegacyTimestamp::to_rfc3339)
                    .unwrap_or_else(|| now.clone());
                let inserted = stmt.execute(params![
                    command_id,
                    entry.content_hash,
                    entry.summary,
                    last_updated
                ])?;
                if inserted > 0 {
                    report.imported += 1;
                } else {
                    report.skipped += 1;
                }
            }
        }

        tx.commit()?;
        tracing::info!(
            imported = report.imported,
            skipped = report.skipped,
            "Imported legacy summaries"
        );
        Ok(report)
    }

    /// Replace every tag with the contents of a legacy tag map.
    ///
    /// Patterns become command ids (placeholder rows are created for unknown
    /// ones) and keep their list position as display order.
    pub fn import_legacy_tags(&self, tags: &BTreeMap<String, Vec<String>>) -> Result<ImportReport> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut report = ImportReport::default();
        let now = chrono::Utc::now().to_rfc3339();

        tx.execute("DELETE FROM tags", [])?;

        for (tag_name, patterns) in tags {
            let tag_id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO tags (tag_id, tag_name) VALUES (?1, ?2)",
                params![tag_id, tag_name],
            )?;

            for (index, pattern) in patterns.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO commands (command_id, content_hash, summary, last_updated)
                     VALUES (?1, '', '', ?2)",
                    params![pattern, now],
                )?;
                let order = i64::try_from(index).unwrap_or(i64::MAX);
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO command_tags (command_id, tag_id, display_order)
                     VALUES (?1, ?2, ?3)",
                    params![pattern, tag_id, order],
                )?;
                if inserted > 0 {
                    report.imported += 1;
                } else {
                    report.skipped += 1;
                }
            }
        }

        tx.commit()?;
        tracing::info!(
            tags = tags.len(),
            associations = report.imported,
            "Imported legacy tags"
        );
        Ok(report)
    }
}
