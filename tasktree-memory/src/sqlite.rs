//! SQLite-backed command store.
//!
//! Three tables:
//! - `commands`: one row per discovered command, keyed by its stable id
//! - `tags`: named groups such as a quick-launch list
//! - `command_tags`: the junction, with a per-tag `display_order`
//!
//! Foreign keys are enforced on every connection and the junction cascades
//! on delete from either side, so no association can outlive its command or
//! tag. The store holds a single connection for the lifetime of a workspace
//! session; statements run synchronously in issue order.

use crate::types::{parse_millis, CommandRow, ScoredCommand};
use crate::vector::{bytes_to_vec, rank_by_similarity, vec_to_bytes};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tasktree_common::{Error, Result};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS commands (
        command_id TEXT PRIMARY KEY,
        content_hash TEXT NOT NULL DEFAULT '',
        summary TEXT NOT NULL DEFAULT '',
        security_warning TEXT,
        embedding BLOB,
        last_updated TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tags (
        tag_id TEXT PRIMARY KEY,
        tag_name TEXT NOT NULL UNIQUE,
        description TEXT
    );

    CREATE TABLE IF NOT EXISTS command_tags (
        command_id TEXT NOT NULL,
        tag_id TEXT NOT NULL,
        display_order INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (command_id, tag_id),
        FOREIGN KEY (command_id) REFERENCES commands(command_id) ON DELETE CASCADE,
        FOREIGN KEY (tag_id) REFERENCES tags(tag_id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_command_tags_tag ON command_tags(tag_id, display_order);
"#;

const ROW_COLUMNS: &str =
    "command_id, content_hash, summary, security_warning, embedding, last_updated";

/// Persistent command knowledge store.
pub struct CommandStore {
    db_path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

/// Columns as read from SQLite, before the embedding blob is decoded.
struct RawRow {
    command_id: String,
    content_hash: String,
    summary: String,
    security_warning: Option<String>,
    embedding: Option<Vec<u8>>,
    last_updated: String,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            command_id: row.get(0)?,
            content_hash: row.get(1)?,
            summary: row.get(2)?,
            security_warning: row.get(3)?,
            embedding: row.get(4)?,
            last_updated: row.get(5)?,
        })
    }

    fn decode(self) -> Result<CommandRow> {
        let embedding = self
            .embedding
            .as_deref()
            .map(bytes_to_vec)
            .transpose()
            .map_err(|e| e.with_context(format!("command '{}'", self.command_id)))?;

        Ok(CommandRow {
            last_updated: parse_millis(&self.last_updated),
            command_id: self.command_id,
            content_hash: self.content_hash,
            summary: self.summary,
            security_warning: self.security_warning,
            embedding,
        })
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn tag_id(conn: &Connection, tag_name: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT tag_id FROM tags WHERE tag_name = ?1",
            params![tag_name],
            |row| row.get(0),
        )
        .optional()?)
}

fn ensure_tag(conn: &Connection, tag_name: &str) -> Result<String> {
    if let Some(id) = tag_id(conn, tag_name)? {
        return Ok(id);
    }
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO tags (tag_id, tag_name) VALUES (?1, ?2)",
        params![id, tag_name],
    )?;
    tracing::debug!(tag = %tag_name, tag_id = %id, "Created tag");
    Ok(id)
}

fn ensure_command(conn: &Connection, command_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO commands (command_id, content_hash, summary, last_updated)
         VALUES (?1, '', '', ?2)",
        params![command_id, now()],
    )?;
    Ok(())
}

impl CommandStore {
    /// Open (or create) the store at `db_path`.
    ///
    /// Any failure to open the file or apply the schema is an
    /// [`Error::OpenFailure`]; there is no degraded mode.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::OpenFailure(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::OpenFailure(format!("{}: {e}", db_path.display())))?;
        Self::init(&conn)
            .map_err(|e| Error::OpenFailure(format!("{}: {e}", db_path.display())))?;

        tracing::debug!(path = %db_path.display(), "Opened command store");
        Ok(Self {
            db_path: Some(db_path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Open the store at `{workspace}/.tasktree/tasktree.sqlite3`.
    pub fn open_in_workspace(workspace: &Path) -> Result<Self> {
        Self::open(&tasktree_common::config::db_path(workspace))
    }

    /// In-memory store, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OpenFailure(e.to_string()))?;
        Self::init(&conn).map_err(|e| Error::OpenFailure(e.to_string()))?;
        Ok(Self {
            db_path: None,
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> rusqlite::Result<()> {
        conn.pragma_update(None, "foreign_keys", 1)?;
        conn.execute_batch(SCHEMA)
    }

    /// Path of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("connection mutex poisoned".into()))
    }

    // ── Commands ──────────────────────────────────────────────────

    /// Insert a command with an empty summary, or update only its hash.
    ///
    /// Summary, security warning and embedding of an existing row are never
    /// touched here, even when the hash changes.
    pub fn register_command(&self, command_id: &str, content_hash: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO commands (command_id, content_hash, summary, last_updated)
             VALUES (?1, ?2, '', ?3)
             ON CONFLICT(command_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                last_updated = excluded.last_updated",
            params![command_id, content_hash, now()],
        )?;
        tracing::debug!(command_id = %command_id, "Registered command");
        Ok(())
    }

    /// Overwrite the summary-bearing fields after a fresh summarization.
    ///
    /// Leaves the embedding column alone.
    pub fn upsert_summary(
        &self,
        command_id: &str,
        content_hash: &str,
        summary: &str,
        security_warning: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO commands (command_id, content_hash, summary, security_warning, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(command_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                summary = excluded.summary,
                security_warning = excluded.security_warning,
                last_updated = excluded.last_updated",
            params![command_id, content_hash, summary, security_warning, now()],
        )?;
        tracing::debug!(command_id = %command_id, "Stored summary");
        Ok(())
    }

    /// Write the embedding column for an existing command.
    pub fn update_embedding(&self, command_id: &str, embedding: &[f32]) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE commands SET embedding = ?1, last_updated = ?2 WHERE command_id = ?3",
            params![vec_to_bytes(embedding), now(), command_id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("command '{command_id}'")));
        }
        tracing::debug!(command_id = %command_id, dims = embedding.len(), "Stored embedding");
        Ok(())
    }

    /// Drop a row's embedding so the next run backfills it.
    ///
    /// Returns `false` if the row does not exist.
    pub fn clear_embedding(&self, command_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE commands SET embedding = NULL, last_updated = ?1 WHERE command_id = ?2",
            params![now(), command_id],
        )?;
        Ok(changed > 0)
    }

    /// Point lookup.
    pub fn get_row(&self, command_id: &str) -> Result<Option<CommandRow>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {ROW_COLUMNS} FROM commands WHERE command_id = ?1"),
                params![command_id],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::decode).transpose()
    }

    /// Every command row, ordered by id.
    pub fn get_all_rows(&self) -> Result<Vec<CommandRow>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {ROW_COLUMNS} FROM commands ORDER BY command_id"))?;
        let raws = stmt
            .query_map([], RawRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawRow::decode).collect()
    }

    /// Create an empty placeholder row if the command is unknown.
    pub fn ensure_command_exists(&self, command_id: &str) -> Result<()> {
        let conn = self.lock()?;
        ensure_command(&conn, command_id)
    }

    /// Delete a command and, through the cascade, its tag associations.
    pub fn delete_command(&self, command_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM commands WHERE command_id = ?1",
            params![command_id],
        )?;
        Ok(deleted > 0)
    }

    pub fn count_commands(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM commands", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    // ── Tags ──────────────────────────────────────────────────────

    /// Attach a tag to a command, creating either side as needed.
    ///
    /// Re-adding an existing pair is a no-op. New associations go to the end
    /// of the tag's display order.
    pub fn add_tag_to_command(&self, command_id: &str, tag_name: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        ensure_command(&tx, command_id)?;
        let tag_id = ensure_tag(&tx, tag_name)?;
        tx.execute(
            "INSERT OR IGNORE INTO command_tags (command_id, tag_id, display_order)
             VALUES (?1, ?2,
                (SELECT COALESCE(MAX(display_order) + 1, 0) FROM command_tags WHERE tag_id = ?2))",
            params![command_id, tag_id],
        )?;

        tx.commit()?;
        tracing::debug!(command_id = %command_id, tag = %tag_name, "Tagged command");
        Ok(())
    }

    /// Detach a tag from a command. Returns whether an association existed.
    pub fn remove_tag_from_command(&self, command_id: &str, tag_name: &str) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM command_tags
             WHERE command_id = ?1
               AND tag_id = (SELECT tag_id FROM tags WHERE tag_name = ?2)",
            params![command_id, tag_name],
        )?;
        Ok(removed > 0)
    }

    /// Command ids carrying `tag_name`, in display order.
    pub fn get_command_ids_by_tag(&self, tag_name: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT ct.command_id
             FROM command_tags ct
             JOIN tags t ON t.tag_id = ct.tag_id
             WHERE t.tag_name = ?1
             ORDER BY ct.display_order, ct.command_id",
        )?;
        let ids = stmt
            .query_map(params![tag_name], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Tag names attached to a command, sorted by name.
    pub fn get_tags_for_command(&self, command_id: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT t.tag_name
             FROM tags t
             JOIN command_tags ct ON ct.tag_id = t.tag_id
             WHERE ct.command_id = ?1
             ORDER BY t.tag_name",
        )?;
        let names = stmt
            .query_map(params![command_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn get_all_tag_names(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT tag_name FROM tags ORDER BY tag_name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Rewrite display order for a tag from a full ordered id list.
    ///
    /// Ids without an existing association are skipped. Fails with
    /// [`Error::NotFound`] if the tag does not exist; nothing is written in
    /// that case.
    pub fn reorder_tag_commands(&self, tag_name: &str, ordered_ids: &[String]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let tag_id =
            tag_id(&tx, tag_name)?.ok_or_else(|| Error::NotFound(format!("tag '{tag_name}'")))?;

        {
            let mut stmt = tx.prepare(
                "UPDATE command_tags SET display_order = ?1 WHERE tag_id = ?2 AND command_id = ?3",
            )?;
            for (index, command_id) in ordered_ids.iter().enumerate() {
                let order = i64::try_from(index).unwrap_or(i64::MAX);
                if stmt.execute(params![order, tag_id, command_id])? == 0 {
                    tracing::debug!(tag = %tag_name, command_id = %command_id, "Reorder skipped untagged command");
                }
            }
        }

        tx.commit()?;
        tracing::debug!(tag = %tag_name, count = ordered_ids.len(), "Reordered tag");
        Ok(())
    }

    /// Delete a tag and all of its associations.
    pub fn delete_tag(&self, tag_name: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM tags WHERE tag_name = ?1", params![tag_name])?;
        Ok(deleted > 0)
    }

    // ── Maintenance ───────────────────────────────────────────────

    /// Remove junction rows whose command or tag no longer exists.
    ///
    /// Only databases written before foreign keys were enforced can contain
    /// such rows.
    pub fn cleanup_orphaned_records(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM command_tags
             WHERE command_id NOT IN (SELECT command_id FROM commands)
                OR tag_id NOT IN (SELECT tag_id FROM tags)",
            [],
        )?;
        if removed > 0 {
            tracing::info!(removed, "Removed orphaned tag associations");
        }
        Ok(removed)
    }

    pub fn health_check(&self) -> bool {
        self.lock()
            .map(|conn| conn.execute_batch("SELECT 1").is_ok())
            .unwrap_or(false)
    }

    // ── Search ────────────────────────────────────────────────────

    /// Rank every embedded command against `query`.
    ///
    /// Rows whose blob fails to decode are skipped with a warning.
    pub fn semantic_search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredCommand>> {
        let raws = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {ROW_COLUMNS} FROM commands WHERE embedding IS NOT NULL ORDER BY command_id"
            ))?;
            let raws = stmt
                .query_map([], RawRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            raws
        };

        let rows: Vec<CommandRow> = raws
            .into_iter()
            .filter_map(|raw| match raw.decode() {
                Ok(row) => Some(row),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable embedding");
                    None
                }
            })
            .collect();

        let candidates = rows
            .iter()
            .filter_map(|row| row.embedding.as_deref().map(|v| (row, v)));

        Ok(rank_by_similarity(query, candidates, top_k, threshold)
            .into_iter()
            .map(|hit| ScoredCommand {
                command_id: hit.id.command_id.clone(),
                summary: hit.id.summary.clone(),
                security_warning: hit.id.security_warning.clone(),
                score: hit.score,
            })
            .collect())
    }
}
