//! Processed-item tracking to prevent duplicate archival.
//!
//! A small SQLite table keyed by content hash (unique) with the message
//! id as a secondary lookup. Hashing happens inside the tracker so
//! callers stay one-call: hand over the raw bytes and an optional
//! message id, get back "seen before" or a record of the prior run.
//!
//! The tracker is a single-writer store. A failed mark is reported, not
//! swallowed: the orchestrator must not report success for an item whose
//! processed mark did not land.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use docvault_utils::error::DedupError;
use docvault_utils::hash_bytes;
use docvault_utils::types::WorkflowName;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use tracing::debug;

/// A prior processing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedRecord {
    pub content_hash: String,
    pub message_id: Option<String>,
    pub workflow_name: String,
    pub processed_at: String,
}

/// Aggregate counts over the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerStatistics {
    pub total_processed: u64,
    pub by_workflow: BTreeMap<String, u64>,
}

/// The persistent dedup tracker.
pub struct DedupTracker {
    conn: Connection,
}

impl DedupTracker {
    /// Open (creating if needed) the tracker database at `db_path`.
    pub fn open(db_path: &Utf8Path) -> Result<Self, DedupError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DedupError::Database(format!("create {parent}: {e}")))?;
        }
        let conn = Connection::open(db_path.as_std_path())
            .map_err(|e| DedupError::Database(format!("open {db_path}: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| DedupError::Database(format!("journal_mode: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| DedupError::Database(format!("busy_timeout: {e}")))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS processed_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content_hash TEXT NOT NULL,
                message_id TEXT,
                workflow_name TEXT NOT NULL,
                processed_at TEXT NOT NULL,
                UNIQUE(content_hash)
            );
            CREATE INDEX IF NOT EXISTS idx_processed_message_id
                ON processed_items(message_id);
            ",
        )
        .map_err(|e| DedupError::Database(format!("initialize schema: {e}")))?;
        Ok(Self { conn })
    }

    /// Conventional tracker location under a state directory.
    #[must_use]
    pub fn default_path(state_dir: &Utf8Path) -> Utf8PathBuf {
        state_dir.join("processed_items.db")
    }

    /// Whether these bytes (or this message id) were processed before.
    ///
    /// The message id is checked first when provided; the content hash
    /// is the fallback and the authoritative key.
    pub fn is_processed(
        &self,
        content: &[u8],
        message_id: Option<&str>,
    ) -> Result<bool, DedupError> {
        if let Some(mid) = message_id {
            if !mid.is_empty() && self.count_by_message_id(mid)? > 0 {
                return Ok(true);
            }
        }
        let hash = hash_bytes(content);
        let count: u64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM processed_items WHERE content_hash = ?1",
                params![hash.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| DedupError::Database(format!("lookup by hash: {e}")))?;
        Ok(count > 0)
    }

    /// Record that these bytes were processed by `workflow`.
    ///
    /// Upserts on the content hash, so re-marking (e.g. after `--force`)
    /// replaces the prior record rather than failing.
    pub fn mark_processed(
        &self,
        content: &[u8],
        message_id: Option<&str>,
        workflow: &WorkflowName,
    ) -> Result<(), DedupError> {
        let hash = hash_bytes(content);
        let message_id = message_id.filter(|m| !m.is_empty());
        self.conn
            .execute(
                "INSERT OR REPLACE INTO processed_items
                 (content_hash, message_id, workflow_name, processed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    hash.as_str(),
                    message_id,
                    workflow.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|e| DedupError::Database(format!("mark processed: {e}")))?;
        debug!(
            hash = %hash,
            workflow = %workflow,
            "marked item as processed"
        );
        Ok(())
    }

    /// Fetch the prior record for these bytes or this message id.
    pub fn get_info(
        &self,
        content: &[u8],
        message_id: Option<&str>,
    ) -> Result<Option<ProcessedRecord>, DedupError> {
        if let Some(mid) = message_id {
            if !mid.is_empty() {
                if let Some(record) = self.lookup(
                    "SELECT content_hash, message_id, workflow_name, processed_at
                     FROM processed_items WHERE message_id = ?1
                     ORDER BY processed_at DESC LIMIT 1",
                    mid,
                )? {
                    return Ok(Some(record));
                }
            }
        }
        let hash = hash_bytes(content);
        self.lookup(
            "SELECT content_hash, message_id, workflow_name, processed_at
             FROM processed_items WHERE content_hash = ?1
             ORDER BY processed_at DESC LIMIT 1",
            hash.as_str(),
        )
    }

    /// Totals and per-workflow counts.
    pub fn statistics(&self) -> Result<TrackerStatistics, DedupError> {
        let total: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM processed_items", [], |row| row.get(0))
            .map_err(|e| DedupError::Database(format!("statistics: {e}")))?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT workflow_name, COUNT(*) FROM processed_items GROUP BY workflow_name",
            )
            .map_err(|e| DedupError::Database(format!("statistics: {e}")))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))
            .map_err(|e| DedupError::Database(format!("statistics: {e}")))?;

        let mut by_workflow = BTreeMap::new();
        for row in rows {
            let (workflow, count) =
                row.map_err(|e| DedupError::Database(format!("statistics: {e}")))?;
            by_workflow.insert(workflow, count);
        }

        Ok(TrackerStatistics {
            total_processed: total,
            by_workflow,
        })
    }

    fn count_by_message_id(&self, message_id: &str) -> Result<u64, DedupError> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM processed_items WHERE message_id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .map_err(|e| DedupError::Database(format!("lookup by message id: {e}")))
    }

    fn lookup(&self, sql: &str, key: &str) -> Result<Option<ProcessedRecord>, DedupError> {
        self.conn
            .query_row(sql, params![key], |row| {
                Ok(ProcessedRecord {
                    content_hash: row.get(0)?,
                    message_id: row.get(1)?,
                    workflow_name: row.get(2)?,
                    processed_at: row.get(3)?,
                })
            })
            .optional()
            .map_err(|e| DedupError::Database(format!("lookup record: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn open_tracker(dir: &TempDir) -> DedupTracker {
        let path = Utf8PathBuf::from_path_buf(dir.path().join("processed.db")).unwrap();
        DedupTracker::open(&path).unwrap()
    }

    fn wf(name: &str) -> WorkflowName {
        WorkflowName::new(name).unwrap()
    }

    #[test]
    fn processed_after_mark() {
        let dir = TempDir::new().unwrap();
        let tracker = open_tracker(&dir);
        let content = b"raw email bytes";

        assert!(!tracker.is_processed(content, None).unwrap());
        tracker
            .mark_processed(content, None, &wf("acme-invoice"))
            .unwrap();
        assert!(tracker.is_processed(content, None).unwrap());
    }

    #[test]
    fn message_id_is_a_secondary_key() {
        let dir = TempDir::new().unwrap();
        let tracker = open_tracker(&dir);
        tracker
            .mark_processed(b"original bytes", Some("<msg1@example.com>"), &wf("a-b"))
            .unwrap();

        // Same message id, different bytes (e.g. re-downloaded with
        // altered headers) still counts as processed.
        assert!(tracker
            .is_processed(b"different bytes", Some("<msg1@example.com>"))
            .unwrap());
        // Unknown message id falls back to the hash.
        assert!(tracker
            .is_processed(b"original bytes", Some("<other@example.com>"))
            .unwrap());
        assert!(!tracker
            .is_processed(b"different bytes", Some("<other@example.com>"))
            .unwrap());
    }

    #[test]
    fn get_info_returns_workflow_and_timestamp() {
        let dir = TempDir::new().unwrap();
        let tracker = open_tracker(&dir);
        tracker
            .mark_processed(b"bytes", Some("<m@x>"), &wf("tsm-expense"))
            .unwrap();

        let info = tracker.get_info(b"bytes", Some("<m@x>")).unwrap().unwrap();
        assert_eq!(info.workflow_name, "tsm-expense");
        assert_eq!(info.message_id.as_deref(), Some("<m@x>"));
        assert!(!info.processed_at.is_empty());

        assert!(tracker.get_info(b"unseen", None).unwrap().is_none());
    }

    #[test]
    fn remark_replaces_workflow() {
        let dir = TempDir::new().unwrap();
        let tracker = open_tracker(&dir);
        tracker.mark_processed(b"bytes", None, &wf("old-wf")).unwrap();
        tracker.mark_processed(b"bytes", None, &wf("new-wf")).unwrap();

        let info = tracker.get_info(b"bytes", None).unwrap().unwrap();
        assert_eq!(info.workflow_name, "new-wf");
        assert_eq!(tracker.statistics().unwrap().total_processed, 1);
    }

    #[test]
    fn statistics_group_by_workflow() {
        let dir = TempDir::new().unwrap();
        let tracker = open_tracker(&dir);
        tracker.mark_processed(b"a", None, &wf("acme-invoice")).unwrap();
        tracker.mark_processed(b"b", None, &wf("acme-invoice")).unwrap();
        tracker.mark_processed(b"c", None, &WorkflowName::skip()).unwrap();

        let stats = tracker.statistics().unwrap();
        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.by_workflow["acme-invoice"], 2);
        assert_eq!(stats.by_workflow["_skip"], 1);
    }

    #[test]
    fn empty_message_id_is_ignored() {
        let dir = TempDir::new().unwrap();
        let tracker = open_tracker(&dir);
        tracker.mark_processed(b"bytes", Some(""), &wf("a-b")).unwrap();
        let info = tracker.get_info(b"bytes", Some("")).unwrap().unwrap();
        assert_eq!(info.message_id, None);
    }

    #[test]
    fn tracker_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("processed.db")).unwrap();
        {
            let tracker = DedupTracker::open(&path).unwrap();
            tracker.mark_processed(b"bytes", None, &wf("a-b")).unwrap();
        }
        let tracker = DedupTracker::open(&path).unwrap();
        assert!(tracker.is_processed(b"bytes", None).unwrap());
    }
}
