//! SQLite schema and queries for the global index.

use camino::{Utf8Path, Utf8PathBuf};
use docvault_utils::error::IndexError;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

/// One document row for upsert.
#[derive(Debug, Clone, Default)]
pub struct DocumentRow {
    pub entity: String,
    /// `YYYY-MM-DD`, extracted from the filename.
    pub date: String,
    pub filename: String,
    /// Path relative to the entity directory; unique per entity.
    pub rel_path: String,
    pub hash: Option<String>,
    pub size: i64,
    pub doc_type: String,
    pub source: String,
    pub workflow: Option<String>,
    pub category: Option<String>,
    pub confidence: Option<f64>,
    pub origin_json: String,
    pub structured_json: Option<String>,
}

/// One stream row for upsert.
#[derive(Debug, Clone, Default)]
pub struct StreamRow {
    pub entity: String,
    pub kind: String,
    pub channel_or_mailbox: String,
    pub date: String,
    pub rel_path: String,
    pub origin_json: String,
}

/// A search result.
#[derive(Debug, Clone)]
pub struct DocumentHit {
    pub id: i64,
    pub entity: String,
    pub date: String,
    pub filename: String,
    pub rel_path: String,
    pub source: String,
    pub workflow: Option<String>,
    pub category: Option<String>,
    pub origin_json: String,
}

/// Equality filters that compose onto any search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub entity: Option<String>,
    pub source: Option<String>,
    pub workflow: Option<String>,
    pub category: Option<String>,
}

impl SearchFilters {
    fn clauses(&self) -> (Vec<&'static str>, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(v) = &self.entity {
            clauses.push("entity = ?");
            values.push(v.clone());
        }
        if let Some(v) = &self.source {
            clauses.push("source = ?");
            values.push(v.clone());
        }
        if let Some(v) = &self.workflow {
            clauses.push("workflow = ?");
            values.push(v.clone());
        }
        if let Some(v) = &self.category {
            clauses.push("category = ?");
            values.push(v.clone());
        }
        (clauses, values)
    }
}

/// Handle over `metadata.db` and `fts.db`.
///
/// Writers hold one `GlobalIndex`; readers open their own. Every upsert
/// is its own transaction.
pub struct GlobalIndex {
    meta: Connection,
    fts: Connection,
}

impl GlobalIndex {
    /// Open (creating and migrating if needed) the index pair under
    /// `indexes_path`.
    pub fn open(indexes_path: &Utf8Path) -> Result<Self, IndexError> {
        std::fs::create_dir_all(indexes_path)?;
        let meta = open_db(&indexes_path.join("metadata.db"))?;
        let fts = open_db(&indexes_path.join("fts.db"))?;

        meta.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              entity TEXT NOT NULL,
              date TEXT NOT NULL,
              filename TEXT NOT NULL,
              rel_path TEXT NOT NULL,
              hash TEXT,
              size INTEGER,
              type TEXT NOT NULL,
              source TEXT NOT NULL,
              workflow TEXT,
              category TEXT,
              confidence REAL,
              origin_json TEXT NOT NULL,
              structured_json TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_documents_entity_rel
              ON documents(entity, rel_path);
            CREATE INDEX IF NOT EXISTS ix_documents_entity_date
              ON documents(entity, date);

            CREATE TABLE IF NOT EXISTS streams (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              entity TEXT NOT NULL,
              kind TEXT NOT NULL,
              channel_or_mailbox TEXT NOT NULL,
              date TEXT NOT NULL,
              rel_path TEXT NOT NULL,
              origin_json TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_streams_entity_rel
              ON streams(entity, rel_path);
            CREATE INDEX IF NOT EXISTS ix_streams_kind_channel
              ON streams(kind, channel_or_mailbox);

            CREATE TABLE IF NOT EXISTS links (
              stream_id INTEGER NOT NULL,
              document_id INTEGER NOT NULL,
              PRIMARY KEY (stream_id, document_id)
            );
            ",
        )
        .map_err(db_err("initialize metadata schema"))?;

        fts.execute_batch(
            "
            CREATE VIRTUAL TABLE IF NOT EXISTS pdf_search
            USING fts5(filename, email_subject, email_from, search_content);
            ",
        )
        .map_err(db_err("initialize fts schema"))?;

        Ok(Self { meta, fts })
    }

    /// Conventional index location for an archive base.
    #[must_use]
    pub fn default_path(base: &Utf8Path) -> Utf8PathBuf {
        base.join("indexes")
    }

    /// Insert or update a document; only mutable fields change on
    /// conflict. Returns the row id.
    pub fn upsert_document(&self, row: &DocumentRow) -> Result<i64, IndexError> {
        self.meta
            .execute(
                "INSERT INTO documents
                   (entity, date, filename, rel_path, hash, size, type, source,
                    workflow, category, confidence, origin_json, structured_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(entity, rel_path) DO UPDATE SET
                   hash = excluded.hash,
                   size = excluded.size,
                   workflow = excluded.workflow,
                   category = excluded.category,
                   confidence = excluded.confidence,
                   origin_json = excluded.origin_json,
                   structured_json = excluded.structured_json",
                params![
                    row.entity,
                    row.date,
                    row.filename,
                    row.rel_path,
                    row.hash,
                    row.size,
                    row.doc_type,
                    row.source,
                    row.workflow,
                    row.category,
                    row.confidence,
                    row.origin_json,
                    row.structured_json,
                ],
            )
            .map_err(db_err("upsert document"))?;

        self.meta
            .query_row(
                "SELECT id FROM documents WHERE entity = ?1 AND rel_path = ?2",
                params![row.entity, row.rel_path],
                |r| r.get(0),
            )
            .map_err(db_err("fetch document id"))
    }

    /// Insert or update a stream row. Returns the row id.
    pub fn upsert_stream(&self, row: &StreamRow) -> Result<i64, IndexError> {
        self.meta
            .execute(
                "INSERT INTO streams
                   (entity, kind, channel_or_mailbox, date, rel_path, origin_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(entity, rel_path) DO UPDATE SET
                   origin_json = excluded.origin_json",
                params![
                    row.entity,
                    row.kind,
                    row.channel_or_mailbox,
                    row.date,
                    row.rel_path,
                    row.origin_json,
                ],
            )
            .map_err(db_err("upsert stream"))?;

        self.meta
            .query_row(
                "SELECT id FROM streams WHERE entity = ?1 AND rel_path = ?2",
                params![row.entity, row.rel_path],
                |r| r.get(0),
            )
            .map_err(db_err("fetch stream id"))
    }

    /// Record a stream-to-document cross-reference.
    pub fn add_link(&self, stream_id: i64, document_id: i64) -> Result<(), IndexError> {
        self.meta
            .execute(
                "INSERT OR IGNORE INTO links (stream_id, document_id) VALUES (?1, ?2)",
                params![stream_id, document_id],
            )
            .map_err(db_err("add link"))?;
        Ok(())
    }

    /// Look up a document id by its entity-relative path.
    pub fn document_id_for(
        &self,
        entity: &str,
        rel_path: &str,
    ) -> Result<Option<i64>, IndexError> {
        self.meta
            .query_row(
                "SELECT id FROM documents WHERE entity = ?1 AND rel_path = ?2",
                params![entity, rel_path],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err("lookup document"))
    }

    /// Replace the FTS row mirroring a document.
    pub fn upsert_fts(
        &self,
        doc_id: i64,
        filename: &str,
        email_subject: &str,
        email_from: &str,
        search_content: &str,
    ) -> Result<(), IndexError> {
        self.fts
            .execute("DELETE FROM pdf_search WHERE rowid = ?1", params![doc_id])
            .map_err(db_err("clear fts row"))?;
        self.fts
            .execute(
                "INSERT INTO pdf_search (rowid, filename, email_subject, email_from, search_content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![doc_id, filename, email_subject, email_from, search_content],
            )
            .map_err(db_err("insert fts row"))?;
        Ok(())
    }

    /// Search documents.
    ///
    /// With a query: BM25-ranked FTS matches, then filters applied on
    /// the metadata side. Without: newest documents first
    /// (`date DESC, id DESC`) under the same filters.
    pub fn search(
        &self,
        query: Option<&str>,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<DocumentHit>, IndexError> {
        match query.filter(|q| !q.trim().is_empty()) {
            None => self.browse(filters, limit),
            Some(query) => self.fts_search(query, filters, limit),
        }
    }

    fn browse(&self, filters: &SearchFilters, limit: usize) -> Result<Vec<DocumentHit>, IndexError> {
        let (clauses, values) = filters.clauses();
        let mut sql = String::from(
            "SELECT id, entity, date, filename, rel_path, source, workflow, category, origin_json
             FROM documents",
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY date DESC, id DESC LIMIT {limit}"));

        let mut stmt = self.meta.prepare(&sql).map_err(db_err("prepare browse"))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), hit_from_row)
            .map_err(db_err("browse"))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err("browse rows"))
    }

    fn fts_search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<DocumentHit>, IndexError> {
        let escaped = escape_fts_query(query);
        let mut stmt = self
            .fts
            .prepare(
                "SELECT rowid, bm25(pdf_search) AS score
                 FROM pdf_search WHERE pdf_search MATCH ?1
                 ORDER BY score LIMIT ?2",
            )
            .map_err(db_err("prepare fts"))?;
        let ids: Vec<i64> = stmt
            .query_map(params![escaped, limit as i64], |r| r.get(0))
            .map_err(db_err("fts query"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err("fts rows"))?;

        let (clauses, values) = filters.clauses();
        let mut hits = Vec::new();
        for doc_id in ids {
            let mut sql = String::from(
                "SELECT id, entity, date, filename, rel_path, source, workflow, category, origin_json
                 FROM documents WHERE id = ?",
            );
            for clause in &clauses {
                sql.push_str(" AND ");
                sql.push_str(clause);
            }
            let mut params: Vec<rusqlite::types::Value> = vec![doc_id.into()];
            params.extend(values.iter().cloned().map(rusqlite::types::Value::from));

            let hit = self
                .meta
                .query_row(&sql, params_from_iter(params), hit_from_row)
                .optional()
                .map_err(db_err("fts join"))?;
            if let Some(hit) = hit {
                hits.push(hit);
            }
        }
        debug!(query, hits = hits.len(), "fts search");
        Ok(hits)
    }
}

fn hit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentHit> {
    Ok(DocumentHit {
        id: row.get(0)?,
        entity: row.get(1)?,
        date: row.get(2)?,
        filename: row.get(3)?,
        rel_path: row.get(4)?,
        source: row.get(5)?,
        workflow: row.get(6)?,
        category: row.get(7)?,
        origin_json: row.get(8)?,
    })
}

fn open_db(path: &Utf8Path) -> Result<Connection, IndexError> {
    let conn =
        Connection::open(path.as_std_path()).map_err(db_err(&format!("open {path}")))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(db_err("journal_mode"))?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(db_err("busy_timeout"))?;
    Ok(conn)
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> IndexError + '_ {
    move |e| IndexError::Database(format!("{context}: {e}"))
}

/// Quote each term so user input cannot inject FTS5 syntax.
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}
