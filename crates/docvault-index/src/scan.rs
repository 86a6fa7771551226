//! The archive walk that (re)builds the global indexes.

use crate::db::{DocumentRow, GlobalIndex, StreamRow};
use crate::extractor::TextExtractor;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use docvault_sidecar::{LlmemoryMeta, Sidecar};
use docvault_utils::error::IndexError;
use docvault_utils::write_atomic;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

static DATE_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})-").expect("static regex"));
static DOC_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?:\.\./)+(docs/\d{4}/[^)\s]+)\)").expect("static regex"));

/// Directories under the base that are not entities.
const NON_ENTITY_DIRS: [&str; 2] = ["indexes", "tmp"];

/// Counters from one indexer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub documents: u64,
    pub streams: u64,
    pub links: u64,
    pub skipped: u64,
}

/// Walk the archive at `base` and upsert every document and stream.
///
/// Side-cars drive the document rows; a content file without a parseable
/// side-car is skipped with a warning and counted in the report.
/// Rebuilds are idempotent because every write is an upsert keyed on
/// `(entity, rel_path)`.
pub fn run_indexer(
    base: &Utf8Path,
    indexes_path: Option<&Utf8Path>,
    extractor: &dyn TextExtractor,
) -> Result<IndexReport, IndexError> {
    let default_path = GlobalIndex::default_path(base);
    let indexes_path = indexes_path.unwrap_or(&default_path);
    let index = GlobalIndex::open(indexes_path)?;
    let mut report = IndexReport::default();

    let entries = match std::fs::read_dir(base.as_std_path()) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("archive base {base} not readable: {e}");
            return Ok(report);
        }
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if NON_ENTITY_DIRS.contains(&name.as_str()) {
            continue;
        }
        let entity_dir = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|p| IndexError::Database(format!("non-utf8 path {}", p.display())))?;

        index_entity_docs(&index, &entity_dir, &name, extractor, &mut report);
        index_entity_streams(&index, &entity_dir, &name, &mut report);
    }

    info!(
        documents = report.documents,
        streams = report.streams,
        links = report.links,
        skipped = report.skipped,
        "index run complete"
    );
    Ok(report)
}

fn index_entity_docs(
    index: &GlobalIndex,
    entity_dir: &Utf8Path,
    entity: &str,
    extractor: &dyn TextExtractor,
    report: &mut IndexReport,
) {
    let docs_dir = entity_dir.join("docs");
    if !docs_dir.exists() {
        return;
    }

    for entry in walkdir::WalkDir::new(docs_dir.as_std_path())
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(path) = Utf8Path::from_path(entry.path()) else {
            continue;
        };
        let ext = path.extension().unwrap_or_default();
        if ext == "json" || path.file_name() == Some("manifest.jsonl") {
            continue;
        }

        let sidecar_path = path.with_extension("json");
        let sidecar = match std::fs::read_to_string(&sidecar_path)
            .map_err(|e| e.to_string())
            .and_then(|text| Sidecar::from_json(&text).map_err(|e| e.to_string()))
        {
            Ok(sidecar) => sidecar,
            Err(e) => {
                warn!("skipping {path}: unreadable side-car: {e}");
                report.skipped += 1;
                continue;
            }
        };

        let rel_path = match path.strip_prefix(entity_dir) {
            Ok(rel) => rel.to_string(),
            Err(_) => continue,
        };
        let filename = path.file_name().unwrap_or_default().to_string();
        let date = DATE_PREFIX_RE
            .captures(&filename)
            .map_or_else(|| "1970-01-01".to_string(), |c| c[1].to_string());

        let classifier = &sidecar.origin["classifier"];
        let row = DocumentRow {
            entity: entity.to_string(),
            date,
            filename: filename.clone(),
            rel_path,
            hash: Some(sidecar.content.hash.to_string()),
            size: sidecar.content.size_bytes as i64,
            doc_type: ext.to_string(),
            source: sidecar.source.to_string(),
            workflow: sidecar.workflow.as_ref().map(|w| w.as_str().to_string()),
            category: classifier["category"].as_str().map(String::from),
            confidence: classifier["confidence"].as_f64(),
            origin_json: sidecar.origin.to_string(),
            structured_json: sidecar
                .accounting
                .as_ref()
                .and_then(|a| serde_json::to_string(a).ok()),
        };

        let doc_id = match index.upsert_document(&row) {
            Ok(id) => id,
            Err(e) => {
                warn!("failed to index {path}: {e}");
                report.skipped += 1;
                continue;
            }
        };

        let subject = sidecar.origin["subject"].as_str().unwrap_or_default();
        let from = sidecar.origin["from"].as_str().unwrap_or_default();
        let extracted = extractor.extract_text(path, &sidecar.content.mimetype);
        let search_content = format!(
            "{subject} {from} {} {extracted}",
            path.file_stem().unwrap_or_default().replace('-', " ")
        );
        if let Err(e) = index.upsert_fts(doc_id, &filename, subject, from, &search_content) {
            warn!("failed to fts-index {path}: {e}");
        }
        report.documents += 1;
    }
}

fn index_entity_streams(
    index: &GlobalIndex,
    entity_dir: &Utf8Path,
    entity: &str,
    report: &mut IndexReport,
) {
    let streams_dir = entity_dir.join("streams");
    if !streams_dir.exists() {
        return;
    }

    // streams/{kind}/{channel}/{YYYY}/{file}
    for entry in walkdir::WalkDir::new(streams_dir.as_std_path())
        .min_depth(4)
        .max_depth(4)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(path) = Utf8Path::from_path(entry.path()) else {
            continue;
        };
        if path.extension() == Some("json") || path.file_name() == Some("manifest.jsonl") {
            continue;
        }

        let rel = match path.strip_prefix(entity_dir) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let mut components = rel.components().map(|c| c.as_str());
        let _streams = components.next();
        let (Some(kind), Some(channel)) = (components.next(), components.next()) else {
            continue;
        };

        let filename = path.file_name().unwrap_or_default();
        let date = DATE_PREFIX_RE
            .captures(filename)
            .map_or_else(|| "1970-01-01".to_string(), |c| c[1].to_string());

        let origin_json = path
            .with_extension("json")
            .exists()
            .then(|| std::fs::read_to_string(path.with_extension("json")).ok())
            .flatten()
            .and_then(|text| {
                Sidecar::from_json(&text)
                    .ok()
                    .map(|sidecar| sidecar.origin.to_string())
            })
            .unwrap_or_else(|| "{}".to_string());

        let stream_id = match index.upsert_stream(&StreamRow {
            entity: entity.to_string(),
            kind: kind.to_string(),
            channel_or_mailbox: channel.to_string(),
            date,
            rel_path: rel.to_string(),
            origin_json,
        }) {
            Ok(id) => id,
            Err(e) => {
                warn!("failed to index stream {path}: {e}");
                report.skipped += 1;
                continue;
            }
        };
        report.streams += 1;

        // Cross-references to archived documents inside the transcript.
        if let Ok(text) = std::fs::read_to_string(path.as_std_path()) {
            for capture in DOC_LINK_RE.captures_iter(&text) {
                let doc_rel = &capture[1];
                match index.document_id_for(entity, doc_rel) {
                    Ok(Some(doc_id)) => {
                        if index.add_link(stream_id, doc_id).is_ok() {
                            report.links += 1;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("link lookup failed for {doc_rel}: {e}"),
                }
            }
        }
    }
}

/// Fill a side-car's `llmemory` block after semantic indexing.
///
/// This is the one sanctioned post-write mutation of a side-car besides
/// accounting post-processors; content fields are never touched.
pub fn update_llmemory(
    sidecar_path: &Utf8Path,
    document_id: &str,
    chunks_created: Option<u64>,
    embedding_model: Option<String>,
    embedding_provider: Option<String>,
) -> Result<(), IndexError> {
    let text = std::fs::read_to_string(sidecar_path)?;
    let mut sidecar = Sidecar::from_json(&text)
        .map_err(|e| IndexError::Database(format!("side-car {sidecar_path}: {e}")))?;
    sidecar.llmemory = LlmemoryMeta {
        indexed_at: Some(Utc::now()),
        document_id: Some(document_id.to_string()),
        chunks_created,
        embedding_model,
        embedding_provider,
    };
    let json = sidecar
        .to_canonical_json()
        .map_err(|e| IndexError::Database(e.to_string()))?;
    write_atomic(sidecar_path, json.as_bytes())
        .map_err(|e| IndexError::Database(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SearchFilters;
    use crate::extractor::PlainTextExtractor;
    use chrono::TimeZone;
    use docvault_utils::hash_bytes;
    use docvault_utils::types::{DocumentId, EntityName, SourceKind, WorkflowName};
    use serde_json::json;
    use tempfile::TempDir;

    fn write_document(
        base: &Utf8Path,
        entity: &str,
        name: &str,
        content: &[u8],
        workflow: Option<&str>,
        subject: &str,
    ) {
        let dir = base.join(entity).join("docs").join("2025");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{name}.pdf")), content).unwrap();

        let ts = chrono::Utc.with_ymd_and_hms(2025, 11, 5, 10, 0, 0).unwrap();
        let hash = hash_bytes(content);
        let sidecar = Sidecar {
            id: DocumentId::new(SourceKind::Mail, workflow.unwrap_or("inbox"), ts, hash.clone()),
            entity: EntityName::new(entity).unwrap(),
            source: SourceKind::Mail,
            workflow: workflow.map(|w| WorkflowName::new(w).unwrap()),
            doc_type: "document".into(),
            subtype: None,
            created_at: ts,
            content: docvault_sidecar::ContentMeta {
                path: format!("{name}.pdf"),
                hash,
                size_bytes: content.len() as u64,
                mimetype: "application/pdf".into(),
                attachments: vec![],
            },
            origin: json!({"subject": subject, "from": "billing@acme.com"}),
            tags: vec![],
            relationships: vec![],
            ingest: docvault_sidecar::IngestMeta {
                connector: "mail@0.4.0".into(),
                ingested_at: ts,
                hostname: None,
                workflow_run_id: None,
            },
            llmemory: LlmemoryMeta::default(),
            accounting: None,
        };
        std::fs::write(
            dir.join(format!("{name}.json")),
            sidecar.to_canonical_json().unwrap(),
        )
        .unwrap();
    }

    fn base(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn indexes_documents_with_sidecars() {
        let dir = TempDir::new().unwrap();
        let base = base(&dir);
        write_document(
            &base,
            "acme",
            "2025-11-05-mail-abc",
            b"%PDF-1.4 x",
            Some("acme-invoice"),
            "Invoice October",
        );

        let report = run_indexer(&base, None, &PlainTextExtractor).unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.skipped, 0);

        let gi = GlobalIndex::open(&base.join("indexes")).unwrap();
        let hits = gi.search(Some("invoice"), &SearchFilters::default(), 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity, "acme");
        assert_eq!(hits[0].date, "2025-11-05");
        assert_eq!(hits[0].workflow.as_deref(), Some("acme-invoice"));
    }

    #[test]
    fn malformed_sidecars_are_skipped() {
        let dir = TempDir::new().unwrap();
        let base = base(&dir);
        let docs = base.join("acme").join("docs").join("2025");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("2025-01-01-mail-x.pdf"), b"%PDF").unwrap();
        std::fs::write(docs.join("2025-01-01-mail-x.json"), b"{ not json").unwrap();
        // And a content file with no side-car at all.
        std::fs::write(docs.join("2025-01-02-mail-y.pdf"), b"%PDF").unwrap();

        let report = run_indexer(&base, None, &PlainTextExtractor).unwrap();
        assert_eq!(report.documents, 0);
        assert_eq!(report.skipped, 2);
    }

    #[test]
    fn reindex_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let base = base(&dir);
        write_document(&base, "acme", "2025-11-05-mail-abc", b"%PDF-1.4 x", None, "s");

        run_indexer(&base, None, &PlainTextExtractor).unwrap();
        run_indexer(&base, None, &PlainTextExtractor).unwrap();

        let gi = GlobalIndex::open(&base.join("indexes")).unwrap();
        let hits = gi.search(None, &SearchFilters::default(), 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn streams_are_indexed_and_linked() {
        let dir = TempDir::new().unwrap();
        let base = base(&dir);
        write_document(&base, "acme", "2025-11-05-mail-abc", b"%PDF-1.4 x", None, "s");

        let stream_dir = base.join("acme/streams/slack/general/2025");
        std::fs::create_dir_all(&stream_dir).unwrap();
        std::fs::write(
            stream_dir.join("2025-06-01-slack-t.md"),
            "see [invoice](../../../../docs/2025/2025-11-05-mail-abc.pdf)\n",
        )
        .unwrap();

        let report = run_indexer(&base, None, &PlainTextExtractor).unwrap();
        assert_eq!(report.streams, 1);
        assert_eq!(report.links, 1);
    }

    #[test]
    fn llmemory_update_preserves_content_fields() {
        let dir = TempDir::new().unwrap();
        let base = base(&dir);
        write_document(&base, "acme", "2025-11-05-mail-abc", b"%PDF-1.4 x", None, "s");
        let sidecar_path = base.join("acme/docs/2025/2025-11-05-mail-abc.json");

        update_llmemory(
            &sidecar_path,
            "llm-doc-1",
            Some(4),
            Some("embed-small".into()),
            Some("local".into()),
        )
        .unwrap();

        let sidecar =
            Sidecar::from_json(&std::fs::read_to_string(&sidecar_path).unwrap()).unwrap();
        assert_eq!(sidecar.llmemory.document_id.as_deref(), Some("llm-doc-1"));
        assert_eq!(sidecar.llmemory.chunks_created, Some(4));
        assert!(sidecar.llmemory.indexed_at.is_some());
        assert_eq!(sidecar.content.size_bytes, 10);
    }
}
