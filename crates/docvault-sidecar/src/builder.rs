//! Side-car construction for connectors.

use crate::schema::{ContentMeta, IngestMeta, LlmemoryMeta, Relationship, Sidecar};
use chrono::{DateTime, Utc};
use docvault_utils::error::SidecarError;
use docvault_utils::types::{ContentHash, DocumentId, EntityName, SourceKind, WorkflowName};
use serde_json::Value;

/// Builds consistent side-cars for one `(entity, source, workflow?)`
/// combination, stamping ingest provenance the same way every time.
#[derive(Debug, Clone)]
pub struct SidecarBuilder {
    entity: EntityName,
    source: SourceKind,
    workflow: Option<WorkflowName>,
    connector_version: String,
}

impl SidecarBuilder {
    #[must_use]
    pub fn new(entity: EntityName, source: SourceKind, workflow: Option<WorkflowName>) -> Self {
        Self {
            entity,
            source,
            workflow,
            connector_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the connector version recorded in `ingest.connector`.
    #[must_use]
    pub fn with_connector_version(mut self, version: impl Into<String>) -> Self {
        self.connector_version = version.into();
        self
    }

    /// Generate the document id for a payload handled by this builder.
    ///
    /// `workflow_or_stream` is the workflow name for documents and the
    /// stream name for stream archives.
    #[must_use]
    pub fn document_id(
        &self,
        workflow_or_stream: &str,
        created_at: DateTime<Utc>,
        content_hash: ContentHash,
    ) -> DocumentId {
        DocumentId::new(self.source, workflow_or_stream, created_at, content_hash)
    }

    /// Assemble and validate a complete side-car.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        id: DocumentId,
        content: ContentMeta,
        origin: Value,
        created_at: DateTime<Utc>,
        doc_type: &str,
        subtype: Option<String>,
        tags: Vec<String>,
        relationships: Vec<Relationship>,
    ) -> Result<Sidecar, SidecarError> {
        let sidecar = Sidecar {
            id,
            entity: self.entity.clone(),
            source: self.source,
            workflow: self.workflow.clone(),
            doc_type: doc_type.to_string(),
            subtype,
            created_at,
            content,
            origin,
            tags,
            relationships,
            ingest: IngestMeta {
                connector: format!("{}@{}", self.source, self.connector_version),
                ingested_at: Utc::now(),
                hostname: hostname::get().ok().and_then(|h| h.into_string().ok()),
                workflow_run_id: None,
            },
            llmemory: LlmemoryMeta::default(),
            accounting: None,
        };
        sidecar.validate()?;
        Ok(sidecar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use docvault_utils::hash_bytes;
    use serde_json::json;

    #[test]
    fn builder_stamps_provenance() {
        let builder = SidecarBuilder::new(
            EntityName::new("acme").unwrap(),
            SourceKind::Mail,
            Some(WorkflowName::new("acme-invoice").unwrap()),
        )
        .with_connector_version("0.4.0");

        let ts = Utc.with_ymd_and_hms(2025, 11, 5, 10, 0, 0).unwrap();
        let hash = hash_bytes(b"content");
        let id = builder.document_id("acme-invoice", ts, hash.clone());

        let sidecar = builder
            .build(
                id,
                ContentMeta {
                    path: "2025-11-05-mail-x.pdf".into(),
                    hash,
                    size_bytes: 7,
                    mimetype: "application/pdf".into(),
                    attachments: vec![],
                },
                json!({"from": "a@b.com"}),
                ts,
                "document",
                None,
                vec![],
                vec![],
            )
            .unwrap();

        assert_eq!(sidecar.ingest.connector, "mail@0.4.0");
        assert_eq!(sidecar.entity.as_str(), "acme");
        assert_eq!(sidecar.workflow.as_ref().unwrap().as_str(), "acme-invoice");
        assert!(sidecar.llmemory.indexed_at.is_none());
    }

    #[test]
    fn stream_builder_has_no_workflow() {
        let builder = SidecarBuilder::new(
            EntityName::new("acme").unwrap(),
            SourceKind::Slack,
            None,
        );
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let hash = hash_bytes(b"transcript");
        let id = builder.document_id("general", ts, hash.clone());
        assert!(id.to_string().starts_with("slack=general/"));

        let sidecar = builder
            .build(
                id,
                ContentMeta {
                    path: "2025-06-01-slack-x.md".into(),
                    hash,
                    size_bytes: 10,
                    mimetype: "text/markdown".into(),
                    attachments: vec![],
                },
                json!({}),
                ts,
                "document",
                None,
                vec![],
                vec![],
            )
            .unwrap();
        assert!(sidecar.workflow.is_none());
    }

    #[test]
    fn build_rejects_invalid_content() {
        let builder =
            SidecarBuilder::new(EntityName::new("acme").unwrap(), SourceKind::Mail, None);
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let hash = hash_bytes(b"x");
        let id = builder.document_id("stream", ts, hash.clone());
        let err = builder.build(
            id,
            ContentMeta {
                path: "file.bin".into(),
                hash,
                size_bytes: 0,
                mimetype: "application/octet-stream".into(),
                attachments: vec![],
            },
            json!({}),
            ts,
            "document",
            None,
            vec![],
            vec![],
        );
        assert!(err.is_err());
    }
}
