//! Typed side-car schema and validation.

use chrono::{DateTime, Utc};
use docvault_utils::error::SidecarError;
use docvault_utils::types::{ContentHash, DocumentId, EntityName, SourceKind, WorkflowName};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content file information within a side-car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMeta {
    /// Relative path from the side-car to the content file (a sibling
    /// filename, never a directory traversal).
    pub path: String,
    pub hash: ContentHash,
    pub size_bytes: u64,
    pub mimetype: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Ingestion provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestMeta {
    /// Connector name and version, e.g. `mail@0.4.0`.
    pub connector: String,
    pub ingested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_run_id: Option<String>,
}

/// Semantic-index status, filled in by the indexer after the fact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmemoryMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks_created: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
}

/// A typed cross-reference to another archived document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "type")]
    pub kind: String,
    pub target_id: String,
}

/// Accounting data appended by post-processors; drives the exporters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Accounting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expense: Option<ExpenseRecord>,
}

/// One expense extracted from an archived document.
///
/// `expense_date`, `vendor`, `total_amount`, and `currency` are required
/// by the exporters; rows missing any of them are skipped with a
/// warning. Amounts stay strings end to end so exports never reformat
/// what the source said.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    #[serde(default)]
    pub expense_date: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub total_amount: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document_id: Option<String>,
    #[serde(default)]
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_center: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl ExpenseRecord {
    /// Whether the exporter-required fields are all present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.expense_date.is_empty()
            && !self.vendor.is_empty()
            && !self.total_amount.is_empty()
            && !self.currency.is_empty()
    }
}

/// The complete side-car document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    pub id: DocumentId,
    pub entity: EntityName,
    pub source: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowName>,
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub created_at: DateTime<Utc>,
    pub content: ContentMeta,
    /// Source-specific metadata, preserved verbatim.
    pub origin: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    pub ingest: IngestMeta,
    #[serde(default)]
    pub llmemory: LlmemoryMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounting: Option<Accounting>,
}

impl Sidecar {
    /// Validate invariants the type system cannot carry.
    ///
    /// Entity, workflow, hash format, and id shape are enforced by their
    /// types at deserialization; this checks the rest: a non-empty
    /// doc type, a positive content size, and a content path that stays
    /// a sibling of the side-car.
    pub fn validate(&self) -> Result<(), SidecarError> {
        if self.doc_type.is_empty() {
            return Err(SidecarError::Invalid {
                field: "type",
                reason: "must not be empty".to_string(),
            });
        }
        if self.content.size_bytes == 0 {
            return Err(SidecarError::Invalid {
                field: "content.size_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        validate_sibling_path("content.path", &self.content.path)?;
        for att in &self.content.attachments {
            validate_sibling_path("content.attachments", att)?;
        }
        if !self.origin.is_object() {
            return Err(SidecarError::Invalid {
                field: "origin",
                reason: "must be a JSON object".to_string(),
            });
        }
        Ok(())
    }

    /// Parse and validate a side-car from JSON text.
    pub fn from_json(text: &str) -> Result<Self, SidecarError> {
        let sidecar: Self = serde_json::from_str(text)?;
        sidecar.validate()?;
        Ok(sidecar)
    }

    /// Serialize to canonical JSON: two-space indentation with keys in
    /// sorted order, so identical side-cars are byte-identical.
    pub fn to_canonical_json(&self) -> Result<String, SidecarError> {
        // serde_json's default map is ordered by key, so round-tripping
        // through Value sorts every object.
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

fn validate_sibling_path(field: &'static str, path: &str) -> Result<(), SidecarError> {
    if path.is_empty() {
        return Err(SidecarError::Invalid {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    if path.starts_with('/') || path.contains("..") || path.contains('\\') || path.contains('/') {
        return Err(SidecarError::Invalid {
            field,
            reason: format!("'{path}' must be a plain sibling filename"),
        });
    }
    Ok(())
}
