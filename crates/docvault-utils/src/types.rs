//! Validated core types shared across the docvault workspace.
//!
//! String patterns that the archive protocol depends on (entity names,
//! workflow names, content hashes, document ids) are encoded as smart
//! constructors here. Call sites never re-check the patterns; an
//! `EntityName` in hand is always valid.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lowercase alphanumeric plus `-` and `_`, the shared shape of entity,
/// source, and workflow identifiers.
static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("static regex"));

/// `sha256:` followed by 64 lowercase hex characters.
static HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sha256:[0-9a-f]{64}$").expect("static regex"));

/// The workflow name reserved for user-validated negative examples.
pub const SKIP_WORKFLOW: &str = "_skip";

/// Errors from the smart constructors in this module.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid {what} '{value}': must match [a-z0-9_-]+")]
    InvalidName { what: &'static str, value: String },

    #[error("invalid content hash '{0}': expected sha256: followed by 64 lowercase hex chars")]
    InvalidHash(String),

    #[error("invalid document id '{0}': {1}")]
    InvalidDocumentId(String, &'static str),
}

/// Origin of an ingested item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Mail,
    Slack,
    Gdocs,
    Localdocs,
    Other,
}

impl SourceKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Slack => "slack",
            Self::Gdocs => "gdocs",
            Self::Localdocs => "localdocs",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mail" => Ok(Self::Mail),
            "slack" => Ok(Self::Slack),
            "gdocs" => Ok(Self::Gdocs),
            "localdocs" => Ok(Self::Localdocs),
            "other" => Ok(Self::Other),
            other => Err(TypeError::InvalidName {
                what: "source",
                value: other.to_string(),
            }),
        }
    }
}

macro_rules! validated_name {
    ($(#[$doc:meta])* $name:ident, $what:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Construct after validating the identifier pattern.
            pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
                let value = value.into();
                if NAME_RE.is_match(&value) {
                    Ok(Self(value))
                } else {
                    Err(TypeError::InvalidName {
                        what: $what,
                        value,
                    })
                }
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

validated_name!(
    /// An entity identifier (`acme`, `jro`). Lowercase alphanumeric with
    /// hyphens and underscores, enforced at construction.
    EntityName,
    "entity"
);

validated_name!(
    /// A workflow name (`acme-invoice`, `_skip`).
    WorkflowName,
    "workflow"
);

impl WorkflowName {
    /// The reserved negative-training workflow.
    #[must_use]
    pub fn skip() -> Self {
        Self(SKIP_WORKFLOW.to_string())
    }

    /// Whether this is the `_skip` pseudo-workflow.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        self.0 == SKIP_WORKFLOW
    }

    /// Split an `entity-doctype` style name into its halves.
    ///
    /// Returns `None` when the name has no hyphen. The workflow's own
    /// `entity`/`doctype` fields stay authoritative; this is a
    /// convenience for seeding and display.
    #[must_use]
    pub fn split_entity_doctype(&self) -> Option<(&str, &str)> {
        self.0.split_once('-')
    }
}

/// A `sha256:`-prefixed lowercase hex content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Validate and wrap an existing hash string.
    pub fn parse(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if HASH_RE.is_match(&value) {
            Ok(Self(value))
        } else {
            Err(TypeError::InvalidHash(value))
        }
    }

    /// Wrap a digest that is known to be 64 lowercase hex chars.
    ///
    /// Only the hashing helpers in this crate call this.
    pub(crate) fn from_hex_digest(hex: String) -> Self {
        debug_assert_eq!(hex.len(), 64);
        Self(format!("sha256:{hex}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digest without the `sha256:` prefix.
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.0["sha256:".len()..]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

/// A globally stable document identifier.
///
/// Canonical form: `{source}={workflow_or_stream}/{iso8601Z}/{sha256:hex64}`.
/// The id is stable across re-runs of the same bytes, timestamp, and
/// workflow, and parses back into its components: split on the first
/// `=`, then on the first `/`; the final segment is the content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentId {
    source: String,
    workflow_or_stream: String,
    created_at: DateTime<Utc>,
    content_hash: ContentHash,
}

impl DocumentId {
    #[must_use]
    pub fn new(
        source: SourceKind,
        workflow_or_stream: &str,
        created_at: DateTime<Utc>,
        content_hash: ContentHash,
    ) -> Self {
        Self {
            source: source.as_str().to_string(),
            workflow_or_stream: workflow_or_stream.to_string(),
            created_at,
            content_hash,
        }
    }

    /// Parse a canonical document id string.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        let (source, rest) = raw
            .split_once('=')
            .ok_or(TypeError::InvalidDocumentId(raw.to_string(), "missing '='"))?;
        let (workflow_or_stream, rest) = rest.split_once('/').ok_or(TypeError::InvalidDocumentId(
            raw.to_string(),
            "missing '/' after workflow",
        ))?;
        let (timestamp, hash) = rest.rsplit_once('/').ok_or(TypeError::InvalidDocumentId(
            raw.to_string(),
            "missing hash segment",
        ))?;
        let created_at = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| TypeError::InvalidDocumentId(raw.to_string(), "bad timestamp"))?
            .with_timezone(&Utc);
        Ok(Self {
            source: source.to_string(),
            workflow_or_stream: workflow_or_stream.to_string(),
            created_at,
            content_hash: ContentHash::parse(hash)?,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn workflow_or_stream(&self) -> &str {
        &self.workflow_or_stream
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}/{}/{}",
            self.source,
            self.workflow_or_stream,
            self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.content_hash
        )
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Truncate a timestamp to whole seconds, the resolution document ids use.
#[must_use]
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.timestamp(), 0).single().unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn entity_name_accepts_valid() {
        assert!(EntityName::new("acme").is_ok());
        assert!(EntityName::new("tsm-2024").is_ok());
        assert!(EntityName::new("a_b-c9").is_ok());
    }

    #[test]
    fn entity_name_rejects_invalid() {
        assert!(EntityName::new("").is_err());
        assert!(EntityName::new("Acme").is_err());
        assert!(EntityName::new("a b").is_err());
        assert!(EntityName::new("a/b").is_err());
        assert!(EntityName::new("café").is_err());
    }

    #[test]
    fn skip_workflow_is_valid_and_detected() {
        let skip = WorkflowName::skip();
        assert!(skip.is_skip());
        assert_eq!(skip.as_str(), "_skip");
        assert!(!WorkflowName::new("acme-invoice").unwrap().is_skip());
    }

    #[test]
    fn workflow_split_entity_doctype() {
        let wf = WorkflowName::new("gsk-tax-doc").unwrap();
        assert_eq!(wf.split_entity_doctype(), Some(("gsk", "tax-doc")));
        assert_eq!(WorkflowName::skip().split_entity_doctype(), None);
    }

    #[test]
    fn content_hash_validation() {
        let good = format!("sha256:{}", "a".repeat(64));
        assert!(ContentHash::parse(&good).is_ok());
        assert!(ContentHash::parse(format!("sha256:{}", "A".repeat(64))).is_err());
        assert!(ContentHash::parse(format!("sha256:{}", "a".repeat(63))).is_err());
        assert!(ContentHash::parse(format!("md5:{}", "a".repeat(64))).is_err());
    }

    #[test]
    fn document_id_round_trip() {
        let ts = Utc.with_ymd_and_hms(2025, 11, 5, 10, 0, 0).unwrap();
        let hash = ContentHash::parse(format!("sha256:{}", "ab".repeat(32))).unwrap();
        let id = DocumentId::new(SourceKind::Mail, "acme-invoice", ts, hash.clone());
        let rendered = id.to_string();
        assert_eq!(
            rendered,
            format!("mail=acme-invoice/2025-11-05T10:00:00Z/{hash}")
        );

        let parsed = DocumentId::parse(&rendered).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.source(), "mail");
        assert_eq!(parsed.workflow_or_stream(), "acme-invoice");
        assert_eq!(parsed.created_at(), ts);
    }

    #[test]
    fn document_id_rejects_malformed() {
        assert!(DocumentId::parse("no-equals-here").is_err());
        assert!(DocumentId::parse("mail=wf").is_err());
        assert!(DocumentId::parse("mail=wf/not-a-date/sha256:abc").is_err());
        let bad_hash = "mail=wf/2025-01-01T00:00:00Z/sha256:zz";
        assert!(DocumentId::parse(bad_hash).is_err());
    }

    #[test]
    fn source_kind_round_trip() {
        for kind in [
            SourceKind::Mail,
            SourceKind::Slack,
            SourceKind::Gdocs,
            SourceKind::Localdocs,
            SourceKind::Other,
        ] {
            assert_eq!(kind.as_str().parse::<SourceKind>().unwrap(), kind);
        }
        assert!("imap".parse::<SourceKind>().is_err());
    }
}
