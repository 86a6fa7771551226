//! The feature vector the classifier pipeline works on.
//!
//! Extracted once per item, compared against stored training examples,
//! and persisted inside criteria instances. Token sets are ordered so
//! serialized features are deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Features derived from one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Sender domain, lowercased, empty when absent or invalid.
    #[serde(default)]
    pub from_domain: String,
    /// Full recipient header value (compared case-insensitively).
    #[serde(default)]
    pub to: String,
    /// Distinct lowercased subject tokens, bounded by the extractor.
    #[serde(default)]
    pub subject_tokens: BTreeSet<String>,
    /// Distinct lowercased body-preview tokens, bounded by the extractor.
    #[serde(default)]
    pub body_tokens: BTreeSet<String>,
    #[serde(default)]
    pub has_pdf: bool,
    #[serde(default)]
    pub has_attachments: bool,
    #[serde(default)]
    pub num_attachments: usize,
    #[serde(default)]
    pub has_images: bool,
    #[serde(default)]
    pub has_documents: bool,
    #[serde(default)]
    pub subject_length: usize,
    #[serde(default)]
    pub body_length: usize,
}
