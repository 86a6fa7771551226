//! Advisor contract types.

use async_trait::async_trait;
use docvault_utils::error::AdvisorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ranked classification candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub label: String,
    pub confidence: f64,
    /// Which advisor produced this candidate (`llm`, `similarity`, ...).
    #[serde(default)]
    pub source: String,
}

/// A classification decision returned by an advisor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Opaque id for the feedback channel, when the advisor records
    /// decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<String>,
    /// The chosen workflow, or `None` when the advisor abstains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Value>,
    #[serde(default)]
    pub advisors_used: Vec<String>,
}

/// Per-call options.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorOptions {
    /// Whether an LLM call is permitted at all.
    pub allow_llm: bool,
    /// Interactive callers tolerate abstention; batch callers want the
    /// advisor to commit to its best candidate.
    pub interactive: bool,
    pub max_candidates: usize,
    /// When non-empty, restrict the label set to these workflows.
    pub workflow_filter: Vec<String>,
}

impl Default for AdvisorOptions {
    fn default() -> Self {
        Self {
            allow_llm: true,
            interactive: false,
            max_candidates: 5,
            workflow_filter: Vec::new(),
        }
    }
}

/// What the advisor needs to know about each candidate workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,
}

/// The advisor contract.
///
/// Errors bubble up unchanged; the hybrid classifier owns the fallback
/// policy, not the advisor.
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Classify `text` against the given workflows.
    async fn classify(
        &self,
        text: &str,
        meta: &Value,
        workflows: &[WorkflowSummary],
        opts: &AdvisorOptions,
    ) -> Result<Decision, AdvisorError>;

    /// Report the user's final label for a recorded decision.
    async fn feedback(
        &self,
        decision_id: &str,
        label: &str,
        reason: Option<&str>,
    ) -> Result<(), AdvisorError>;
}
