//! Anthropic Messages API backend for the advisor.

use crate::types::{Advisor, AdvisorOptions, Candidate, Decision, WorkflowSummary};
use async_trait::async_trait;
use docvault_utils::error::AdvisorError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_RETRIES: u32 = 3;

/// HTTP advisor speaking the Anthropic Messages API.
pub struct AnthropicAdvisor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicAdvisor {
    /// Build from the environment, mapping a model alias to a concrete
    /// model.
    ///
    /// # Errors
    ///
    /// [`AdvisorError::Misconfiguration`] when `ANTHROPIC_API_KEY` is
    /// unset or the HTTP client cannot be constructed.
    pub fn from_env(model_alias: &str) -> Result<Self, AdvisorError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            AdvisorError::Misconfiguration(format!(
                "{API_KEY_ENV} is not set; export it or disable the LLM advisor in config"
            ))
        })?;
        Self::new(api_key, None, resolve_model_alias(model_alias))
    }

    /// Build with explicit credentials; `base_url` overrides the API
    /// endpoint (used by tests).
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: String,
    ) -> Result<Self, AdvisorError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AdvisorError::Misconfiguration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model,
        })
    }

    async fn post_with_retries(&self, body: &Value) -> Result<Value, AdvisorError> {
        let mut attempt = 0u32;
        loop {
            let result = self
                .client
                .post(&self.base_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(body)
                .send()
                .await;

            let retryable_error = match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|e| {
                            AdvisorError::InvalidResponse(format!("response body: {e}"))
                        });
                    }
                    let message = response.text().await.unwrap_or_default();
                    let err = AdvisorError::Http {
                        status: status.as_u16(),
                        message: truncate(&message, 500),
                    };
                    if err.is_transient() {
                        err
                    } else {
                        return Err(err);
                    }
                }
                Err(e) => AdvisorError::Transport(e.to_string()),
            };

            attempt += 1;
            if attempt > MAX_RETRIES {
                return Err(retryable_error);
            }
            let delay = Duration::from_secs(2u64.pow(attempt - 1));
            warn!(
                "advisor request failed ({retryable_error}); retry {attempt}/{MAX_RETRIES} in {}s",
                delay.as_secs()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn resolve_model_alias(alias: &str) -> String {
    match alias {
        "fast" => "claude-3-5-haiku-latest",
        "deep" => "claude-opus-4-1",
        // "balanced" and anything unrecognized (config already warned).
        _ => "claude-sonnet-4-5",
    }
    .to_string()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

fn build_prompt(
    text: &str,
    meta: &Value,
    workflows: &[WorkflowSummary],
    opts: &AdvisorOptions,
) -> (String, String) {
    let workflow_lines: Vec<String> = workflows
        .iter()
        .map(|w| format!("- {}: {}", w.name, w.description))
        .collect();

    let abstain_rule = if opts.interactive {
        "If no workflow fits, set \"label\" to null."
    } else {
        "Always pick the single best workflow, even when unsure; express doubt through the confidence value."
    };

    let system = format!(
        "You classify archived documents into user-defined workflows.\n\
         Available workflows:\n{}\n\n\
         Respond with a single JSON object and nothing else:\n\
         {{\"label\": <workflow name or null>, \"confidence\": <0.0-1.0>, \
         \"candidates\": [{{\"label\": <name>, \"confidence\": <0.0-1.0>}}]}}\n\
         List at most {} candidates, best first. {}",
        workflow_lines.join("\n"),
        opts.max_candidates,
        abstain_rule
    );

    let user = format!(
        "Document metadata:\n{}\n\nDocument text:\n{}",
        serde_json::to_string_pretty(meta).unwrap_or_else(|_| "{}".to_string()),
        text
    );

    (system, user)
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    label: Option<String>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    candidates: Vec<RawCandidate>,
}

#[derive(Debug, Deserialize)]
struct RawCandidate {
    label: String,
    #[serde(default)]
    confidence: f64,
}

/// Parse the model's reply: strict JSON first, then the first JSON
/// object embedded in surrounding prose.
fn parse_decision_text(text: &str) -> Result<RawDecision, AdvisorError> {
    if let Ok(decision) = serde_json::from_str::<RawDecision>(text) {
        return Ok(decision);
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(decision) = serde_json::from_str::<RawDecision>(&text[start..=end]) {
                return Ok(decision);
            }
        }
    }
    Err(AdvisorError::InvalidResponse(format!(
        "no JSON decision in reply: {}",
        truncate(text, 200)
    )))
}

#[async_trait]
impl Advisor for AnthropicAdvisor {
    async fn classify(
        &self,
        text: &str,
        meta: &Value,
        workflows: &[WorkflowSummary],
        opts: &AdvisorOptions,
    ) -> Result<Decision, AdvisorError> {
        if !opts.allow_llm {
            return Err(AdvisorError::Disabled);
        }

        let filtered: Vec<WorkflowSummary> = if opts.workflow_filter.is_empty() {
            workflows.to_vec()
        } else {
            workflows
                .iter()
                .filter(|w| opts.workflow_filter.iter().any(|f| f == &w.name))
                .cloned()
                .collect()
        };
        if filtered.is_empty() {
            return Ok(Decision::default());
        }

        let (system, user) = build_prompt(text, meta, &filtered, opts);
        let body = json!({
            "model": self.model,
            "max_tokens": 1024,
            "temperature": 0.0,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });

        let response = self.post_with_retries(&body).await?;
        let reply = response["content"][0]["text"].as_str().ok_or_else(|| {
            AdvisorError::InvalidResponse("missing content[0].text in API response".to_string())
        })?;

        let raw = parse_decision_text(reply)?;
        debug!(label = ?raw.label, confidence = raw.confidence, "advisor decision");

        // An unknown label is an abstention, not an error; the model is
        // only allowed to pick from the offered set.
        let known = |name: &str| filtered.iter().any(|w| w.name == name);
        let label = raw.label.filter(|l| known(l));
        let confidence = if label.is_some() {
            raw.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut candidates: Vec<Candidate> = raw
            .candidates
            .into_iter()
            .filter(|c| known(&c.label))
            .map(|c| Candidate {
                label: c.label,
                confidence: c.confidence.clamp(0.0, 1.0),
                source: "llm".to_string(),
            })
            .collect();
        candidates.truncate(opts.max_candidates);

        Ok(Decision {
            decision_id: response["id"].as_str().map(String::from),
            label,
            confidence,
            candidates,
            evidence: None,
            advisors_used: vec!["anthropic".to_string()],
        })
    }

    async fn feedback(
        &self,
        decision_id: &str,
        label: &str,
        reason: Option<&str>,
    ) -> Result<(), AdvisorError> {
        // The Messages API has no feedback channel; the label still gets
        // recorded as a criteria instance by the caller. Log so the
        // trail exists when debugging classification drift.
        debug!(decision_id, label, reason = ?reason, "advisor feedback recorded locally");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolution() {
        assert_eq!(resolve_model_alias("fast"), "claude-3-5-haiku-latest");
        assert_eq!(resolve_model_alias("balanced"), "claude-sonnet-4-5");
        assert_eq!(resolve_model_alias("deep"), "claude-opus-4-1");
        assert_eq!(resolve_model_alias("bogus"), "claude-sonnet-4-5");
    }

    #[test]
    fn parses_strict_json() {
        let raw = parse_decision_text(
            r#"{"label": "acme-invoice", "confidence": 0.9, "candidates": []}"#,
        )
        .unwrap();
        assert_eq!(raw.label.as_deref(), Some("acme-invoice"));
        assert_eq!(raw.confidence, 0.9);
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let raw = parse_decision_text(
            "Here is my answer:\n{\"label\": \"tsm-expense\", \"confidence\": 0.7}\nHope that helps!",
        )
        .unwrap();
        assert_eq!(raw.label.as_deref(), Some("tsm-expense"));
    }

    #[test]
    fn rejects_replies_without_json() {
        assert!(parse_decision_text("I cannot classify this").is_err());
    }

    #[test]
    fn prompt_lists_workflows_and_candidate_cap() {
        let workflows = vec![
            WorkflowSummary {
                name: "acme-invoice".into(),
                description: "Invoices from ACME".into(),
            },
            WorkflowSummary {
                name: "tsm-expense".into(),
                description: "TSM expenses".into(),
            },
        ];
        let opts = AdvisorOptions {
            max_candidates: 3,
            ..Default::default()
        };
        let (system, user) = build_prompt("body", &json!({"from": "a@b.c"}), &workflows, &opts);
        assert!(system.contains("acme-invoice"));
        assert!(system.contains("tsm-expense"));
        assert!(system.contains("at most 3"));
        assert!(user.contains("a@b.c"));
        assert!(user.contains("body"));
    }

    #[test]
    fn interactive_mode_allows_abstention() {
        let workflows = vec![WorkflowSummary {
            name: "a-b".into(),
            description: "x".into(),
        }];
        let interactive = AdvisorOptions {
            interactive: true,
            ..Default::default()
        };
        let batch = AdvisorOptions::default();
        let (sys_interactive, _) = build_prompt("t", &json!({}), &workflows, &interactive);
        let (sys_batch, _) = build_prompt("t", &json!({}), &workflows, &batch);
        assert!(sys_interactive.contains("null"));
        assert!(sys_batch.contains("Always pick"));
    }
}
