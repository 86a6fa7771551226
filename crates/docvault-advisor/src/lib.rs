//! LLM advisor abstraction for workflow classification.
//!
//! The pipeline talks to one trait, [`Advisor`], so the hybrid
//! classifier never knows which provider is behind it. The bundled
//! backend speaks the Anthropic Messages API over HTTP with structured
//! JSON output and bounded retry/backoff; anything else (a database
//! backed service, a local model) plugs in through the same trait.

mod anthropic;
mod types;

pub use anthropic::AnthropicAdvisor;
pub use types::{Advisor, AdvisorOptions, Candidate, Decision, WorkflowSummary};

use docvault_utils::error::AdvisorError;
use tracing::warn;

/// Construct the configured advisor from the environment.
///
/// Reads the API key from `ANTHROPIC_API_KEY`. When `DATABASE_URL` is
/// set the advisor service is expected to run database-backed out of
/// process; that mode is not embedded here, so the variable only logs a
/// note and the HTTP advisor is used.
///
/// # Errors
///
/// [`AdvisorError::Misconfiguration`] when no API key is present.
pub fn advisor_from_env(model_alias: &str) -> Result<Box<dyn Advisor>, AdvisorError> {
    if std::env::var("DATABASE_URL").is_ok() {
        warn!("DATABASE_URL is set; database-backed advisor mode runs out of process, using the HTTP advisor");
    }
    Ok(Box::new(AnthropicAdvisor::from_env(model_alias)?))
}
