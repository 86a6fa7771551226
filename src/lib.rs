//! docvault - a personal document-archival pipeline.
//!
//! Items flow from a source adapter through feature extraction, dedup,
//! hybrid classification, and the atomic archive writer, landing in a
//! content-addressed repository with side-car metadata and derived
//! search indexes. The member crates own the mechanics; this crate owns
//! the CLI surface and the bundled source adapters.

pub mod adapters;
pub mod cli;

// Stable re-exports for embedding.
pub use docvault_config::Config;
pub use docvault_pipeline::{Outcome, Pipeline, PipelineOptions, RunMode};
pub use docvault_utils::{DocVaultError, ExitCode};

/// The docvault version string.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
