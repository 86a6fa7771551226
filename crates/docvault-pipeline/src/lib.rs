//! The per-item pipeline and batch driver.
//!
//! Binds a source adapter to the extract, dedup, classify, archive, and
//! index steps, turning each item into an [`Outcome`] value. Control
//! flow is data, not exceptions: skips, declines, and failures all come
//! back as outcomes, and only adapter-level breakage aborts a batch.
//!
//! Batch error policy: permanent item failures are counted and the
//! batch moves on; transient failures back off exponentially and abort
//! the batch after three in a row.

mod adapter;
mod decisions;
mod driver;

pub use adapter::{SourceAdapter, SourceItem};
pub use decisions::DecisionLog;
pub use driver::{BatchStats, Outcome, Pipeline, PipelineOptions, RunMode, SkipReason};

/// Consecutive transient failures tolerated before a batch aborts.
pub const MAX_CONSECUTIVE_TRANSIENT: u32 = 3;
