//! The source-adapter contract.

use crate::driver::Outcome;
use docvault_utils::error::DocVaultError;

/// One raw item pulled from a source.
#[derive(Debug, Clone)]
pub struct SourceItem {
    /// Adapter-scoped id, echoed back through [`SourceAdapter::ack`].
    pub id: String,
    /// Short name for status lines (a filename, a message id).
    pub display_name: String,
    /// The raw message bytes handed to the extractor.
    pub raw_bytes: Vec<u8>,
}

/// A source of items plus an acknowledgement channel back upstream.
///
/// Adapters own all source-specific behavior (mailbox walking, API
/// paging, label changes); the pipeline only pulls uniform items and
/// reports what happened to each. An `ack` failure is treated as
/// transient by the batch driver and counts toward its
/// consecutive-failure limit.
pub trait SourceAdapter {
    /// Pull the next item, or `None` when the source is drained.
    fn next_item(&mut self) -> Result<Option<SourceItem>, DocVaultError>;

    /// Report the final outcome for an item (e.g. relabel the message).
    fn ack(&mut self, id: &str, outcome: &Outcome) -> Result<(), DocVaultError>;

    /// How many items this adapter expects to yield, when it knows.
    /// Used for progress lines and the LLM cost estimate.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}
