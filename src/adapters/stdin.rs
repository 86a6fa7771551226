//! Single-item adapter reading one message from standard input.

use docvault_pipeline::{Outcome, SourceAdapter, SourceItem};
use docvault_utils::error::DocVaultError;
use std::io::Read;

/// Yields exactly one item: the bytes read from stdin.
pub struct StdinAdapter {
    item: Option<Vec<u8>>,
}

impl StdinAdapter {
    /// Read stdin to EOF.
    pub fn from_stdin() -> Result<Self, DocVaultError> {
        let mut raw = Vec::new();
        std::io::stdin().read_to_end(&mut raw)?;
        Ok(Self::from_bytes(raw))
    }

    /// Wrap bytes that were already read (used by tests).
    #[must_use]
    pub fn from_bytes(raw: Vec<u8>) -> Self {
        Self { item: Some(raw) }
    }
}

impl SourceAdapter for StdinAdapter {
    fn next_item(&mut self) -> Result<Option<SourceItem>, DocVaultError> {
        Ok(self.item.take().map(|raw_bytes| SourceItem {
            id: "stdin".to_string(),
            display_name: "<stdin>".to_string(),
            raw_bytes,
        }))
    }

    fn ack(&mut self, _id: &str, _outcome: &Outcome) -> Result<(), DocVaultError> {
        Ok(())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(usize::from(self.item.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_exactly_one_item() {
        let mut adapter = StdinAdapter::from_bytes(b"From: a@b.c\r\n\r\nhi".to_vec());
        assert_eq!(adapter.len_hint(), Some(1));
        let item = adapter.next_item().unwrap().unwrap();
        assert_eq!(item.id, "stdin");
        assert!(adapter.next_item().unwrap().is_none());
    }
}
