//! Stored classification decisions for train-only and replay runs.
//!
//! A train-only pass classifies and records what it would have done; a
//! replay pass archives using exactly those decisions without
//! re-classifying. The log is keyed by message id when present,
//! otherwise by content hash.

use camino::{Utf8Path, Utf8PathBuf};
use docvault_utils::error::RegistryError;
use docvault_utils::lock::LOCK_TIMEOUT;
use docvault_utils::types::WorkflowName;
use docvault_utils::{hash_bytes, with_file_lock, write_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One stored decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDecision {
    pub workflow: WorkflowName,
    pub confidence: f64,
}

/// The persistent decision log.
pub struct DecisionLog {
    path: Utf8PathBuf,
    decisions: BTreeMap<String, StoredDecision>,
}

impl DecisionLog {
    pub fn load(path: &Utf8Path) -> Result<Self, RegistryError> {
        let decisions = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| RegistryError::Data(format!("read {path}: {e}")))?;
            serde_json::from_str(&text)
                .map_err(|e| RegistryError::Data(format!("parse {path}: {e}")))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_owned(),
            decisions,
        })
    }

    /// Conventional log location under a state directory.
    #[must_use]
    pub fn default_path(state_dir: &Utf8Path) -> Utf8PathBuf {
        state_dir.join("decisions.json")
    }

    fn key(raw: &[u8], message_id: &str) -> String {
        if message_id.is_empty() {
            hash_bytes(raw).to_string()
        } else {
            message_id.to_string()
        }
    }

    #[must_use]
    pub fn get(&self, raw: &[u8], message_id: &str) -> Option<&StoredDecision> {
        self.decisions.get(&Self::key(raw, message_id))
    }

    pub fn record(
        &mut self,
        raw: &[u8],
        message_id: &str,
        workflow: WorkflowName,
        confidence: f64,
    ) -> Result<(), RegistryError> {
        self.decisions.insert(
            Self::key(raw, message_id),
            StoredDecision {
                workflow,
                confidence,
            },
        );
        let json = serde_json::to_string_pretty(&self.decisions)
            .map_err(|e| RegistryError::Data(e.to_string()))?;
        let path = self.path.clone();
        with_file_lock(&path, LOCK_TIMEOUT, || write_atomic(&path, json.as_bytes()))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn record_then_get_by_message_id() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("decisions.json")).unwrap();
        let mut log = DecisionLog::load(&path).unwrap();
        log.record(
            b"raw",
            "<m@x>",
            WorkflowName::new("acme-invoice").unwrap(),
            0.91,
        )
        .unwrap();

        let reloaded = DecisionLog::load(&path).unwrap();
        let decision = reloaded.get(b"other-bytes", "<m@x>").unwrap();
        assert_eq!(decision.workflow.as_str(), "acme-invoice");
        assert_eq!(decision.confidence, 0.91);
    }

    #[test]
    fn falls_back_to_content_hash_without_message_id() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("decisions.json")).unwrap();
        let mut log = DecisionLog::load(&path).unwrap();
        log.record(b"raw", "", WorkflowName::new("a-b").unwrap(), 0.5)
            .unwrap();

        assert!(log.get(b"raw", "").is_some());
        assert!(log.get(b"different", "").is_none());
    }
}
