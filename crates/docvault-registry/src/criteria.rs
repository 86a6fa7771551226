//! Labelled training examples for the classifier.

use crate::CRITERIA_MILESTONES;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use docvault_utils::error::RegistryError;
use docvault_utils::lock::LOCK_TIMEOUT;
use docvault_utils::types::WorkflowName;
use docvault_utils::{with_file_lock, write_atomic, FeatureSet};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A concrete example of an item that was classified to a workflow.
///
/// `workflow_name == "_skip"` marks a user-validated negative example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaInstance {
    pub email_id: String,
    pub workflow_name: WorkflowName,
    pub timestamp: DateTime<Utc>,
    pub features: FeatureSet,
    #[serde(default = "default_true")]
    pub user_confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl CriteriaInstance {
    /// A user-confirmed example recorded now.
    #[must_use]
    pub fn confirmed(
        email_id: impl Into<String>,
        workflow_name: WorkflowName,
        features: FeatureSet,
        confidence_score: Option<f64>,
    ) -> Self {
        Self {
            email_id: email_id.into(),
            workflow_name,
            timestamp: Utc::now(),
            features,
            user_confirmed: true,
            confidence_score,
        }
    }
}

/// The persistent list of criteria instances.
///
/// Instances are append-mostly and never deleted by age. Old examples
/// have proven themselves; diversity matters more than recency.
pub struct CriteriaStore {
    path: Utf8PathBuf,
    instances: Vec<CriteriaInstance>,
}

impl CriteriaStore {
    /// Load the store, skipping (and logging) invalid entries.
    pub fn load(path: &Utf8Path) -> Result<Self, RegistryError> {
        let instances = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| RegistryError::Data(format!("read {path}: {e}")))?;
            let raw: Vec<serde_json::Value> = serde_json::from_str(&text)
                .map_err(|e| RegistryError::Data(format!("parse {path}: {e}")))?;

            let mut instances = Vec::with_capacity(raw.len());
            for value in raw {
                match serde_json::from_value::<CriteriaInstance>(value) {
                    Ok(instance) => instances.push(instance),
                    Err(e) => warn!("skipping invalid criteria instance: {e}"),
                }
            }
            instances
        } else {
            Vec::new()
        };

        Ok(Self {
            path: path.to_owned(),
            instances,
        })
    }

    #[must_use]
    pub fn all(&self) -> &[CriteriaInstance] {
        &self.instances
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Count of positive (non-`_skip`) examples, the classifier's
    /// training-volume gate.
    #[must_use]
    pub fn non_skip_count(&self) -> usize {
        self.instances
            .iter()
            .filter(|i| !i.workflow_name.is_skip())
            .count()
    }

    /// Instances recorded for one workflow.
    #[must_use]
    pub fn for_workflow(&self, workflow_name: &str) -> Vec<&CriteriaInstance> {
        self.instances
            .iter()
            .filter(|i| i.workflow_name.as_str() == workflow_name)
            .collect()
    }

    /// The most recent instances, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<&CriteriaInstance> {
        let mut sorted: Vec<&CriteriaInstance> = self.instances.iter().collect();
        sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        sorted.truncate(limit);
        sorted
    }

    /// Append an instance and persist.
    pub fn add(&mut self, instance: CriteriaInstance) -> Result<(), RegistryError> {
        self.instances.push(instance);
        self.save()
    }

    /// Record a skip decision as a negative training example.
    pub fn record_skip(
        &mut self,
        email_id: impl Into<String>,
        features: FeatureSet,
    ) -> Result<(), RegistryError> {
        self.add(CriteriaInstance::confirmed(
            email_id,
            WorkflowName::skip(),
            features,
            None,
        ))
    }

    fn save(&self) -> Result<(), RegistryError> {
        let count = self.instances.len();
        if CRITERIA_MILESTONES.contains(&count) {
            let storage_mb = (count * 2048) as f64 / (1024.0 * 1024.0);
            warn!(
                "criteria instances reached {count} entries (~{storage_mb:.1}MB); \
                 review storage if this becomes an issue"
            );
        }

        let json = serde_json::to_string_pretty(&self.instances)
            .map_err(|e| RegistryError::Data(e.to_string()))?;
        let path = self.path.clone();
        with_file_lock(&path, LOCK_TIMEOUT, || {
            write_atomic(&path, json.as_bytes())
        })??;
        info!("saved {count} criteria instances");
        Ok(())
    }
}
