//! Workflow definitions and the on-disk registry.

use crate::criteria::CriteriaStore;
use crate::MAX_WORKFLOWS;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use docvault_utils::error::RegistryError;
use docvault_utils::lock::LOCK_TIMEOUT;
use docvault_utils::types::{EntityName, WorkflowName};
use docvault_utils::{with_file_lock, write_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Where archived documents for this workflow land.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveHandling {
    /// Archive target kind; `document` is the only supported value.
    pub target: String,
    pub entity: EntityName,
    pub doctype: String,
}

/// Post-archive indexing switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexHandling {
    #[serde(default)]
    pub llmemory: bool,
}

/// Handling policy for a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handling {
    pub archive: ArchiveHandling,
    #[serde(default)]
    pub index: IndexHandling,
}

/// A user-defined archival policy.
///
/// The `entity` and `doctype` fields are authoritative; the name is
/// conventionally `{entity}-{doctype}` but nothing depends on that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: WorkflowName,
    pub description: String,
    pub entity: EntityName,
    pub doctype: String,
    pub handling: Handling,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier_hints: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Construct a document workflow with consistent handling.
    #[must_use]
    pub fn document(
        name: WorkflowName,
        description: impl Into<String>,
        entity: EntityName,
        doctype: impl Into<String>,
        index_llmemory: bool,
    ) -> Self {
        let doctype = doctype.into();
        Self {
            name,
            description: description.into(),
            entity: entity.clone(),
            doctype: doctype.clone(),
            handling: Handling {
                archive: ArchiveHandling {
                    target: "document".to_string(),
                    entity,
                    doctype,
                },
                index: IndexHandling {
                    llmemory: index_llmemory,
                },
            },
            classifier_hints: None,
            summary: None,
            created_at: Utc::now(),
        }
    }

    /// Check the internal consistency a stored workflow must have.
    ///
    /// A document whose side-car says `workflow = W` is archived under
    /// `W.handling.archive`, so the handling block must agree with the
    /// workflow's own entity and doctype.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.doctype.is_empty() {
            return Err(RegistryError::InvalidDefinition(format!(
                "workflow '{}': doctype must not be empty",
                self.name
            )));
        }
        if self.handling.archive.target != "document" {
            return Err(RegistryError::InvalidDefinition(format!(
                "workflow '{}': unsupported archive target '{}'",
                self.name, self.handling.archive.target
            )));
        }
        if self.handling.archive.entity != self.entity {
            return Err(RegistryError::InvalidDefinition(format!(
                "workflow '{}': handling.archive.entity '{}' does not match entity '{}'",
                self.name, self.handling.archive.entity, self.entity
            )));
        }
        if self.handling.archive.doctype != self.doctype {
            return Err(RegistryError::InvalidDefinition(format!(
                "workflow '{}': handling.archive.doctype '{}' does not match doctype '{}'",
                self.name, self.handling.archive.doctype, self.doctype
            )));
        }
        Ok(())
    }
}

/// The persistent `name -> Workflow` catalogue.
pub struct WorkflowRegistry {
    path: Utf8PathBuf,
    workflows: BTreeMap<String, Workflow>,
}

impl WorkflowRegistry {
    /// Load the registry, skipping (and logging) invalid entries.
    pub fn load(path: &Utf8Path) -> Result<Self, RegistryError> {
        let workflows = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| RegistryError::Data(format!("read {path}: {e}")))?;
            let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&text)
                .map_err(|e| RegistryError::Data(format!("parse {path}: {e}")))?;

            let mut workflows = BTreeMap::new();
            for (name, value) in raw {
                match serde_json::from_value::<Workflow>(value)
                    .map_err(|e| RegistryError::Data(e.to_string()))
                    .and_then(|wf| wf.validate().map(|()| wf))
                {
                    Ok(wf) => {
                        workflows.insert(name, wf);
                    }
                    Err(e) => warn!("skipping invalid workflow '{name}': {e}"),
                }
            }
            workflows
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_owned(),
            workflows,
        })
    }

    #[must_use]
    pub fn list(&self) -> Vec<&Workflow> {
        self.workflows.values().collect()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Workflow> {
        self.workflows.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    /// Add a new workflow and persist.
    pub fn add(&mut self, workflow: Workflow) -> Result<(), RegistryError> {
        workflow.validate()?;
        if self.workflows.len() >= MAX_WORKFLOWS {
            return Err(RegistryError::TooManyWorkflows {
                count: self.workflows.len(),
                max: MAX_WORKFLOWS,
            });
        }
        self.workflows
            .insert(workflow.name.as_str().to_string(), workflow);
        self.save()
    }

    /// Replace an existing workflow and persist.
    pub fn update(&mut self, workflow: Workflow) -> Result<(), RegistryError> {
        workflow.validate()?;
        let name = workflow.name.as_str().to_string();
        if !self.workflows.contains_key(&name) {
            return Err(RegistryError::NotFound { name });
        }
        self.workflows.insert(name, workflow);
        self.save()
    }

    /// Delete a workflow, refusing while criteria still reference it.
    pub fn delete_if_unreferenced(
        &mut self,
        name: &str,
        criteria: &CriteriaStore,
    ) -> Result<(), RegistryError> {
        if !self.workflows.contains_key(name) {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
            });
        }
        let references = criteria.for_workflow(name).len();
        if references > 0 {
            return Err(RegistryError::StillReferenced {
                name: name.to_string(),
                references,
            });
        }
        self.workflows.remove(name);
        self.save()
    }

    fn save(&self) -> Result<(), RegistryError> {
        if self.workflows.len() > MAX_WORKFLOWS {
            return Err(RegistryError::TooManyWorkflows {
                count: self.workflows.len(),
                max: MAX_WORKFLOWS,
            });
        }
        let json = serde_json::to_string_pretty(&self.workflows)
            .map_err(|e| RegistryError::Data(e.to_string()))?;
        let path = self.path.clone();
        with_file_lock(&path, LOCK_TIMEOUT, || {
            write_atomic(&path, json.as_bytes())
        })??;
        info!("saved {} workflows", self.workflows.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CriteriaInstance;
    use docvault_utils::FeatureSet;
    use tempfile::TempDir;

    fn registry_path(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("workflows.json")).unwrap()
    }

    fn sample_workflow(name: &str, entity: &str, doctype: &str) -> Workflow {
        Workflow::document(
            WorkflowName::new(name).unwrap(),
            format!("{doctype} documents for {entity}"),
            EntityName::new(entity).unwrap(),
            doctype,
            true,
        )
    }

    #[test]
    fn add_get_list_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = registry_path(&dir);
        let mut registry = WorkflowRegistry::load(&path).unwrap();
        registry.add(sample_workflow("acme-invoice", "acme", "invoice")).unwrap();
        registry.add(sample_workflow("tsm-expense", "tsm", "expense")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get("acme-invoice").unwrap().entity.as_str(),
            "acme"
        );

        let reloaded = WorkflowRegistry::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("tsm-expense").unwrap().doctype, "expense");
    }

    #[test]
    fn inconsistent_handling_rejected() {
        let mut wf = sample_workflow("acme-invoice", "acme", "invoice");
        wf.handling.archive.doctype = "receipt".to_string();
        assert!(wf.validate().is_err());

        wf = sample_workflow("acme-invoice", "acme", "invoice");
        wf.handling.archive.entity = EntityName::new("other").unwrap();
        assert!(wf.validate().is_err());
    }

    #[test]
    fn unsupported_target_rejected() {
        let mut wf = sample_workflow("acme-invoice", "acme", "invoice");
        wf.handling.archive.target = "folder".to_string();
        let dir = TempDir::new().unwrap();
        let mut registry = WorkflowRegistry::load(&registry_path(&dir)).unwrap();
        assert!(registry.add(wf).is_err());
    }

    #[test]
    fn workflow_cap_enforced() {
        let dir = TempDir::new().unwrap();
        let mut registry = WorkflowRegistry::load(&registry_path(&dir)).unwrap();
        for i in 0..MAX_WORKFLOWS {
            registry
                .add(sample_workflow(&format!("e{i}-doc"), &format!("e{i}"), "doc"))
                .unwrap();
        }
        let err = registry
            .add(sample_workflow("overflow-doc", "overflow", "doc"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::TooManyWorkflows { .. }));
    }

    #[test]
    fn invalid_entries_skipped_on_load() {
        let dir = TempDir::new().unwrap();
        let path = registry_path(&dir);
        let good = sample_workflow("acme-invoice", "acme", "invoice");
        let text = format!(
            r#"{{"acme-invoice": {}, "broken": {{"name": "broken"}}}}"#,
            serde_json::to_string(&good).unwrap()
        );
        std::fs::write(&path, text).unwrap();

        let registry = WorkflowRegistry::load(&path).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("acme-invoice").is_some());
    }

    #[test]
    fn delete_refuses_while_referenced() {
        let dir = TempDir::new().unwrap();
        let reg_path = registry_path(&dir);
        let crit_path = Utf8PathBuf::from_path_buf(dir.path().join("criteria.json")).unwrap();

        let mut registry = WorkflowRegistry::load(&reg_path).unwrap();
        registry.add(sample_workflow("acme-invoice", "acme", "invoice")).unwrap();

        let mut criteria = CriteriaStore::load(&crit_path).unwrap();
        criteria
            .add(CriteriaInstance::confirmed(
                "<m@x>",
                WorkflowName::new("acme-invoice").unwrap(),
                FeatureSet::default(),
                Some(0.9),
            ))
            .unwrap();

        let err = registry
            .delete_if_unreferenced("acme-invoice", &criteria)
            .unwrap_err();
        assert!(matches!(err, RegistryError::StillReferenced { references: 1, .. }));

        // An unreferenced workflow deletes fine.
        registry.add(sample_workflow("tsm-expense", "tsm", "expense")).unwrap();
        registry
            .delete_if_unreferenced("tsm-expense", &criteria)
            .unwrap();
        assert!(registry.get("tsm-expense").is_none());
    }

    #[test]
    fn update_requires_existing() {
        let dir = TempDir::new().unwrap();
        let mut registry = WorkflowRegistry::load(&registry_path(&dir)).unwrap();
        let err = registry
            .update(sample_workflow("acme-invoice", "acme", "invoice"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }
}
