//! Persistent workflow catalogue and classifier training examples.
//!
//! Two JSON files under the config directory, each mutated with an
//! advisory lock around an atomic read-modify-write:
//!
//! - `workflows.json`: the named archival policies.
//! - `criteria_instances.json`: labelled training examples, including
//!   `_skip` negatives. Never pruned by age; diversity is the point.

mod criteria;
mod workflow;

pub use criteria::{CriteriaInstance, CriteriaStore};
pub use workflow::{ArchiveHandling, Handling, IndexHandling, Workflow, WorkflowRegistry};

/// Upper bound on stored workflows, a guard against misconfiguration.
pub const MAX_WORKFLOWS: usize = 100;

/// Criteria counts at which a storage reminder is logged. Instances are
/// never deleted; these only keep the user informed.
pub const CRITERIA_MILESTONES: [usize; 5] = [50_000, 100_000, 150_000, 200_000, 250_000];
