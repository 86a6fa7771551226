//! `docvault workflows`: list, add, delete.

use super::load_config;
use crate::cli::args::WorkflowCommands;
use docvault_config::Config;
use docvault_registry::{CriteriaStore, Workflow, WorkflowRegistry};
use docvault_utils::error::{DocVaultError, RegistryError};
use docvault_utils::types::{EntityName, WorkflowName};

pub fn execute(cmd: WorkflowCommands) -> Result<(), DocVaultError> {
    let (home, _config) = load_config()?;
    let mut registry = WorkflowRegistry::load(&Config::workflows_file(&home))?;

    match cmd {
        WorkflowCommands::List => {
            if registry.is_empty() {
                println!("No workflows configured; run `docvault init` to seed templates");
                return Ok(());
            }
            println!("Available workflows ({} total):", registry.len());
            for workflow in registry.list() {
                println!("{}:", workflow.name);
                println!("  {}", workflow.description);
                println!(
                    "  Entity: {}  Doctype: {}  Semantic index: {}",
                    workflow.entity,
                    workflow.doctype,
                    if workflow.handling.index.llmemory {
                        "yes"
                    } else {
                        "no"
                    }
                );
            }
        }
        WorkflowCommands::Add {
            name,
            description,
            entity,
            doctype,
            index_llmemory,
        } => {
            let name = WorkflowName::new(name).map_err(invalid)?;
            let entity = EntityName::new(entity).map_err(invalid)?;
            registry.add(Workflow::document(
                name.clone(),
                description,
                entity,
                doctype,
                index_llmemory,
            ))?;
            println!("Added workflow '{name}'");
        }
        WorkflowCommands::Delete { name } => {
            let criteria = CriteriaStore::load(&Config::criteria_file(&home))?;
            registry.delete_if_unreferenced(&name, &criteria)?;
            println!("Deleted workflow '{name}'");
        }
    }
    Ok(())
}

fn invalid(e: docvault_utils::types::TypeError) -> DocVaultError {
    RegistryError::InvalidDefinition(e.to_string()).into()
}
