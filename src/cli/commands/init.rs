//! `docvault init`: configuration plus seed workflows.

use super::load_config;
use chrono::Local;
use docvault_config::Config;
use docvault_registry::{Workflow, WorkflowRegistry};
use docvault_utils::error::DocVaultError;
use docvault_utils::types::{EntityName, WorkflowName};

/// Workflow templates seeded on first run: (doctype, description).
const TEMPLATES: [(&str, &str); 4] = [
    ("expense", "Expense receipts and invoices"),
    ("statement", "Bank statements and financial documents"),
    ("tax-doc", "Tax-related documents"),
    ("contract", "Contracts and legal documents"),
];

pub fn execute(reset: bool, entity: &str) -> Result<(), DocVaultError> {
    let (home, _config) = load_config()?;

    if reset {
        // Back up the current config aside and restore defaults.
        let config_path = home.join("config.toml");
        if config_path.exists() {
            let ts = Local::now().format("%Y%m%d%H%M%S");
            let backup = home.join(format!("config.toml.backup_{ts}"));
            std::fs::rename(&config_path, &backup)?;
            println!("Backed up existing config to {backup}");
        }
        let workflows_path = Config::workflows_file(&home);
        if workflows_path.exists() {
            let ts = Local::now().format("%Y%m%d%H%M%S");
            let backup = home.join(format!("workflows.json.backup_{ts}"));
            std::fs::rename(&workflows_path, &backup)?;
            println!("Backed up existing workflows to {backup}");
        }
        Config::load_from_home(&home)?;
    }

    std::fs::create_dir_all(Config::state_dir(&home))?;

    let entity = EntityName::new(entity).map_err(|e| {
        DocVaultError::Config(docvault_utils::error::ConfigError::InvalidValue {
            key: "entity".to_string(),
            reason: e.to_string(),
        })
    })?;

    let mut registry = WorkflowRegistry::load(&Config::workflows_file(&home))?;
    if registry.is_empty() {
        for (doctype, description) in TEMPLATES {
            let name = WorkflowName::new(format!("{entity}-{doctype}"))
                .expect("entity and doctype are validated");
            registry.add(Workflow::document(
                name,
                description,
                entity.clone(),
                doctype,
                false,
            ))?;
        }
        println!(
            "Seeded {} workflow templates for entity '{entity}'",
            TEMPLATES.len()
        );
    } else {
        println!(
            "Keeping {} existing workflows (use --reset to start over)",
            registry.len()
        );
    }

    println!("docvault home initialized at {home}");
    Ok(())
}
