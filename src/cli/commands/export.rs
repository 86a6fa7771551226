//! `docvault export`: CSV derivations from side-cars.

use super::load_config;
use crate::cli::args::ExportCommands;
use camino::Utf8PathBuf;
use docvault_export::{export_expenses_csv, export_xero_csv};
use docvault_utils::error::DocVaultError;
use std::path::Path;

pub fn execute(cmd: ExportCommands) -> Result<(), DocVaultError> {
    let (_home, config) = load_config()?;
    let base = config.archive.resolved_base_path();

    match cmd {
        ExportCommands::Expenses { output, entity } => {
            let output = utf8(&output)?;
            let count = export_expenses_csv(&base, &output, entity.as_deref())?;
            println!("Exported {count} expense(s) to {output}");
        }
        ExportCommands::Xero { output, entity } => {
            let output = utf8(&output)?;
            let count = export_xero_csv(&base, &output, entity.as_deref())?;
            println!("Exported {count} bill(s) to {output}");
        }
    }
    Ok(())
}

fn utf8(path: &Path) -> Result<Utf8PathBuf, DocVaultError> {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).map_err(|p| {
        DocVaultError::Config(docvault_utils::error::ConfigError::InvalidValue {
            key: "output".to_string(),
            reason: format!("non-utf8 path {}", p.display()),
        })
    })
}
