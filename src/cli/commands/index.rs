//! `docvault index`: rebuild the global indexes.

use super::load_config;
use camino::Utf8PathBuf;
use docvault_index::{run_indexer, PlainTextExtractor};
use docvault_utils::error::DocVaultError;
use std::path::Path;

pub fn execute(base_override: Option<&Path>) -> Result<(), DocVaultError> {
    let base = match base_override {
        Some(path) => Utf8PathBuf::from_path_buf(path.to_path_buf()).map_err(|p| {
            DocVaultError::Config(docvault_utils::error::ConfigError::InvalidValue {
                key: "base".to_string(),
                reason: format!("non-utf8 path {}", p.display()),
            })
        })?,
        None => {
            let (_home, config) = load_config()?;
            config.archive.resolved_base_path()
        }
    };

    let report = run_indexer(&base, None, &PlainTextExtractor)?;
    println!(
        "Indexed {} document(s), {} stream(s), {} link(s); skipped {}",
        report.documents, report.streams, report.links, report.skipped
    );
    Ok(())
}
