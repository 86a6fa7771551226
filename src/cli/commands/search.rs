//! `docvault search`: query the global index.

use super::load_config;
use docvault_index::{GlobalIndex, SearchFilters};
use docvault_utils::error::DocVaultError;

#[allow(clippy::too_many_arguments)]
pub fn execute(
    query: Option<&str>,
    entity: Option<String>,
    source: Option<String>,
    workflow: Option<String>,
    category: Option<String>,
    limit: usize,
) -> Result<(), DocVaultError> {
    let (_home, config) = load_config()?;
    let base = config.archive.resolved_base_path();
    let index = GlobalIndex::open(&GlobalIndex::default_path(&base))?;

    let filters = SearchFilters {
        entity,
        source,
        workflow,
        category,
    };
    let hits = index.search(query, &filters, limit)?;

    if hits.is_empty() {
        println!("No matching documents");
        return Ok(());
    }
    for hit in &hits {
        let workflow = hit.workflow.as_deref().unwrap_or("-");
        println!(
            "{}  {}  {}  {}  {}/{}",
            hit.date, hit.entity, hit.source, workflow, hit.entity, hit.rel_path
        );
    }
    println!("\n{} result(s)", hits.len());
    Ok(())
}
