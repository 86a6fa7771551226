//! CLI dispatch.
//!
//! `run()` parses arguments, sets up logging, and routes to command
//! handlers. All output (including errors) happens here or below;
//! `main.rs` only maps the returned exit code.

use super::args::{Cli, Commands};
use super::commands;
use clap::Parser;
use docvault_utils::error::DocVaultError;
use docvault_utils::logging::init_tracing;
use docvault_utils::ExitCode;

pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let result = match cli.command {
        Commands::Init { reset, entity } => commands::init::execute(reset, &entity),
        Commands::Ingest(cmd) => commands::ingest::execute(cmd),
        Commands::Index { base } => commands::index::execute(base.as_deref()),
        Commands::Search {
            query,
            entity,
            source,
            workflow,
            category,
            limit,
        } => commands::search::execute(
            query.as_deref(),
            entity,
            source,
            workflow,
            category,
            limit,
        ),
        Commands::Export(cmd) => commands::export::execute(cmd),
        Commands::Workflows(cmd) => commands::workflows::execute(cmd),
    };

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            eprintln!("error: {err}");
            Err(err.to_exit_code())
        }
    }
}

/// Shorthand used by command handlers for ad-hoc config failures.
pub(crate) fn config_error(message: impl Into<String>) -> DocVaultError {
    DocVaultError::Config(docvault_utils::error::ConfigError::InvalidFile(
        message.into(),
    ))
}
