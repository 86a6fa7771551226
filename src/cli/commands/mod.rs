//! Command handlers.

pub mod export;
pub mod index;
pub mod ingest;
pub mod init;
pub mod search;
pub mod workflows;

use camino::Utf8PathBuf;
use docvault_config::{home_dir, Config};
use docvault_utils::error::DocVaultError;

/// Load the configuration from the docvault home.
pub(crate) fn load_config() -> Result<(Utf8PathBuf, Config), DocVaultError> {
    let home = home_dir();
    std::fs::create_dir_all(&home)?;
    let config = Config::load_from_home(&home)?;
    Ok((home, config))
}
