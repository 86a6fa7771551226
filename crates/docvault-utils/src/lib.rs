//! Shared foundation for the docvault workspace.
//!
//! This crate hosts the pieces every other docvault crate leans on:
//! content hashing, crash-safe file writes, advisory file locks, the
//! error taxonomy with exit-code mapping, logging setup, and the small
//! validated types (entity names, workflow names, document ids) that the
//! archive protocol is built from.

pub mod atomic_write;
pub mod error;
pub mod exit_codes;
pub mod features;
pub mod hash;
pub mod lock;
pub mod logging;
pub mod types;

pub use atomic_write::write_atomic;
pub use error::{DocVaultError, ErrorKind};
pub use exit_codes::ExitCode;
pub use features::FeatureSet;
pub use hash::{hash_bytes, hash_file};
pub use lock::with_file_lock;
pub use types::{ContentHash, DocumentId, EntityName, SourceKind, WorkflowName};
