//! Bundled source adapters.
//!
//! Each adapter turns one ingress (stdin, a directory of messages, a
//! Gmail-style mailbox) into the uniform item stream the pipeline
//! consumes. Network clients stay behind traits; the adapters here only
//! know how to walk their source and acknowledge results.

pub mod files;
pub mod gmail;
pub mod stdin;

pub use files::FilesAdapter;
pub use gmail::{GmailAdapter, GmailClient};
pub use stdin::StdinAdapter;
