//! The side-car document schema.
//!
//! A side-car is the JSON file written next to every archived content
//! file and is the sole source of truth for per-document metadata. The
//! typed core is strict (validated ids, entities, hashes, sizes); the
//! `origin` sub-tree stays free-form so connectors can preserve whatever
//! their source gives them.
//!
//! Validation runs in two places with different tempers: fail-fast on
//! write (a bad side-car must never reach disk) and skip-with-a-warning
//! on index (legacy files must not wedge a rebuild).

mod builder;
mod schema;

pub use builder::SidecarBuilder;
pub use schema::{
    Accounting, ContentMeta, ExpenseRecord, IngestMeta, LlmemoryMeta, Relationship, Sidecar,
};
