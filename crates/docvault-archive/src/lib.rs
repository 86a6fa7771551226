//! The archive write protocol.
//!
//! Materializes one document into the repository: content first, then
//! attachments, then the side-car, then the manifest line, each write
//! atomic. A failure anywhere unwinds every file this call created, so
//! readers never see a content file without its side-car or the other
//! way round. The dedup tracker is the caller's job and must only be
//! updated after this crate reports success.

mod pdf;
mod renderer;
mod writer;

pub use pdf::text_to_pdf_bytes;
pub use renderer::{MinimalPdfRenderer, PdfRenderer, MAX_RENDER_HTML_BYTES};
pub use writer::{ArchiveOptions, ArchiveOutcome, ArchiveWriter, StreamTarget};
