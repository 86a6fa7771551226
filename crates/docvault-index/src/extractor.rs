//! Best-effort text extraction for full-text indexing.

use camino::Utf8Path;

/// Pulls searchable text out of archived content files.
///
/// Implementations are best-effort: unreadable or binary content yields
/// an empty string, never an error. Heavier extractors (PDF text
/// layers, OCR) plug in from outside the core.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, path: &Utf8Path, mime: &str) -> String;
}

/// Reads `text/*`, markdown, and CSV content verbatim; everything else
/// indexes as empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, path: &Utf8Path, mime: &str) -> String {
        let textual = mime.starts_with("text/")
            || matches!(mime, "application/json" | "application/x-ndjson");
        if !textual {
            return String::new();
        }
        std::fs::read_to_string(path).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn reads_text_files() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("a.md")).unwrap();
        std::fs::write(&path, "hello index").unwrap();
        assert_eq!(
            PlainTextExtractor.extract_text(&path, "text/markdown"),
            "hello index"
        );
    }

    #[test]
    fn binary_mimes_yield_empty() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("a.pdf")).unwrap();
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        assert_eq!(PlainTextExtractor.extract_text(&path, "application/pdf"), "");
    }

    #[test]
    fn missing_file_yields_empty() {
        let path = Utf8PathBuf::from("/nonexistent/file.txt");
        assert_eq!(PlainTextExtractor.extract_text(&path, "text/plain"), "");
    }
}
