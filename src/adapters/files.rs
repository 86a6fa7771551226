//! Directory adapter for `.eml` collections and Maildirs.

use chrono::{DateTime, NaiveDate, Utc};
use docvault_pipeline::{Outcome, SourceAdapter, SourceItem};
use docvault_utils::error::DocVaultError;
use mailparse::MailHeaderMap;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Walks a directory of raw messages, newest first.
///
/// Two layouts are understood: plain `.eml` files anywhere under the
/// root, and Maildir trees (files under any `cur/` or `new/`
/// directory). An optional date window filters on each message's Date
/// header; messages without a parseable date sort to the epoch.
pub struct FilesAdapter {
    queue: VecDeque<(PathBuf, Vec<u8>)>,
}

impl FilesAdapter {
    pub fn discover(
        dir: &Path,
        after: Option<NaiveDate>,
        before: Option<NaiveDate>,
    ) -> Result<Self, DocVaultError> {
        let files = discover_message_files(dir);
        let mut dated: Vec<(DateTime<Utc>, PathBuf, Vec<u8>)> = Vec::with_capacity(files.len());

        for path in files {
            let raw = match std::fs::read(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("skipping unreadable {}: {e}", path.display());
                    continue;
                }
            };
            let date = message_date(&raw);
            if let Some(after) = after {
                if date.date_naive() < after {
                    continue;
                }
            }
            if let Some(before) = before {
                if date.date_naive() > before {
                    continue;
                }
            }
            dated.push((date, path, raw));
        }

        // Most recent first.
        dated.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(Self {
            queue: dated.into_iter().map(|(_, p, r)| (p, r)).collect(),
        })
    }
}

impl SourceAdapter for FilesAdapter {
    fn next_item(&mut self) -> Result<Option<SourceItem>, DocVaultError> {
        Ok(self.queue.pop_front().map(|(path, raw_bytes)| SourceItem {
            id: path.display().to_string(),
            display_name: path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
            raw_bytes,
        }))
    }

    fn ack(&mut self, _id: &str, _outcome: &Outcome) -> Result<(), DocVaultError> {
        // Local files have no upstream to acknowledge.
        Ok(())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.queue.len())
    }
}

fn discover_message_files(dir: &Path) -> Vec<PathBuf> {
    // Plain .eml collections win when present.
    let mut eml: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case("eml"))
        })
        .map(|e| e.into_path())
        .collect();
    if !eml.is_empty() {
        eml.sort();
        return eml;
    }

    // Maildir: files under any cur/ or new/ directory.
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let hidden = e
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with('.'));
            let in_mail_dir = e
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .is_some_and(|n| n == "cur" || n == "new");
            in_mail_dir && !hidden
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Parse a message's Date header; epoch when absent or unparseable.
fn message_date(raw: &[u8]) -> DateTime<Utc> {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    let Ok(parsed) = mailparse::parse_mail(raw) else {
        return epoch;
    };
    let Some(date) = parsed.get_headers().get_first_value("Date") else {
        return epoch;
    };
    DateTime::parse_from_rfc2822(&date)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(epoch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn email(date: &str) -> String {
        format!("From: a@b.com\r\nSubject: x\r\nDate: {date}\r\n\r\nbody\r\n")
    }

    #[test]
    fn discovers_eml_recursively_newest_first() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(
            dir.path().join("old.eml"),
            email("Mon, 06 Jan 2025 10:00:00 +0000"),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("sub/new.eml"),
            email("Wed, 05 Nov 2025 10:00:00 +0000"),
        )
        .unwrap();

        let mut adapter = FilesAdapter::discover(dir.path(), None, None).unwrap();
        assert_eq!(adapter.len_hint(), Some(2));
        assert_eq!(adapter.next_item().unwrap().unwrap().display_name, "new.eml");
        assert_eq!(adapter.next_item().unwrap().unwrap().display_name, "old.eml");
    }

    #[test]
    fn maildir_layout_is_understood() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("inbox/cur")).unwrap();
        std::fs::create_dir_all(dir.path().join("inbox/new")).unwrap();
        std::fs::write(
            dir.path().join("inbox/cur/msg1"),
            email("Mon, 06 Jan 2025 10:00:00 +0000"),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("inbox/new/msg2"),
            email("Tue, 07 Jan 2025 10:00:00 +0000"),
        )
        .unwrap();
        // Hidden files and non-maildir files are ignored.
        std::fs::write(dir.path().join("inbox/cur/.hidden"), "x").unwrap();
        std::fs::write(dir.path().join("inbox/readme.txt"), "x").unwrap();

        let adapter = FilesAdapter::discover(dir.path(), None, None).unwrap();
        assert_eq!(adapter.len_hint(), Some(2));
    }

    #[test]
    fn date_window_filters() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("jan.eml"),
            email("Mon, 06 Jan 2025 10:00:00 +0000"),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("nov.eml"),
            email("Wed, 05 Nov 2025 10:00:00 +0000"),
        )
        .unwrap();

        let after = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let mut adapter = FilesAdapter::discover(dir.path(), Some(after), None).unwrap();
        assert_eq!(adapter.len_hint(), Some(1));
        assert_eq!(adapter.next_item().unwrap().unwrap().display_name, "nov.eml");

        let before = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let adapter = FilesAdapter::discover(dir.path(), None, Some(before)).unwrap();
        assert_eq!(adapter.len_hint(), Some(1));
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let mut adapter = FilesAdapter::discover(dir.path(), None, None).unwrap();
        assert_eq!(adapter.len_hint(), Some(0));
        assert!(adapter.next_item().unwrap().is_none());
    }
}
