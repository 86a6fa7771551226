//! Deterministic naming for the archive: document ids, filename bases,
//! extensions, sanitizers, and the collision suffix policy.
//!
//! Everything in this crate is a pure function of its inputs except
//! [`resolve_collision`], which probes the target directory. The same
//! bytes, timestamp, and workflow always produce the same names, which
//! is what makes re-runs and the dedup tracker trustworthy.

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use docvault_utils::error::NamingError;
use docvault_utils::types::{ContentHash, DocumentId, SourceKind};

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Maximum sanitized filename length.
pub const MAX_FILENAME_LEN: usize = 200;

/// Maximum normalized name-base length for archived originals.
pub const MAX_NAME_BASE_LEN: usize = 120;

const MAX_COLLISION_SUFFIX: u32 = 999;

/// Build the canonical document id for a payload.
#[must_use]
pub fn document_id(
    source: SourceKind,
    workflow_or_stream: &str,
    created_at: DateTime<Utc>,
    content_hash: ContentHash,
) -> DocumentId {
    DocumentId::new(source, workflow_or_stream, created_at, content_hash)
}

/// Filename base: `{YYYY-MM-DD}-{source}-{base36(epoch_seconds)}`.
#[must_use]
pub fn filename_base(source: SourceKind, created_at: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        created_at.format("%Y-%m-%d"),
        source,
        base36(created_at.timestamp().max(0) as u64)
    )
}

/// Encode an integer in lowercase base36.
#[must_use]
pub fn base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 alphabet is ascii")
}

/// Pick a file extension for a payload.
///
/// The original filename's extension wins when present and non-empty;
/// otherwise a fixed mimetype table applies, defaulting to `bin`.
#[must_use]
pub fn extension_for(mimetype: &str, original_filename: Option<&str>) -> String {
    if let Some(name) = original_filename {
        if let Some((_, ext)) = name.rsplit_once('.') {
            if !ext.is_empty() && !ext.contains('/') {
                return ext.to_ascii_lowercase();
            }
        }
    }

    match mimetype {
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        "text/html" => "html",
        "text/markdown" => "md",
        "application/json" => "json",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "application/zip" => "zip",
        "application/x-gzip" => "gz",
        "text/csv" => "csv",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        _ => "bin",
    }
    .to_string()
}

/// Make a filename filesystem-safe.
///
/// Strips directory components, replaces `<>:"|?*`, control bytes, and
/// path separators with `-`, collapses separator runs, trims leading and
/// trailing `.`/`-`, and truncates to `max` while preserving at most one
/// extension. Never returns an empty string.
#[must_use]
pub fn sanitize_filename(filename: &str, max: usize) -> String {
    // Drop any path components first.
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let mut cleaned = String::with_capacity(base.len());
    for ch in base.chars() {
        let mapped = match ch {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '/' | '\\' => '-',
            c if (c as u32) < 0x20 => '-',
            c => c,
        };
        cleaned.push(mapped);
    }

    // Collapse runs of hyphens and whitespace into a single hyphen.
    let mut collapsed = String::with_capacity(cleaned.len());
    let mut in_run = false;
    for ch in cleaned.chars() {
        if ch == '-' || ch.is_whitespace() {
            if !in_run {
                collapsed.push('-');
                in_run = true;
            }
        } else {
            collapsed.push(ch);
            in_run = false;
        }
    }

    let trimmed = collapsed.trim_matches(['.', '-']);
    let mut result = if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    };

    if result.chars().count() > max {
        let (stem, ext) = match result.rsplit_once('.') {
            Some((s, e)) if !s.is_empty() => (s.to_string(), Some(e.to_string())),
            _ => (result.clone(), None),
        };
        result = match ext {
            Some(ext) => {
                let keep = max.saturating_sub(ext.chars().count() + 1).max(1);
                let stem: String = stem.chars().take(keep).collect();
                format!("{stem}.{ext}")
            }
            None => {
                let cut: String = result.chars().take(max).collect();
                cut.trim_end_matches(['.', '-']).to_string()
            }
        };
    }

    result
}

/// Normalize a name for use as a content filename base.
///
/// Lowercases, maps whitespace to `-`, keeps only `[a-z0-9._-]`,
/// collapses separator runs, trims leading/trailing separators, and
/// bounds the length. Falls back to `document` when nothing survives.
#[must_use]
pub fn normalize_name_base(name: &str, max: usize) -> String {
    let lowered = name.trim().to_lowercase();

    let mut mapped = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        let out = if ch.is_whitespace() {
            '-'
        } else if ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '.' | '_' | '-') {
            ch
        } else {
            '-'
        };
        mapped.push(out);
    }

    // A lone separator survives as itself; a run of two or more mixed
    // separators collapses to a single hyphen.
    let chars: Vec<char> = mapped.chars().collect();
    let mut collapsed = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if matches!(c, '-' | '_' | '.') {
            let mut j = i;
            while j < chars.len() && matches!(chars[j], '-' | '_' | '.') {
                j += 1;
            }
            collapsed.push(if j - i > 1 { '-' } else { c });
            i = j;
        } else {
            collapsed.push(c);
            i += 1;
        }
    }

    let trimmed = collapsed.trim_matches(['-', '_', '.']);
    let mut result = if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    };

    if result.chars().count() > max {
        result = result.chars().take(max).collect();
    }

    result
}

/// Resolve a filename collision in `dir` for `{base}.{ext}` and its
/// `.json` sidecar.
///
/// Returns the base to use: unchanged when both names are free,
/// otherwise `{base}-1` through `{base}-999`.
///
/// # Errors
///
/// [`NamingError::CollisionExhausted`] after 999 suffixes.
pub fn resolve_collision(dir: &Utf8Path, base: &str, ext: &str) -> Result<String, NamingError> {
    if is_free(dir, base, ext) {
        return Ok(base.to_string());
    }
    for n in 1..=MAX_COLLISION_SUFFIX {
        let candidate = format!("{base}-{n}");
        if is_free(dir, &candidate, ext) {
            return Ok(candidate);
        }
    }
    Err(NamingError::CollisionExhausted {
        base: base.to_string(),
    })
}

fn is_free(dir: &Utf8Path, base: &str, ext: &str) -> bool {
    !dir.join(format!("{base}.{ext}")).exists() && !dir.join(format!("{base}.json")).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use chrono::TimeZone;
    use docvault_utils::hash_bytes;
    use tempfile::TempDir;

    #[test]
    fn base36_known_values() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(1_762_336_800), "t4vvc0");
    }

    #[test]
    fn filename_base_shape() {
        let ts = Utc.with_ymd_and_hms(2025, 11, 5, 10, 0, 0).unwrap();
        let base = filename_base(SourceKind::Mail, ts);
        assert!(base.starts_with("2025-11-05-mail-"));
        let suffix = base.rsplit('-').next().unwrap();
        assert_eq!(suffix, base36(ts.timestamp() as u64));
    }

    #[test]
    fn document_id_matches_components() {
        let ts = Utc.with_ymd_and_hms(2025, 11, 5, 10, 0, 0).unwrap();
        let hash = hash_bytes(b"%PDF-1.4 fake");
        let id = document_id(SourceKind::Mail, "acme-invoice", ts, hash.clone());
        assert_eq!(
            id.to_string(),
            format!("mail=acme-invoice/2025-11-05T10:00:00Z/{hash}")
        );
    }

    #[test]
    fn extension_prefers_original_filename() {
        assert_eq!(extension_for("application/pdf", Some("report.XLSX")), "xlsx");
        assert_eq!(extension_for("application/pdf", Some("noext")), "pdf");
        assert_eq!(extension_for("application/pdf", None), "pdf");
    }

    #[test]
    fn extension_table_and_default() {
        assert_eq!(extension_for("text/plain", None), "txt");
        assert_eq!(extension_for("text/csv", None), "csv");
        assert_eq!(extension_for("application/x-gzip", None), "gz");
        assert_eq!(
            extension_for(
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                None
            ),
            "xlsx"
        );
        assert_eq!(extension_for("application/x-unknown", None), "bin");
    }

    #[test]
    fn sanitize_strips_paths_and_bad_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd", 200), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\x\\doc.pdf", 200), "doc.pdf");
        assert_eq!(sanitize_filename("inv<oi>ce?.pdf", 200), "inv-oi-ce-.pdf");
        assert_eq!(sanitize_filename("a\x00b\x1fc.txt", 200), "a-b-c.txt");
    }

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(sanitize_filename("--  weird -- name --", 200), "weird-name");
        assert_eq!(sanitize_filename("...dots...", 200), "dots");
        assert_eq!(sanitize_filename("", 200), "unnamed");
        assert_eq!(sanitize_filename("///", 200), "unnamed");
    }

    #[test]
    fn sanitize_truncation_preserves_extension() {
        let long = format!("{}.pdf", "x".repeat(300));
        let out = sanitize_filename(&long, 200);
        assert!(out.len() <= 200);
        assert!(out.ends_with(".pdf"));
    }

    #[test]
    fn normalize_name_base_rules() {
        assert_eq!(normalize_name_base("Invoice ABC 2025.pdf", 120), "invoice-abc-2025.pdf");
        assert_eq!(normalize_name_base("  Spaced   Out  ", 120), "spaced-out");
        assert_eq!(normalize_name_base("weird__--..name", 120), "weird-name");
        assert_eq!(normalize_name_base("", 120), "document");
        assert_eq!(normalize_name_base("ΩΩΩ", 120), "document");
        assert_eq!(normalize_name_base(&"a".repeat(300), 120).len(), 120);
    }

    #[test]
    fn collision_free_directory_keeps_base() {
        let dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        assert_eq!(resolve_collision(&dir, "2025-11-05-mail-abc", "pdf").unwrap(), "2025-11-05-mail-abc");
    }

    #[test]
    fn collision_suffixes_in_order() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        std::fs::write(dir.join("base.pdf"), b"x").unwrap();
        assert_eq!(resolve_collision(&dir, "base", "pdf").unwrap(), "base-1");

        std::fs::write(dir.join("base-1.json"), b"{}").unwrap();
        assert_eq!(resolve_collision(&dir, "base", "pdf").unwrap(), "base-2");
    }

    #[test]
    fn sidecar_presence_alone_is_a_collision() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        std::fs::write(dir.join("base.json"), b"{}").unwrap();
        assert_eq!(resolve_collision(&dir, "base", "pdf").unwrap(), "base-1");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn sanitized_names_are_safe(name in ".{0,400}") {
                let out = sanitize_filename(&name, 200);
                prop_assert!(!out.is_empty());
                prop_assert!(out.chars().count() <= 200);
                prop_assert!(!out.contains('/'));
                prop_assert!(!out.contains('\\'));
                prop_assert!(out.chars().all(|c| (c as u32) >= 0x20));
                for bad in ['<', '>', ':', '"', '|', '?', '*'] {
                    prop_assert!(!out.contains(bad));
                }
                prop_assert!(!out.starts_with(['.', '-']));
                prop_assert!(!out.ends_with(['.', '-']) || out == "unnamed");
            }

            #[test]
            fn normalized_bases_are_safe(name in ".{0,300}") {
                let out = normalize_name_base(&name, 120);
                prop_assert!(!out.is_empty());
                prop_assert!(out.chars().count() <= 120);
                prop_assert!(out.chars().all(|c| c.is_ascii_lowercase()
                    || c.is_ascii_digit()
                    || matches!(c, '.' | '_' | '-')));
            }

            #[test]
            fn base36_round_trip(v in 0u64..u64::MAX) {
                let s = base36(v);
                let decoded = s.bytes().fold(0u128, |acc, b| {
                    let d = BASE36_ALPHABET.iter().position(|&a| a == b).unwrap() as u128;
                    acc * 36 + d
                });
                prop_assert_eq!(decoded, v as u128);
            }
        }
    }
}
