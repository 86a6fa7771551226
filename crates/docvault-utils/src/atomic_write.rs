//! Crash-safe byte writes: temp file + fsync + rename.
//!
//! The write protocol keeps readers from ever observing a partial file:
//! content lands in a uniquely named temp file in the target directory,
//! is fsynced, and is renamed over the destination. A failure at any
//! point removes the temp file.
//!
//! The temp name embeds the process id. If a concurrent writer already
//! holds the same temp name the exclusive create fails and the caller
//! gets [`StoreError::Collision`]; retrying with a different destination
//! name is the caller's decision.

use crate::error::StoreError;
use camino::Utf8Path;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::process;

/// Atomically write `content` to `path`.
///
/// Creates parent directories as needed. On success the destination
/// contains exactly `content`; on failure the destination is untouched
/// and the temp file has been removed (best effort).
///
/// # Errors
///
/// [`StoreError::Collision`] when the temp file name is already held by
/// a concurrent writer; [`StoreError::Io`] for anything the filesystem
/// refuses.
pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = path.file_name().unwrap_or("file");
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, process::id()));

    let result = write_via_temp(path, &temp_path, content);
    // On collision the temp file belongs to the concurrent writer; only
    // clean up temp files this call created.
    if matches!(result, Err(StoreError::Io(_))) {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_via_temp(
    path: &Utf8Path,
    temp_path: &Utf8Path,
    content: &[u8],
) -> Result<(), StoreError> {
    let mut temp = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)
        .map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                StoreError::Collision {
                    path: temp_path.to_string(),
                }
            } else {
                StoreError::Io(e)
            }
        })?;

    temp.write_all(content)?;
    temp.sync_all()?;
    drop(temp);

    fs::rename(temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8(dir: &TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
    }

    #[test]
    fn writes_content() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir, "out.bin");
        write_atomic(&path, b"payload").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir, "a/b/c/out.bin");
        write_atomic(&path, b"nested").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"nested");
    }

    #[test]
    fn overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir, "out.bin");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir, "out.bin");
        write_atomic(&path, b"data").unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out.bin".to_string()]);
    }

    #[test]
    fn held_temp_name_reports_collision() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir, "out.bin");
        let temp = utf8(&dir, &format!(".out.bin.{}.tmp", process::id()));
        fs::write(&temp, b"held by someone else").unwrap();

        let err = write_atomic(&path, b"data").unwrap_err();
        assert!(matches!(err, StoreError::Collision { .. }));
        // The concurrent writer's temp file must not be removed.
        assert!(temp.exists());
        assert!(!path.exists());
    }

    #[test]
    fn empty_content_is_fine() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir, "empty.bin");
        write_atomic(&path, b"").unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), 0);
    }
}
