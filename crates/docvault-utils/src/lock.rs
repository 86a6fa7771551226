//! Advisory file locking for read-modify-write files.
//!
//! The workflow registry, criteria store, and per-directory manifests
//! are mutated under a sibling `.lock` file held for the duration of one
//! update. Locks are advisory (they coordinate docvault processes, not
//! arbitrary writers) and never held long; acquisition gives up after a
//! timeout rather than queueing forever.

use crate::error::LockError;
use camino::Utf8Path;
use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::thread;
use std::time::{Duration, Instant};

/// Default lock acquisition timeout.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run `f` while holding an exclusive advisory lock for `path`.
///
/// The lock lives in a sibling file named `{path}.lock`. Acquisition
/// polls until `timeout` elapses.
///
/// # Errors
///
/// [`LockError::Timeout`] when another process holds the lock past the
/// deadline; [`LockError::Io`] when the lock file itself cannot be
/// created or locked.
pub fn with_file_lock<T>(
    path: &Utf8Path,
    timeout: Duration,
    f: impl FnOnce() -> T,
) -> Result<T, LockError> {
    let lock_path = lock_path_for(path);
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
            path: lock_path.to_string(),
            source,
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|source| LockError::Io {
            path: lock_path.to_string(),
            source,
        })?;

    let mut lock = RwLock::new(file);
    let deadline = Instant::now() + timeout;

    loop {
        match lock.try_write() {
            Ok(_guard) => {
                // Guard drops (and releases) when this arm ends.
                return Ok(f());
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(LockError::Timeout {
                        path: lock_path.to_string(),
                        timeout_secs: timeout.as_secs(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                return Err(LockError::Io {
                    path: lock_path.to_string(),
                    source,
                });
            }
        }
    }
}

fn lock_path_for(path: &Utf8Path) -> camino::Utf8PathBuf {
    let name = path.file_name().unwrap_or("file");
    match path.parent() {
        Some(parent) => parent.join(format!("{name}.lock")),
        None => camino::Utf8PathBuf::from(format!("{name}.lock")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn runs_closure_and_returns_value() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("data.json")).unwrap();
        let out = with_file_lock(&path, LOCK_TIMEOUT, || 41 + 1).unwrap();
        assert_eq!(out, 42);
    }

    #[test]
    fn creates_sibling_lock_file() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("data.json")).unwrap();
        with_file_lock(&path, LOCK_TIMEOUT, || ()).unwrap();
        assert!(dir.path().join("data.json.lock").exists());
    }

    #[test]
    fn lock_is_reentrant_across_sequential_calls() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("data.json")).unwrap();
        for i in 0..3 {
            let got = with_file_lock(&path, LOCK_TIMEOUT, move || i).unwrap();
            assert_eq!(got, i);
        }
    }

    #[test]
    fn contended_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("data.json")).unwrap();
        let lock_path = dir.path().join("data.json.lock");

        // Hold the lock from this thread while a second thread tries.
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .unwrap();
        let mut holder = RwLock::new(file);
        let _guard = holder.try_write().unwrap();

        let path2 = path.clone();
        let handle = thread::spawn(move || {
            with_file_lock(&path2, Duration::from_millis(300), || ()).unwrap_err()
        });
        let err = handle.join().unwrap();
        assert!(matches!(err, LockError::Timeout { .. }));
    }
}
