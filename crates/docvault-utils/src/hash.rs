//! SHA-256 content hashing for the archive protocol.
//!
//! Every stored document is addressed by `sha256:` plus the lowercase
//! hex digest of its bytes. Hashing must be the same everywhere, so the
//! two helpers here are the only place digests are produced.

use crate::types::ContentHash;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Hash a byte slice.
#[must_use]
pub fn hash_bytes(content: &[u8]) -> ContentHash {
    let digest = Sha256::digest(content);
    ContentHash::from_hex_digest(format!("{digest:x}"))
}

/// Hash a file without loading it whole, reading 64 KiB at a time.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(ContentHash::from_hex_digest(format!(
        "{:x}",
        hasher.finalize()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn hash_is_deterministic() {
        let a = hash_bytes(b"hello world");
        let b = hash_bytes(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_matches_known_vector() {
        // sha256("abc")
        let h = hash_bytes(b"abc");
        assert_eq!(
            h.as_str(),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn distinct_content_distinct_hash() {
        assert_ne!(hash_bytes(b"a"), hash_bytes(b"b"));
    }

    #[test]
    fn empty_input_hashes() {
        let h = hash_bytes(b"");
        assert_eq!(
            h.as_str(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn file_hash_matches_byte_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("payload.bin");
        let content = vec![0x42u8; 200_000];
        let mut f = File::create(&path).unwrap();
        f.write_all(&content).unwrap();
        drop(f);

        assert_eq!(hash_file(&path).unwrap(), hash_bytes(&content));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn hash_format_always_valid(content in proptest::collection::vec(any::<u8>(), 0..4096)) {
                let h = hash_bytes(&content);
                prop_assert!(h.as_str().starts_with("sha256:"));
                prop_assert_eq!(h.hex().len(), 64);
                prop_assert!(h.hex().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            }

            #[test]
            fn equal_inputs_equal_hashes(content in proptest::collection::vec(any::<u8>(), 0..1024)) {
                prop_assert_eq!(hash_bytes(&content), hash_bytes(&content));
            }
        }
    }
}
