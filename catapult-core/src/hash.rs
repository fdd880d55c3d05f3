//! Content fingerprints.
//!
//! Two distinct fingerprints are kept per file. The content hash (SHA-256)
//! drives local change detection. The remote blob identifier reproduces the
//! hash the remote host assigns to stored bytes, so an upload's resulting
//! identifier is known before the request is made.

use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::Result;

/// SHA-256 over the raw bytes, hex encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Content hash of a file on disk.
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(content_hash(&bytes))
}

/// The identifier the remote host assigns to stored bytes: SHA-1 over
/// `"blob "`, the decimal byte count, a single NUL, then the bytes.
///
/// The construction must match the remote exactly, header included,
/// otherwise round-trip prediction breaks and every upload looks dirty on
/// the next pass.
pub fn remote_blob_id(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", bytes.len()).as_bytes());
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_sha256() {
        assert_eq!(
            content_hash(b"hello\n"),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn blob_id_matches_known_vectors() {
        // `git hash-object` on the same bytes.
        assert_eq!(
            remote_blob_id(b"hello\n"),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
        assert_eq!(
            remote_blob_id(b""),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
    }

    #[test]
    fn blob_id_depends_on_size_header() {
        // Same content bytes, different declared length would change the
        // digest; make sure the header is part of the hash.
        assert_ne!(remote_blob_id(b"a"), content_hash(b"a"));
        assert_ne!(remote_blob_id(b"a"), remote_blob_id(b"aa"));
    }

    #[test]
    fn hash_file_reads_disk_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello\n").unwrap();
        assert_eq!(hash_file(&path).unwrap(), content_hash(b"hello\n"));
    }
}
