//! SHA-256 content digests for duplicate detection

use sha2::{Digest, Sha256};

use super::types::{ByteSource, ValidationError};

/// Compute SHA-256 hash of data as 64 lowercase hex characters
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Read a source in full and hash it
pub fn hash_source<S: ByteSource + ?Sized>(source: &S) -> Result<String, ValidationError> {
    let data = source.read_bytes().map_err(|e| {
        tracing::error!(error = %e, "Hash calculation error");
        ValidationError::processing(format!("Failed to calculate file hash: {}", e))
    })?;
    Ok(compute_hash(&data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{ErrorCode, RawFile};
    use crate::preview::PreviewStore;
    use axum::body::Bytes;

    #[test]
    fn test_compute_hash() {
        let hash = compute_hash(b"Hello, World!");
        assert_eq!(hash.len(), 64); // SHA-256 = 32 bytes = 64 hex chars
        assert!(hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            compute_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            compute_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_deterministic_and_sensitive() {
        let data = vec![7u8; 4096];
        let mut changed = data.clone();
        changed[2048] = 8;

        assert_eq!(compute_hash(&data), compute_hash(&data));
        assert_ne!(compute_hash(&data), compute_hash(&changed));
    }

    #[test]
    fn test_hash_source_matches_bytes() {
        let raw = RawFile::new("a.pdf", "", b"content".to_vec());
        assert_eq!(hash_source(&raw).unwrap(), compute_hash(b"content"));
    }

    #[test]
    fn test_unreadable_source_is_processing_error() {
        let store = PreviewStore::new();
        let handle = store.acquire(Bytes::from_static(b"content")).unwrap();
        store.revoke(handle.id());

        let err = hash_source(&handle).unwrap_err();
        assert_eq!(err.code, ErrorCode::ProcessingError);
        assert!(err.message.starts_with("Failed to calculate file hash"));
    }
}
