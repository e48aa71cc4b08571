//! Preview Store
//!
//! Issues revocable handles over uploaded file bytes, so a file can be re-read
//! for rendering, duplicate checks and export without being uploaded again.
//!
//! Handles are scoped: a [`PreviewHandle`] revokes its entry when it is
//! dropped, so removing a file from the working collection frees its bytes.
//! A handle can also be revoked early through [`PreviewStore::revoke`], after
//! which reads through it fail.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use axum::body::Bytes;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::intake::ByteSource;

/// Preview store errors
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("Preview handle revoked: {0}")]
    Revoked(Uuid),

    #[error("Too many open previews (max: {max})")]
    CapacityExceeded { max: usize },
}

/// Registry of live preview entries
#[derive(Clone, Default)]
pub struct PreviewStore {
    inner: Arc<PreviewStoreInner>,
}

#[derive(Default)]
struct PreviewStoreInner {
    /// Live entries indexed by handle ID
    entries: RwLock<HashMap<Uuid, Bytes>>,

    /// Maximum live handles (0 = unlimited)
    max_handles: usize,
}

impl PreviewStore {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that refuses new handles past `max` live ones
    pub fn with_max_handles(max: usize) -> Self {
        Self {
            inner: Arc::new(PreviewStoreInner {
                entries: RwLock::new(HashMap::new()),
                max_handles: max,
            }),
        }
    }

    /// Register bytes and hand out the handle that owns them
    pub fn acquire(&self, content: Bytes) -> Result<PreviewHandle, PreviewError> {
        let mut entries = self.inner.entries.write();

        if self.inner.max_handles > 0 && entries.len() >= self.inner.max_handles {
            return Err(PreviewError::CapacityExceeded {
                max: self.inner.max_handles,
            });
        }

        let id = Uuid::new_v4();
        let size = content.len();
        entries.insert(id, content);

        tracing::debug!(handle = %id, size = size, "Acquired preview handle");

        Ok(PreviewHandle {
            id,
            store: self.clone(),
        })
    }

    /// Read the bytes behind a handle ID
    pub fn read(&self, id: Uuid) -> Result<Bytes, PreviewError> {
        self.inner
            .entries
            .read()
            .get(&id)
            .cloned()
            .ok_or(PreviewError::Revoked(id))
    }

    /// Revoke a handle ID. Returns whether it was live.
    pub fn revoke(&self, id: Uuid) -> bool {
        let removed = self.inner.entries.write().remove(&id).is_some();
        if removed {
            tracing::debug!(handle = %id, "Revoked preview handle");
        }
        removed
    }

    /// Whether a handle ID is still live
    pub fn contains(&self, id: Uuid) -> bool {
        self.inner.entries.read().contains_key(&id)
    }

    /// Number of live handles
    pub fn live_handles(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Total bytes held by live handles
    pub fn live_bytes(&self) -> usize {
        self.inner.entries.read().values().map(|b| b.len()).sum()
    }
}

/// Owning reference to one preview entry
pub struct PreviewHandle {
    id: Uuid,
    store: PreviewStore,
}

impl PreviewHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Read the bytes; fails once the handle has been revoked
    pub fn read(&self) -> Result<Bytes, PreviewError> {
        self.store.read(self.id)
    }

    pub fn is_live(&self) -> bool {
        self.store.contains(self.id)
    }

    /// Revoke now instead of at drop. Returns whether the entry was still live.
    pub fn release(self) -> bool {
        self.store.revoke(self.id)
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.store.revoke(self.id);
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle").field("id", &self.id).finish()
    }
}

impl ByteSource for PreviewHandle {
    fn read_bytes(&self) -> io::Result<Bytes> {
        self.read()
            .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_read() {
        let store = PreviewStore::new();
        let handle = store.acquire(Bytes::from_static(b"%PDF-1.4")).unwrap();

        assert!(handle.is_live());
        assert_eq!(handle.read().unwrap().as_ref(), b"%PDF-1.4");
        assert_eq!(store.live_handles(), 1);
        assert_eq!(store.live_bytes(), 8);
    }

    #[test]
    fn test_drop_revokes() {
        let store = PreviewStore::new();
        let handle = store.acquire(Bytes::from_static(b"abc")).unwrap();
        let id = handle.id();

        drop(handle);

        assert!(!store.contains(id));
        assert_eq!(store.live_handles(), 0);
    }

    #[test]
    fn test_release_reports_liveness() {
        let store = PreviewStore::new();
        let handle = store.acquire(Bytes::from_static(b"abc")).unwrap();
        assert!(handle.release());

        let handle = store.acquire(Bytes::from_static(b"abc")).unwrap();
        store.revoke(handle.id());
        assert!(!handle.release());
    }

    #[test]
    fn test_revoked_handle_fails_to_read() {
        let store = PreviewStore::new();
        let handle = store.acquire(Bytes::from_static(b"abc")).unwrap();
        store.revoke(handle.id());

        assert!(matches!(handle.read(), Err(PreviewError::Revoked(_))));
        assert_eq!(
            handle.read_bytes().unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_capacity_limit() {
        let store = PreviewStore::with_max_handles(1);
        let first = store.acquire(Bytes::from_static(b"a")).unwrap();
        assert!(matches!(
            store.acquire(Bytes::from_static(b"b")),
            Err(PreviewError::CapacityExceeded { max: 1 })
        ));

        drop(first);
        assert!(store.acquire(Bytes::from_static(b"b")).is_ok());
    }
}
