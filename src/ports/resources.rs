use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Addressable reference to binary data held by a `ResourceStore`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Bytes,
    pub mime: String,
}

/// Local registry of revocable handles to fetched assets.
#[cfg_attr(test, mockall::automock)]
pub trait ResourceStore: Send + Sync {
    /// Register binary data and return a handle addressing it.
    fn create(&self, bytes: Bytes, mime: &str) -> ResourceId;

    /// Release a handle. Returns `false` if it was unknown or already revoked.
    fn revoke(&self, id: &ResourceId) -> bool;

    /// Read the data behind a live handle.
    fn get(&self, id: &ResourceId) -> Option<Blob>;
}

/// A handle that is revoked exactly once, when it is dropped.
///
/// Owners never call `revoke` directly: replacing, clearing or dropping the
/// `OwnedHandle` is the release.
pub struct OwnedHandle {
    id: ResourceId,
    store: Arc<dyn ResourceStore>,
}

impl OwnedHandle {
    pub fn create(store: Arc<dyn ResourceStore>, bytes: Bytes, mime: &str) -> Self {
        let id = store.create(bytes, mime);
        Self { id, store }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn blob(&self) -> Option<Blob> {
        self.store.get(&self.id)
    }
}

impl fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnedHandle").field(&self.id).finish()
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.store.revoke(&self.id) {
            tracing::warn!("Resource {} was already released", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_owned_handle_revokes_once_on_drop() {
        let mut store = MockResourceStore::new();
        store
            .expect_create()
            .times(1)
            .returning(|_, _| ResourceId("blob:1".to_string()));
        store
            .expect_revoke()
            .with(eq(ResourceId("blob:1".to_string())))
            .times(1)
            .returning(|_| true);

        let handle = OwnedHandle::create(Arc::new(store), Bytes::from_static(b"mp4"), "video/mp4");
        assert_eq!(handle.id().as_str(), "blob:1");
        drop(handle);
    }
}
