//! In-memory blob registry, the local counterpart of object URLs.

use crate::ports::resources::{Blob, ResourceId, ResourceStore};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub created: usize,
    pub revoked: usize,
    pub live: usize,
    /// Revocations of unknown or already released handles.
    pub rejected: usize,
}

#[derive(Debug, Default)]
struct Inner {
    blobs: HashMap<ResourceId, Blob>,
    created: usize,
    revoked: usize,
    rejected: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock();
        StoreStats {
            created: inner.created,
            revoked: inner.revoked,
            live: inner.blobs.len(),
            rejected: inner.rejected,
        }
    }
}

impl ResourceStore for MemoryStore {
    fn create(&self, bytes: Bytes, mime: &str) -> ResourceId {
        let id = ResourceId(format!("blob:{}", Uuid::new_v4()));
        let mut inner = self.inner.lock();
        debug!("Created {} ({} bytes, {})", id, bytes.len(), mime);
        inner.blobs.insert(
            id.clone(),
            Blob {
                bytes,
                mime: mime.to_string(),
            },
        );
        inner.created += 1;
        id
    }

    fn revoke(&self, id: &ResourceId) -> bool {
        let mut inner = self.inner.lock();
        if inner.blobs.remove(id).is_some() {
            inner.revoked += 1;
            debug!("Revoked {}", id);
            true
        } else {
            inner.rejected += 1;
            warn!("Revoke of unknown resource {}", id);
            false
        }
    }

    fn get(&self, id: &ResourceId) -> Option<Blob> {
        self.inner.lock().blobs.get(id).cloned()
    }
}
