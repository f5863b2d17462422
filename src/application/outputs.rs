use crate::ports::resources::{OwnedHandle, ResourceId};
use bytes::Bytes;
use serde::Serialize;

pub const ORIGINAL_MIME: &str = "video/mp4";
pub const DERIVED_MIME: &str = "video/webm";

/// Assets owned by one job record.
///
/// The original result lives until the record is reset or dropped. A derived
/// variant (for instance a trimmed cut) supersedes it for display only.
#[derive(Debug, Default)]
pub struct JobOutputs {
    original: Option<OwnedHandle>,
    derived: Option<OwnedHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Download {
    pub file_name: String,
    pub mime: String,
    #[serde(skip)]
    pub bytes: Bytes,
}

impl JobOutputs {
    pub fn original(&self) -> Option<&ResourceId> {
        self.original.as_ref().map(OwnedHandle::id)
    }

    pub fn derived(&self) -> Option<&ResourceId> {
        self.derived.as_ref().map(OwnedHandle::id)
    }

    /// The handle the UI should show.
    pub fn display(&self) -> Option<&ResourceId> {
        self.derived().or_else(|| self.original())
    }

    pub fn set_original(&mut self, handle: OwnedHandle) {
        debug_assert!(self.original.is_none(), "result handle is set once per success");
        self.original = Some(handle);
    }

    /// Install a derived variant, releasing the previous one first.
    pub fn set_derived(&mut self, handle: OwnedHandle) {
        self.derived.take();
        self.derived = Some(handle);
    }

    /// Drop the derived variant so the original is displayed again.
    pub fn clear_derived(&mut self) -> bool {
        self.derived.take().is_some()
    }

    pub fn clear(&mut self) {
        self.derived.take();
        self.original.take();
    }

    /// The preferred asset to save: the derived variant when present.
    pub fn download(&self, stem: &str) -> Option<Download> {
        if let Some(blob) = self.derived.as_ref().and_then(OwnedHandle::blob) {
            return Some(Download {
                file_name: format!("{}_trimmed.webm", stem),
                mime: blob.mime,
                bytes: blob.bytes,
            });
        }
        let blob = self.original.as_ref().and_then(OwnedHandle::blob)?;
        Some(Download {
            file_name: format!("{}.mp4", stem),
            mime: blob.mime,
            bytes: blob.bytes,
        })
    }
}
