use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use uuid::Uuid;

use crate::issuer::UploadDescriptor;

/// A file picked or dropped by the user, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl LocalFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn descriptor(&self) -> UploadDescriptor {
        UploadDescriptor {
            file_name: self.name.clone(),
            content_type: self.content_type.clone(),
            size_bytes: self.data.len() as i64,
            is_image: self.content_type.starts_with("image/"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Selected,
    Uploading,
    Uploaded,
    Deleting,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewHandle(Uuid);

/// What the uploaded view renders from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewRef {
    /// In-memory copy of a local selection; must be released.
    Local(PreviewHandle),
    /// URL of an object that already lives in storage.
    Remote(String),
}

/// In-memory previews created from local selections.
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<Mutex<HashMap<PreviewHandle, Bytes>>>,
}

impl PreviewRegistry {
    pub fn create(&self, data: Bytes) -> PreviewHandle {
        let handle = PreviewHandle(Uuid::new_v4());
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, data);
        handle
    }

    pub fn release(&self, handle: PreviewHandle) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
            .is_some()
    }

    pub fn get(&self, handle: PreviewHandle) -> Option<Bytes> {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }

    pub fn live_count(&self) -> usize {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// State of one uploader widget.
///
/// `storage_key` is set exactly when `phase` is `Uploaded`, and
/// `progress_percent` only moves forward within one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadState {
    /// Correlation id of the current attempt
    pub id: Option<Uuid>,
    pub file: Option<LocalFile>,
    pub phase: Phase,
    pub progress_percent: u8,
    pub storage_key: Option<String>,
    pub preview: Option<PreviewRef>,
    /// The last deletion attempt failed and the object is still stored
    pub deletion_failed: bool,
}
