//! The uploader widget's state machine.
//!
//! ```text
//! Idle --drop--> Selected --upload--> Uploading --2xx--> Uploaded --delete--> Deleting --> Idle
//!                                         |                  ^                    |
//!                                         +--fail--> Error   +------- fail -------+
//! ```
//!
//! `Error` keeps the selected file so `retry` can start a fresh attempt.

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::backend::{TransferEvent, UploadBackend};
use super::state::{LocalFile, Phase, PreviewRef, PreviewRegistry, UploadState};
use super::{NoticeLevel, UploadError, UploaderEvent};
use crate::deletion::DeleteOutcome;

/// Storage responses that count as a completed transfer.
pub const ACCEPTED_TRANSFER_STATUSES: [u16; 2] = [200, 204];

const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// What a drop is checked against before anything is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropConstraints {
    pub max_files: usize,
    pub max_size: u64,
    /// A MIME type, or a family such as `image/*`
    pub accept: String,
}

impl Default for DropConstraints {
    fn default() -> Self {
        Self {
            max_files: 1,
            max_size: MAX_FILE_SIZE,
            accept: "image/*".to_string(),
        }
    }
}

impl DropConstraints {
    pub fn accepts(&self, content_type: &str) -> bool {
        let accept = self.accept.trim();
        if accept.is_empty() || accept == "*/*" {
            return true;
        }
        match accept.strip_suffix('*') {
            Some(family) => content_type
                .to_ascii_lowercase()
                .starts_with(&family.to_ascii_lowercase()),
            None => content_type.eq_ignore_ascii_case(accept),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DropRejection {
    #[error("Drop is disabled while a file is uploading or uploaded")]
    Disabled,
    #[error("No file was dropped")]
    Empty,
    #[error("Error too many files, only one file is allowed.")]
    TooManyFiles,
    #[error("File size too large")]
    FileTooLarge,
    #[error("File type is not accepted")]
    InvalidType,
}

/// Drives one file through selection, transfer and deletion.
///
/// State changes only through these methods. Hosts observe them through
/// [`Uploader::state`] and the event channel.
pub struct Uploader<B> {
    backend: B,
    constraints: DropConstraints,
    events: mpsc::UnboundedSender<UploaderEvent>,
    previews: PreviewRegistry,
    state: UploadState,
}

impl<B> Uploader<B> {
    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Share a preview registry with the host instead of owning a private one.
    pub fn with_previews(mut self, previews: PreviewRegistry) -> Self {
        self.release_preview();
        self.previews = previews;
        self
    }

    pub fn is_drop_disabled(&self) -> bool {
        matches!(
            self.state.phase,
            Phase::Uploading | Phase::Uploaded | Phase::Deleting
        )
    }

    fn release_preview(&mut self) {
        if let Some(PreviewRef::Local(handle)) = self.state.preview.take() {
            self.previews.release(handle);
        }
    }

    fn emit(&self, event: UploaderEvent) {
        // The host may have stopped listening
        let _ = self.events.send(event);
    }

    fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        self.emit(UploaderEvent::Notice {
            level,
            message: message.into(),
        });
    }
}

impl<B> Drop for Uploader<B> {
    fn drop(&mut self) {
        self.release_preview();
    }
}

impl<B: UploadBackend> Uploader<B> {
    pub fn new(
        backend: B,
        constraints: DropConstraints,
        events: mpsc::UnboundedSender<UploaderEvent>,
    ) -> Self {
        Self {
            backend,
            constraints,
            events,
            previews: PreviewRegistry::default(),
            state: UploadState::default(),
        }
    }

    /// Start from an object that is already stored, e.g. when editing a
    /// saved course. An empty key starts idle.
    pub fn with_value(
        backend: B,
        constraints: DropConstraints,
        events: mpsc::UnboundedSender<UploaderEvent>,
        storage_key: &str,
    ) -> Self {
        let mut uploader = Self::new(backend, constraints, events);
        let key = storage_key.trim();
        if !key.is_empty() {
            uploader.state = UploadState {
                phase: Phase::Uploaded,
                progress_percent: 100,
                preview: Some(PreviewRef::Remote(uploader.backend.preview_url(key))),
                storage_key: Some(key.to_string()),
                ..UploadState::default()
            };
        }
        uploader
    }

    /// Accept a drop of candidate files. On success exactly one file is
    /// selected and the previous selection (and its preview) is discarded.
    pub fn select(&mut self, files: Vec<LocalFile>) -> Result<(), DropRejection> {
        if self.is_drop_disabled() {
            return Err(DropRejection::Disabled);
        }

        let rejection = if files.len() > self.constraints.max_files {
            Some(DropRejection::TooManyFiles)
        } else if files.iter().any(|f| f.size() > self.constraints.max_size) {
            Some(DropRejection::FileTooLarge)
        } else if files
            .iter()
            .any(|f| !self.constraints.accepts(&f.content_type))
        {
            Some(DropRejection::InvalidType)
        } else {
            None
        };
        if let Some(rejection) = rejection {
            self.notify(NoticeLevel::Error, rejection.to_string());
            return Err(rejection);
        }

        let Some(file) = files.into_iter().next() else {
            return Err(DropRejection::Empty);
        };

        self.release_preview();
        let preview = self.previews.create(file.data.clone());
        self.state = UploadState {
            id: Some(Uuid::new_v4()),
            file: Some(file),
            phase: Phase::Selected,
            preview: Some(PreviewRef::Local(preview)),
            ..UploadState::default()
        };
        Ok(())
    }

    /// Select the dropped files and upload the selection. Failures end up in
    /// the state and as notices; the resulting phase is returned.
    pub async fn on_drop(&mut self, files: Vec<LocalFile>) -> Phase {
        if self.select(files).is_ok() {
            let _ = self.upload().await;
        }
        self.state.phase
    }

    /// Request a grant for the selected file and transfer it.
    /// Returns the storage key once the object is stored.
    pub async fn upload(&mut self) -> Result<String, UploadError> {
        let file = match (self.state.phase, &self.state.file) {
            (Phase::Selected | Phase::Error, Some(file)) => file.clone(),
            (phase, _) => return Err(UploadError::InvalidPhase(phase)),
        };

        let attempt = Uuid::new_v4();
        self.state.id = Some(attempt);
        self.state.phase = Phase::Uploading;
        self.state.progress_percent = 0;
        self.state.storage_key = None;
        tracing::debug!(attempt = %attempt, file_name = %file.name, "Starting upload");

        let result = self.run_attempt(attempt, &file).await;
        match &result {
            Ok(key) => {
                self.state.phase = Phase::Uploaded;
                self.state.progress_percent = 100;
                self.state.storage_key = Some(key.clone());
                self.emit(UploaderEvent::ValueChanged(Some(key.clone())));
                self.notify(NoticeLevel::Success, "File uploaded successfully");
            }
            Err(e) => {
                tracing::warn!(attempt = %attempt, error = %e, "Upload failed");
                self.state.phase = Phase::Error;
                self.state.progress_percent = 0;
                self.state.storage_key = None;
                self.notify(NoticeLevel::Error, e.user_message());
            }
        }
        result
    }

    /// Start a new attempt with the file kept from the failed one.
    pub async fn retry(&mut self) -> Result<String, UploadError> {
        if self.state.phase != Phase::Error {
            return Err(UploadError::InvalidPhase(self.state.phase));
        }
        self.upload().await
    }

    /// Record transfer progress for `attempt`. Reports for any other attempt
    /// are ignored, as are reports that would move progress backwards.
    pub fn apply_progress(&mut self, attempt: Uuid, percent: u8) -> bool {
        if self.state.phase != Phase::Uploading || self.state.id != Some(attempt) {
            return false;
        }
        self.state.progress_percent = self.state.progress_percent.max(percent.min(100));
        self.emit(UploaderEvent::Progress(self.state.progress_percent));
        true
    }

    /// Remove the stored object. From `Idle` there is nothing to remove and
    /// `NotFound` is reported without touching the network.
    pub async fn delete(&mut self) -> Result<DeleteOutcome, UploadError> {
        match self.state.phase {
            Phase::Idle => return Ok(DeleteOutcome::NotFound),
            Phase::Uploaded => {}
            phase => return Err(UploadError::InvalidPhase(phase)),
        }
        let Some(key) = self.state.storage_key.take() else {
            return Err(UploadError::Internal(
                "uploaded file has no storage key".to_string(),
            ));
        };

        self.state.phase = Phase::Deleting;
        self.state.deletion_failed = false;

        match self.backend.delete_object(&key).await {
            Ok(outcome) => {
                tracing::debug!(storage_key = %key, ?outcome, "Deleted upload");
                self.release_preview();
                self.state = UploadState::default();
                self.emit(UploaderEvent::ValueChanged(None));
                self.notify(NoticeLevel::Success, "File deleted");
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(storage_key = %key, error = %e, "Deletion failed");
                self.state.storage_key = Some(key);
                self.state.phase = Phase::Uploaded;
                self.state.deletion_failed = true;
                self.notify(NoticeLevel::Error, "Could not delete the file");
                Err(match e {
                    UploadError::DeletionFailed(_) | UploadError::Unauthorized => e,
                    other => UploadError::DeletionFailed(other.to_string()),
                })
            }
        }
    }

    async fn run_attempt(
        &mut self,
        attempt: Uuid,
        file: &LocalFile,
    ) -> Result<String, UploadError> {
        let grant = self.backend.request_grant(&file.descriptor()).await?;

        let mut transfer = self.backend.transfer(&grant, file);
        while let Some(event) = transfer.next().await {
            match event {
                TransferEvent::Progress(percent) => {
                    self.apply_progress(attempt, percent);
                }
                TransferEvent::Completed { status }
                    if ACCEPTED_TRANSFER_STATUSES.contains(&status) =>
                {
                    return Ok(grant.storage_key);
                }
                TransferEvent::Completed { status } => {
                    return Err(UploadError::TransferFailed(format!(
                        "storage responded with status {status}"
                    )));
                }
                TransferEvent::Failed(reason) => return Err(UploadError::TransferFailed(reason)),
            }
        }
        Err(UploadError::TransferFailed(
            "transfer ended without a response".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_families_and_exact_types() {
        let images = DropConstraints::default();
        assert!(images.accepts("image/png"));
        assert!(images.accepts("IMAGE/JPEG"));
        assert!(!images.accepts("application/pdf"));

        let pdf = DropConstraints {
            accept: "application/pdf".to_string(),
            ..Default::default()
        };
        assert!(pdf.accepts("application/pdf"));
        assert!(!pdf.accepts("image/png"));

        let any = DropConstraints {
            accept: "*/*".to_string(),
            ..Default::default()
        };
        assert!(any.accepts("video/mp4"));
    }
}
