//! Client side of the upload flow: the uploader state machine, the
//! backend it talks to and the view it renders as.

pub mod backend;
pub mod machine;
pub mod state;
pub mod view;

use thiserror::Error;

use crate::validation::ValidationErrors;

pub use backend::{HttpBackend, TransferEvent, TransferStream, UploadBackend};
pub use machine::{DropConstraints, DropRejection, Uploader, ACCEPTED_TRANSFER_STATUSES};
pub use state::{LocalFile, Phase, PreviewHandle, PreviewRef, PreviewRegistry, UploadState};
pub use view::{render, View};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Invalid upload request: {0}")]
    Validation(ValidationErrors),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Rejected as automated: {0}")]
    BotSuspected(String),
    #[error("Transfer failed: {0}")]
    TransferFailed(String),
    #[error("Deletion failed: {0}")]
    DeletionFailed(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Not allowed while {0:?}")]
    InvalidPhase(Phase),
    #[error("{0}")]
    Internal(String),
}

impl UploadError {
    /// Text for the user-facing notice.
    pub fn user_message(&self) -> String {
        match self {
            UploadError::RateLimited(msg) | UploadError::BotSuspected(msg) => msg.clone(),
            UploadError::Validation(errors) => format!("Invalid file: {errors}"),
            UploadError::TransferFailed(_) => "Upload failed".to_string(),
            UploadError::Unauthorized => "Please sign in to upload files".to_string(),
            UploadError::DeletionFailed(_) => "Could not delete the file".to_string(),
            UploadError::InvalidPhase(_) | UploadError::Internal(_) => {
                "Something went wrong".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Emitted to the host component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploaderEvent {
    Notice { level: NoticeLevel, message: String },
    /// Progress of the running attempt, never decreasing
    Progress(u8),
    /// The stored key changed; `None` after a deletion
    ValueChanged(Option<String>),
}
