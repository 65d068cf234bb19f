use super::state::{Phase, PreviewRef, UploadState};

/// The four views the uploader can show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Empty,
    Uploading {
        progress: u8,
        file_name: String,
    },
    Error,
    Uploaded {
        preview: Option<PreviewRef>,
        deleting: bool,
        deletion_failed: bool,
    },
}

/// Map state to the view it renders as. Selected renders as an upload
/// at zero progress, since uploading follows immediately.
pub fn render(state: &UploadState) -> View {
    match state.phase {
        Phase::Idle => View::Empty,
        Phase::Selected | Phase::Uploading => View::Uploading {
            progress: state.progress_percent,
            file_name: state
                .file
                .as_ref()
                .map(|f| f.name.clone())
                .unwrap_or_default(),
        },
        Phase::Error => View::Error,
        Phase::Uploaded | Phase::Deleting => View::Uploaded {
            preview: state.preview.clone(),
            deleting: state.phase == Phase::Deleting,
            deletion_failed: state.deletion_failed,
        },
    }
}
