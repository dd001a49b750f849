use thiserror::Error;

use super::model::JobState;
use crate::infrastructure::storage::StorageError;
use crate::infrastructure::transcode::TranscodeError;

/// Why a job ended in `Failed`. Each variant belongs to exactly one stage.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job: {0}")]
    Validation(String),

    #[error("download failed: {0}")]
    Download(#[source] StorageError),

    #[error("convert failed: {0}")]
    Convert(#[source] TranscodeError),

    #[error("upload failed: {0}")]
    Upload(#[source] StorageError),

    #[error("making processed video public failed: {0}")]
    Visibility(#[source] StorageError),
}

impl JobError {
    pub fn stage(&self) -> JobState {
        match self {
            JobError::Validation(_) => JobState::Received,
            JobError::Download(_) => JobState::Downloading,
            JobError::Convert(_) => JobState::Converting,
            JobError::Upload(_) | JobError::Visibility(_) => JobState::Uploading,
        }
    }

    /// Whether the caller sent a bad request, as opposed to the pipeline
    /// failing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, JobError::Validation(_))
    }
}

/// Problems decoding a push request into a storage notification.
#[derive(Debug, Error)]
pub enum IngressError {
    #[error("unreadable request body: {0}")]
    Body(String),

    #[error("message data is not base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("message data is not a notification: {0}")]
    Json(#[from] serde_json::Error),

    #[error("notification failed validation: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
