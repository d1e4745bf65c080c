use remix_client::{ApiError, ChannelError};
use remix_core::error::CoreError;
use remix_core::types::JobId;

/// Errors surfaced by [`JobSession`](crate::JobSession) operations.
///
/// Upload and submission failures are separate variants so callers can
/// show them as distinct entries; neither ever creates a tracked job.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A local precondition or validation failed. No request was sent.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Upload failed: {0}")]
    Upload(#[source] ApiError),

    /// `process-audio` was rejected or unreachable.
    #[error("Submission failed: {0}")]
    Submission(#[source] ApiError),

    #[error("Status refresh failed: {0}")]
    Status(#[source] ApiError),

    #[error("Download failed: {0}")]
    Download(#[source] ApiError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The service reported the job as failed.
    #[error("Job {job_id} failed: {message}")]
    Processing { job_id: JobId, message: String },

    #[error("Unknown job: {0}")]
    UnknownJob(JobId),
}

impl SessionError {
    /// Short text suitable for a dismissible status entry.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Upload(e)
            | SessionError::Submission(e)
            | SessionError::Status(e)
            | SessionError::Download(e) => e.user_message(),
            SessionError::Processing { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// `true` when the failure was detected locally, before any request.
    pub fn is_local(&self) -> bool {
        matches!(self, SessionError::Core(_) | SessionError::UnknownJob(_))
    }
}
