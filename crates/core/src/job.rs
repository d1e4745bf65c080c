//! Job lifecycle types.
//!
//! [`Job`] is the snapshot the service returns from `/api/status/{job_id}`
//! and pushes over the realtime channel. [`JobSnapshot`] is the session's
//! view of the same job, enriched with the accumulated step log and the
//! result URLs.

use serde::{Deserialize, Serialize};

use crate::types::{FileId, JobId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle phase of a processing job.
///
/// Expected order is `starting -> analyzing -> processing -> applying ->
/// completed`, with `error` reachable from any non-terminal phase. The server
/// may skip or repeat intermediate phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Starting,
    Analyzing,
    Processing,
    Applying,
    Completed,
    Error,
    /// Any phase tag this client does not know about.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// `completed` and `error` end the job; nothing after them is trusted.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Starting => "starting",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Processing => "processing",
            JobStatus::Applying => "applying",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Full job snapshot as reported by the service.
///
/// Realtime updates frequently omit the immutable fields, so everything
/// except `job_id` and `status` has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub status: JobStatus,
    /// 0-100. Not guaranteed monotonic by the server.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub file_id: FileId,
    #[serde(default)]
    pub prompt: String,
    /// Server creation time in epoch seconds.
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<f64>,
}

/// Response of `POST /api/upload-audio`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: FileId,
    pub original_filename: String,
    pub file_size: u64,
    pub message: String,
}

/// Response of `POST /api/process-audio`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
}

/// One upload progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: u64,
    pub percentage: u8,
}

impl UploadProgress {
    /// Build a progress value, or `None` when the total length is unknown.
    ///
    /// `percentage` is `round(loaded / total * 100)`, capped at 100.
    pub fn new(loaded: u64, total: u64) -> Option<Self> {
        if total == 0 {
            return None;
        }
        let percentage = ((loaded as f64 / total as f64) * 100.0).round().min(100.0) as u8;
        Some(Self {
            loaded,
            total,
            percentage,
        })
    }
}

// ---------------------------------------------------------------------------
// Session view
// ---------------------------------------------------------------------------

/// A tracked job as exposed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub file_id: FileId,
    pub prompt: String,
    pub status: JobStatus,
    pub progress: f64,
    /// Latest message from the server, verbatim.
    pub message: String,
    /// Distinct normalised messages in arrival order.
    pub steps: Vec<String>,
    pub result_file: Option<String>,
    /// Set only once the job has completed.
    pub download_url: Option<String>,
    /// Set only once the job has completed.
    pub stream_url: Option<String>,
    /// Set only when the job ended in `error`.
    pub error: Option<String>,
    pub created_at: Option<f64>,
    pub elapsed_time: Option<f64>,
    /// When the last update was merged locally.
    pub updated_at: Timestamp,
    /// `false` forever once a terminal status has been observed.
    pub in_progress: bool,
}

impl JobSnapshot {
    /// Seed a snapshot from a successful process-start response.
    pub fn seeded(
        job_id: impl Into<JobId>,
        file_id: impl Into<FileId>,
        prompt: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            file_id: file_id.into(),
            prompt: prompt.into(),
            status: JobStatus::Starting,
            progress: 0.0,
            message: message.into(),
            steps: Vec::new(),
            result_file: None,
            download_url: None,
            stream_url: None,
            error: None,
            created_at: None,
            elapsed_time: None,
            updated_at: chrono::Utc::now(),
            in_progress: true,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
