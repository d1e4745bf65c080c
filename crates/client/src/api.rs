//! REST API client for the remix service HTTP endpoints.
//!
//! Wraps health, upload, process-start, status, and result download using
//! [`reqwest`]. Nothing here retries; a failed call is reported once and the
//! caller decides what to do next.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use remix_core::job::{Job, ProcessResponse, UploadProgress, UploadResponse};
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::upload::AudioFile;

/// Receives upload progress notifications.
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The HTTP operation an [`ApiError`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOperation {
    Upload,
    Process,
    Status,
    Download,
}

impl ApiOperation {
    /// Message used when the service gives no usable error text.
    pub fn fallback_message(self) -> &'static str {
        match self {
            ApiOperation::Upload => "Upload failed",
            ApiOperation::Process => "Processing failed",
            ApiOperation::Status => "Failed to get status",
            ApiOperation::Download => "Download failed",
        }
    }
}

impl std::fmt::Display for ApiOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ApiOperation::Upload => "upload",
            ApiOperation::Process => "process",
            ApiOperation::Status => "status",
            ApiOperation::Download => "download",
        })
    }
}

/// Errors from the remix REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No response: connection refused, DNS, TLS, timeout.
    #[error("Network error during {operation}: {source}")]
    Network {
        operation: ApiOperation,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx status with an `{"error": "..."}` body.
    #[error("{message} (HTTP {status})")]
    Server {
        operation: ApiOperation,
        status: u16,
        message: String,
    },

    /// Non-2xx status whose body carried no usable error text.
    #[error("{message} (HTTP {status})")]
    Decode {
        operation: ApiOperation,
        status: u16,
        message: String,
    },

    /// 2xx status but the body did not match the expected shape.
    #[error("Invalid {operation} response: {source}")]
    InvalidBody {
        operation: ApiOperation,
        #[source]
        source: reqwest::Error,
    },

    /// The request could not be assembled locally.
    #[error("Failed to build {operation} request: {source}")]
    InvalidRequest {
        operation: ApiOperation,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    pub fn operation(&self) -> ApiOperation {
        match self {
            ApiError::Network { operation, .. }
            | ApiError::Server { operation, .. }
            | ApiError::Decode { operation, .. }
            | ApiError::InvalidBody { operation, .. }
            | ApiError::InvalidRequest { operation, .. } => *operation,
        }
    }

    /// HTTP status, when the service answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } | ApiError::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short text suitable for a status entry in the UI.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Server { message, .. } | ApiError::Decode { message, .. } => message.clone(),
            ApiError::Network { operation, .. } => format!("Network error during {operation}"),
            other => other.operation().fallback_message().to_string(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network { .. })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Request/response operations against the remix service.
///
/// [`RemixApi`] is the production implementation; the session takes an
/// `Arc<dyn AudioApi>` so tests can substitute a fake.
#[async_trait]
pub trait AudioApi: Send + Sync {
    /// `true` only when the service answers `{"status": "healthy"}`.
    async fn health_check(&self) -> bool;

    async fn upload_audio(&self, file: &AudioFile) -> Result<UploadResponse, ApiError>;

    /// Like [`upload_audio`](Self::upload_audio), reporting progress while
    /// the body is sent.
    async fn upload_with_progress(
        &self,
        file: &AudioFile,
        on_progress: ProgressCallback,
    ) -> Result<UploadResponse, ApiError>;

    async fn process_audio(&self, file_id: &str, prompt: &str)
        -> Result<ProcessResponse, ApiError>;

    async fn get_job_status(&self, job_id: &str) -> Result<Job, ApiError>;

    async fn download_result(&self, job_id: &str) -> Result<Bytes, ApiError>;

    /// URL of the finished result for `job_id`.
    fn download_url(&self, job_id: &str) -> String;

    /// Streaming URL for a result file name.
    fn audio_url(&self, filename: &str) -> String;
}

// ---------------------------------------------------------------------------
// RemixApi
// ---------------------------------------------------------------------------

/// HTTP client for a single remix service.
pub struct RemixApi {
    client: reqwest::Client,
    api_url: String,
    upload_chunk_size: usize,
}

impl RemixApi {
    /// Create an API client from the shared config.
    pub fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            upload_chunk_size: config.upload_chunk_size,
        }
    }

    async fn post_upload(
        &self,
        part: reqwest::multipart::Part,
    ) -> Result<UploadResponse, ApiError> {
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(format!("{}/api/upload-audio", self.api_url))
            .multipart(form)
            .send()
            .await
            .map_err(|source| ApiError::Network {
                operation: ApiOperation::Upload,
                source,
            })?;

        let uploaded: UploadResponse = Self::parse_response(response, ApiOperation::Upload).await?;
        tracing::info!(
            file_id = %uploaded.file_id,
            file_size = uploaded.file_size,
            "Audio uploaded",
        );
        Ok(uploaded)
    }

    async fn get(&self, url: String, operation: ApiOperation) -> Result<reqwest::Response, ApiError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ApiError::Network { operation, source })?;
        Self::ensure_success(response, operation).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. On failure the body
    /// is decoded as `{"error": "..."}`, falling back to a generic message.
    async fn ensure_success(
        response: reqwest::Response,
        operation: ApiOperation,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let server_message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .filter(|m| !m.trim().is_empty());

        tracing::warn!(
            %operation,
            status = status.as_u16(),
            "Remix service rejected request",
        );

        Err(match server_message {
            Some(message) => ApiError::Server {
                operation,
                status: status.as_u16(),
                message,
            },
            None => ApiError::Decode {
                operation,
                status: status.as_u16(),
                message: operation.fallback_message().to_string(),
            },
        })
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        operation: ApiOperation,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response, operation).await?;
        response
            .json::<T>()
            .await
            .map_err(|source| ApiError::InvalidBody { operation, source })
    }
}

#[async_trait]
impl AudioApi for RemixApi {
    async fn health_check(&self) -> bool {
        let response = match self.client.get(format!("{}/health", self.api_url)).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Health check failed");
                return false;
            }
        };

        match response.json::<HealthResponse>().await {
            Ok(health) if health.status == "healthy" => true,
            Ok(health) => {
                tracing::warn!(status = %health.status, "Remix service reports unhealthy");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Health check returned an unexpected body");
                false
            }
        }
    }

    async fn upload_audio(&self, file: &AudioFile) -> Result<UploadResponse, ApiError> {
        let part = file.to_part().map_err(|source| ApiError::InvalidRequest {
            operation: ApiOperation::Upload,
            source,
        })?;
        self.post_upload(part).await
    }

    async fn upload_with_progress(
        &self,
        file: &AudioFile,
        on_progress: ProgressCallback,
    ) -> Result<UploadResponse, ApiError> {
        let part = file
            .to_progress_part(self.upload_chunk_size, on_progress)
            .map_err(|source| ApiError::InvalidRequest {
                operation: ApiOperation::Upload,
                source,
            })?;
        self.post_upload(part).await
    }

    async fn process_audio(
        &self,
        file_id: &str,
        prompt: &str,
    ) -> Result<ProcessResponse, ApiError> {
        let body = serde_json::json!({
            "file_id": file_id,
            "prompt": prompt,
        });

        let response = self
            .client
            .post(format!("{}/api/process-audio", self.api_url))
            .json(&body)
            .send()
            .await
            .map_err(|source| ApiError::Network {
                operation: ApiOperation::Process,
                source,
            })?;

        let started: ProcessResponse = Self::parse_response(response, ApiOperation::Process).await?;
        tracing::info!(job_id = %started.job_id, file_id, "Processing job started");
        Ok(started)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<Job, ApiError> {
        let url = format!("{}/api/status/{}", self.api_url, urlencoding::encode(job_id));
        let response = self.get(url, ApiOperation::Status).await?;
        response
            .json::<Job>()
            .await
            .map_err(|source| ApiError::InvalidBody {
                operation: ApiOperation::Status,
                source,
            })
    }

    async fn download_result(&self, job_id: &str) -> Result<Bytes, ApiError> {
        let response = self.get(self.download_url(job_id), ApiOperation::Download).await?;
        response
            .bytes()
            .await
            .map_err(|source| ApiError::InvalidBody {
                operation: ApiOperation::Download,
                source,
            })
    }

    fn download_url(&self, job_id: &str) -> String {
        format!("{}/api/result/{}", self.api_url, urlencoding::encode(job_id))
    }

    fn audio_url(&self, filename: &str) -> String {
        format!("{}/api/audio/{}", self.api_url, urlencoding::encode(filename))
    }
}
