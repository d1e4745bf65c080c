//! Local audio file handle and multipart body construction.

use std::path::Path;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use remix_core::job::UploadProgress;
use reqwest::multipart::Part;

use crate::api::ProgressCallback;

/// An audio file selected for upload, held in memory.
#[derive(Debug, Clone)]
pub struct AudioFile {
    name: String,
    content: Bytes,
}

impl AudioFile {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a file from disk, using its file name as the upload name.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        Ok(Self::new(name, content))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// MIME type guessed from the file extension.
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .to_string()
    }

    /// Multipart part carrying the whole file in one piece.
    pub(crate) fn to_part(&self) -> Result<Part, reqwest::Error> {
        Part::bytes(self.content.to_vec())
            .file_name(self.name.clone())
            .mime_str(&self.mime_type())
    }

    /// Multipart part that streams the file in `chunk_size` pieces and
    /// reports progress as each piece is handed to the transport.
    pub(crate) fn to_progress_part(
        &self,
        chunk_size: usize,
        on_progress: ProgressCallback,
    ) -> Result<Part, reqwest::Error> {
        let stream = progress_stream(self.content.clone(), chunk_size, on_progress);
        Part::stream_with_length(reqwest::Body::wrap_stream(stream), self.size())
            .file_name(self.name.clone())
            .mime_str(&self.mime_type())
    }
}

/// Split `content` into chunks, invoking `on_progress` with the cumulative
/// byte count as each chunk is yielded.
///
/// `loaded` is strictly increasing and the final call reports the full
/// length. Empty content yields no chunks and no callbacks.
pub fn progress_stream(
    content: Bytes,
    chunk_size: usize,
    on_progress: ProgressCallback,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let total = content.len() as u64;
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<Bytes> = (0..content.len())
        .step_by(chunk_size)
        .map(|start| content.slice(start..(start + chunk_size).min(content.len())))
        .collect();

    let mut loaded = 0u64;
    futures::stream::iter(chunks).map(move |chunk| {
        loaded += chunk.len() as u64;
        if let Some(progress) = UploadProgress::new(loaded, total) {
            on_progress(progress);
        }
        Ok(chunk)
    })
}
