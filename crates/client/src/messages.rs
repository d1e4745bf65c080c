//! Realtime channel message types and parser.
//!
//! The service sends JSON text frames with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes them into
//! a strongly-typed [`ServerMessage`] enum and serializes the one message
//! the client sends, [`ClientMessage::JoinJob`].

use remix_core::job::Job;
use serde::{Deserialize, Serialize};

/// All known server-to-client messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// Handshake acknowledgement.
    #[serde(rename = "connected")]
    Connected(ConnectedData),

    /// Full job snapshot for a joined job.
    #[serde(rename = "job_update")]
    JobUpdate(Job),

    /// A `join_job` subscription was accepted.
    #[serde(rename = "joined_job")]
    JoinedJob(JoinedJobData),

    /// Server-side fault.
    #[serde(rename = "error")]
    Error(ErrorData),
}

/// Payload for `connected` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectedData {
    #[serde(default)]
    pub message: String,
}

/// Payload for `joined_job` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinedJobData {
    pub job_id: String,
    #[serde(default)]
    pub status: String,
}

/// Payload for `error` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub message: String,
    /// Present when the fault concerns one job.
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Client-to-server messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// Subscribe to one job's update stream.
    #[serde(rename = "join_job")]
    JoinJob { job_id: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Parse a realtime text frame into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values.
/// Callers should log unknown types and continue.
pub fn parse_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}
