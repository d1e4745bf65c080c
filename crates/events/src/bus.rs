//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub between the job session and
//! whatever renders it. It is designed to be shared via `Arc<EventBus>`.
//! Dropping a receiver unsubscribes it.

use remix_core::job::{JobSnapshot, UploadProgress, UploadResponse};
use remix_core::types::JobId;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// A state change the rendering layer may want to show.
///
/// Upload and submission failures are separate variants from job failures
/// (which arrive as a [`SessionEvent::JobUpdated`] with status `error`) so
/// each can be shown as its own dismissible entry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Result of the most recent health check.
    ServiceStatus { available: bool },

    /// The realtime channel dropped or came back.
    ChannelStatus { connected: bool },

    /// Bytes of the current upload have been handed to the transport.
    UploadProgress(UploadProgress),

    /// The service accepted an upload.
    UploadCompleted(UploadResponse),

    /// The upload was rejected or never reached the service.
    UploadFailed { message: String },

    /// `process-audio` was rejected; no job was created.
    SubmissionFailed { message: String },

    /// A tracked job changed. Published once per merged update.
    JobUpdated(JobSnapshot),

    /// A server-reported fault on the realtime channel.
    ServerError {
        message: String,
        job_id: Option<JobId>,
    },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use remix_events::bus::{EventBus, SessionEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(SessionEvent::ServiceStatus { available: true });
/// ```
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Session event published with no subscribers");
        }
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Number of live receivers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
