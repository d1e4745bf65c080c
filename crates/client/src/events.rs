//! Events dispatched by the realtime channel to registered listeners.
//!
//! The first four kinds mirror server messages; `Disconnected` and
//! `Reconnected` are produced locally by the connection loop so consumers
//! can react to gaps in the update stream.

use remix_core::channel_events::{
    EVENT_CLOSED, EVENT_CONNECTED, EVENT_DISCONNECTED, EVENT_ERROR, EVENT_JOB_UPDATE, EVENT_JOINED_JOB,
    EVENT_RECONNECTED,
};
use remix_core::job::Job;

use crate::messages::ServerMessage;

/// Kinds of events a listener can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    JobUpdate,
    JoinedJob,
    Error,
    Disconnected,
    Reconnected,
    Closed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Connected => EVENT_CONNECTED,
            EventKind::JobUpdate => EVENT_JOB_UPDATE,
            EventKind::JoinedJob => EVENT_JOINED_JOB,
            EventKind::Error => EVENT_ERROR,
            EventKind::Disconnected => EVENT_DISCONNECTED,
            EventKind::Reconnected => EVENT_RECONNECTED,
            EventKind::Closed => EVENT_CLOSED,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered to channel listeners.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Server handshake acknowledgement.
    Connected { message: String },
    /// Full job snapshot.
    JobUpdate(Job),
    /// A `join_job` subscription was accepted.
    JoinedJob { job_id: String, status: String },
    /// Server-reported fault.
    Error {
        message: String,
        job_id: Option<String>,
    },
    /// The live connection dropped; background reconnection follows.
    Disconnected { reason: String },
    /// The connection came back after a drop. Subscriptions made on the
    /// previous connection are gone.
    Reconnected,
    /// Background reconnection gave up after the retry ceiling. The
    /// channel stays down until `connect()` is called again.
    Closed { attempts: u32 },
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::Connected { .. } => EventKind::Connected,
            ChannelEvent::JobUpdate(_) => EventKind::JobUpdate,
            ChannelEvent::JoinedJob { .. } => EventKind::JoinedJob,
            ChannelEvent::Error { .. } => EventKind::Error,
            ChannelEvent::Disconnected { .. } => EventKind::Disconnected,
            ChannelEvent::Reconnected => EventKind::Reconnected,
            ChannelEvent::Closed { .. } => EventKind::Closed,
        }
    }
}

impl From<ServerMessage> for ChannelEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::Connected(data) => ChannelEvent::Connected {
                message: data.message,
            },
            ServerMessage::JobUpdate(job) => ChannelEvent::JobUpdate(job),
            ServerMessage::JoinedJob(data) => ChannelEvent::JoinedJob {
                job_id: data.job_id,
                status: data.status,
            },
            ServerMessage::Error(data) => ChannelEvent::Error {
                message: data.message,
                job_id: data.job_id,
            },
        }
    }
}
