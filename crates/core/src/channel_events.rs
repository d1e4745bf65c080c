//! Realtime channel event names.
//!
//! Every frame on the realtime connection is a JSON object of the shape
//! `{"type": "<name>", "data": {...}}`; these constants are the `type`
//! values.

/// Server handshake acknowledgement.
pub const EVENT_CONNECTED: &str = "connected";

/// Full job snapshot pushed by the server.
pub const EVENT_JOB_UPDATE: &str = "job_update";

/// Acknowledgement that a `join_job` subscription succeeded.
pub const EVENT_JOINED_JOB: &str = "joined_job";

/// Server-reported fault, not necessarily job-scoped.
pub const EVENT_ERROR: &str = "error";

/// Local: the underlying connection dropped.
pub const EVENT_DISCONNECTED: &str = "disconnected";

/// Local: the connection was re-established after a drop.
pub const EVENT_RECONNECTED: &str = "reconnected";

/// Local: reconnection gave up; no further events will arrive.
pub const EVENT_CLOSED: &str = "closed";
