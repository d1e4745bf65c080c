//! Job session orchestration.
//!
//! [`JobSession`] binds the HTTP transport and the realtime channel into one
//! per-job status stream: upload, start processing, subscribe, merge pushed
//! updates, and republish a [`JobSnapshot`](remix_core::job::JobSnapshot)
//! on the [`EventBus`](remix_events::EventBus) after every merge.

pub mod error;
pub mod orchestrator;
pub mod tracker;

pub use error::SessionError;
pub use orchestrator::{JobSession, UploadedFile, DEFAULT_POLL_INTERVAL};
pub use tracker::{JobTracker, ResultLinks};
