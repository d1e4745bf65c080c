//! Domain types shared by the remix client crates.
//!
//! Holds the wire shapes returned by the remix service, the session-level
//! [`job::JobSnapshot`] published to the UI, the step normalisation used for
//! de-duplicating progress messages, and the realtime event names.

pub mod channel_events;
pub mod error;
pub mod job;
pub mod steps;
pub mod types;
