//! Remix session event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`SessionEvent`]: the state changes a rendering layer subscribes to.

pub mod bus;

pub use bus::{EventBus, SessionEvent};
