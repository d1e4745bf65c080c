//! Remix service client library.
//!
//! Provides the HTTP transport ([`api::RemixApi`]), the reconnecting
//! realtime channel ([`channel::WsChannel`]), typed wire messages, the
//! listener registry used to fan out channel events, and the shared
//! [`config::ClientConfig`].

pub mod api;
pub mod channel;
pub mod client;
pub mod config;
pub mod events;
pub mod messages;
pub mod processor;
pub mod reconnect;
pub mod registry;
pub mod upload;

pub use api::{ApiError, ApiOperation, AudioApi, ProgressCallback, RemixApi};
pub use channel::{ChannelError, RealtimeChannel, WsChannel};
pub use config::ClientConfig;
pub use events::{ChannelEvent, EventKind};
pub use registry::{Listener, ListenerId, ListenerRegistry};
pub use upload::AudioFile;
