use std::str::FromStr;
use std::time::Duration;

use crate::reconnect::ReconnectConfig;

/// Default service base URL for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Default bytes handed to the transport per upload chunk.
pub const DEFAULT_UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// Connection settings for the remix service.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP base URL, e.g. `https://remix.example.com`.
    pub api_url: String,
    /// Realtime WebSocket endpoint, e.g. `wss://remix.example.com/ws`.
    pub ws_url: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Upper bound on a single WebSocket handshake.
    pub handshake_timeout: Duration,
    /// Retry policy for the realtime connection.
    pub reconnect: ReconnectConfig,
    /// Chunk size used when streaming uploads with progress reporting.
    pub upload_chunk_size: usize,
}

impl ClientConfig {
    /// Build a config for `api_url`, deriving the WebSocket endpoint from it.
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let ws_url = derive_ws_url(&api_url);
        Self {
            api_url,
            ws_url,
            request_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_BYTES,
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                   |
    /// |----------------------------------|---------------------------|
    /// | `REMIX_API_URL`                  | `http://localhost:5000`   |
    /// | `REMIX_WS_URL`                   | derived from the API URL  |
    /// | `REMIX_REQUEST_TIMEOUT_SECS`     | `30`                      |
    /// | `REMIX_HANDSHAKE_TIMEOUT_SECS`   | `5`                       |
    /// | `REMIX_MAX_RECONNECT_ATTEMPTS`   | `5`                       |
    /// | `REMIX_RECONNECT_DELAY_MS`       | `1000`                    |
    /// | `REMIX_UPLOAD_CHUNK_BYTES`       | `65536`                   |
    ///
    /// Unparseable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let api_url = std::env::var("REMIX_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let mut config = Self::new(api_url);

        if let Ok(ws_url) = std::env::var("REMIX_WS_URL") {
            config.ws_url = ws_url;
        }
        config.request_timeout = Duration::from_secs(env_or("REMIX_REQUEST_TIMEOUT_SECS", 30));
        config.handshake_timeout = Duration::from_secs(env_or("REMIX_HANDSHAKE_TIMEOUT_SECS", 5));
        config.reconnect.max_attempts = env_or("REMIX_MAX_RECONNECT_ATTEMPTS", 5u32).max(1);
        config.reconnect.initial_delay =
            Duration::from_millis(env_or("REMIX_RECONNECT_DELAY_MS", 1000));
        config.upload_chunk_size =
            env_or("REMIX_UPLOAD_CHUNK_BYTES", DEFAULT_UPLOAD_CHUNK_BYTES).max(1);

        config
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

/// `http://host` -> `ws://host/ws`, `https://host` -> `wss://host/ws`.
pub fn derive_ws_url(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws_base}/ws")
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
