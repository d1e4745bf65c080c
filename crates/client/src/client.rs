//! WebSocket endpoint for the remix realtime channel.
//!
//! [`WsEndpoint`] holds the connection settings. Call
//! [`WsEndpoint::connect`] to establish a live [`WsConnection`].

use std::time::Duration;

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// Raw WebSocket stream type used by the channel.
pub type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection settings for the realtime endpoint.
#[derive(Debug, Clone)]
pub struct WsEndpoint {
    ws_url: String,
    handshake_timeout: Duration,
}

/// A live WebSocket connection to the realtime endpoint.
pub struct WsConnection {
    /// Unique client ID sent during the WebSocket handshake.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WsStream,
}

impl WsEndpoint {
    /// * `ws_url`            - WebSocket URL, e.g. `ws://host:5000/ws`.
    /// * `handshake_timeout` - upper bound on one connection attempt.
    pub fn new(ws_url: impl Into<String>, handshake_timeout: Duration) -> Self {
        Self {
            ws_url: ws_url.into(),
            handshake_timeout,
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Open one connection.
    ///
    /// Generates a unique `client_id` (UUID v4) and appends it as a query
    /// parameter so server-side logs can be correlated with this client.
    pub async fn connect(&self) -> Result<WsConnection, EndpointError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let separator = if self.ws_url.contains('?') { '&' } else { '?' };
        let url = format!("{}{separator}client_id={client_id}", self.ws_url);

        let (ws_stream, _response) =
            match tokio::time::timeout(self.handshake_timeout, connect_async(&url)).await {
                Ok(Ok(connected)) => connected,
                Ok(Err(e)) => {
                    return Err(EndpointError::Connection(format!(
                        "Failed to connect to {}: {e}",
                        self.ws_url
                    )))
                }
                Err(_) => return Err(EndpointError::Timeout(self.handshake_timeout)),
            };

        tracing::info!(client_id = %client_id, "Connected to realtime channel at {}", self.ws_url);

        Ok(WsConnection {
            client_id,
            ws_stream,
        })
    }
}

/// Errors from a single connection attempt.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The handshake was refused or failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The handshake did not finish in time.
    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = WsEndpoint::new(format!("ws://{addr}/ws"), Duration::from_secs(2));
        let result = endpoint.connect().await;
        assert!(matches!(result, Err(EndpointError::Connection(_))));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // Accepts TCP but never answers the upgrade.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let endpoint = WsEndpoint::new(format!("ws://{addr}/ws"), Duration::from_millis(100));
        let result = endpoint.connect().await;
        assert!(matches!(result, Err(EndpointError::Timeout(_))));
    }
}
