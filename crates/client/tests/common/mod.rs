//! Shared fixtures: an in-process fake of the remix HTTP service (axum) and
//! of its realtime endpoint (tokio-tungstenite).

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures::{SinkExt, StreamExt};
use remix_client::reconnect::ReconnectConfig;
use remix_client::{ChannelEvent, ClientConfig, RemixApi};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;

/// How long a test waits for something that should happen promptly.
pub const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn spawn_http(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on.
pub async fn closed_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn api_for(base_url: &str) -> RemixApi {
    let mut config = ClientConfig::new(base_url);
    config.request_timeout = Duration::from_secs(5);
    config.upload_chunk_size = 16 * 1024;
    RemixApi::new(&config).unwrap()
}

// ---------------------------------------------------------------------------
// Realtime
// ---------------------------------------------------------------------------

/// Retry policy short enough for tests.
pub fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        multiplier: 2.0,
        max_attempts: 5,
    }
}

#[derive(Debug, Clone)]
enum ServerCommand {
    Send(String),
    DropAll,
}

/// A fake realtime endpoint.
///
/// Every connection receives a `connected` frame, answers `join_job` with
/// `joined_job`, records every text frame it receives, and forwards frames
/// pushed through [`FakeRealtimeServer::push`].
pub struct FakeRealtimeServer {
    pub url: String,
    commands: broadcast::Sender<ServerCommand>,
    received: Mutex<mpsc::UnboundedReceiver<String>>,
    connections: Arc<AtomicUsize>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl FakeRealtimeServer {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (commands, _) = broadcast::channel(64);
        let (received_tx, received) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_commands = commands.clone();
        let accept_connections = Arc::clone(&connections);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let cmd_rx = accept_commands.subscribe();
                accept_connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_connection(stream, cmd_rx, received_tx.clone()));
            }
        });

        Self {
            url: format!("ws://{addr}/ws"),
            commands,
            received: Mutex::new(received),
            connections,
            accept_task,
        }
    }

    /// Stop listening and drop every live connection, so reconnects fail.
    pub fn stop(&self) {
        self.accept_task.abort();
        self.drop_connections();
    }

    /// Send a raw JSON frame to every live connection.
    pub fn push(&self, frame: serde_json::Value) {
        let _ = self.commands.send(ServerCommand::Send(frame.to_string()));
    }

    /// Push a `job_update` frame.
    pub fn push_job_update(&self, job: serde_json::Value) {
        self.push(serde_json::json!({"type": "job_update", "data": job}));
    }

    /// Abruptly drop every live connection without a close frame.
    pub fn drop_connections(&self) {
        let _ = self.commands.send(ServerCommand::DropAll);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next text frame received from any client.
    pub async fn next_received(&self) -> Option<String> {
        let mut received = self.received.lock().await;
        tokio::time::timeout(WAIT, received.recv()).await.ok().flatten()
    }

    /// Text frame received within `wait`, if any.
    pub async fn received_within(&self, wait: Duration) -> Option<String> {
        let mut received = self.received.lock().await;
        tokio::time::timeout(wait, received.recv()).await.ok().flatten()
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    mut commands: broadcast::Receiver<ServerCommand>,
    received: mpsc::UnboundedSender<String>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    let hello = serde_json::json!({"type": "connected", "data": {"message": "Connected to remix server"}});
    if ws.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Ok(ServerCommand::Send(text)) => {
                    if ws.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                Ok(ServerCommand::DropAll) | Err(_) => return,
            },
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let parsed: serde_json::Value =
                        serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
                    let _ = received.send(text);
                    if parsed["type"] == "join_job" {
                        let ack = serde_json::json!({
                            "type": "joined_job",
                            "data": {"job_id": parsed["data"]["job_id"], "status": "joined"}
                        });
                        if ws.send(Message::Text(ack.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Collects channel events into an mpsc queue for assertions.
pub fn event_sink() -> (
    remix_client::Listener,
    mpsc::UnboundedReceiver<ChannelEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: remix_client::Listener = Arc::new(move |event: &ChannelEvent| {
        let _ = tx.send(event.clone());
    });
    (listener, rx)
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("event sink closed")
}
