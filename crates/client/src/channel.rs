//! Reconnecting realtime channel.
//!
//! [`WsChannel`] owns at most one WebSocket connection to the remix
//! service. `connect()` retries with backoff up to the configured attempt
//! ceiling; once connected, a background task reads frames, dispatches
//! them to the [`ListenerRegistry`], writes queued subscribe requests, and
//! transparently reconnects if the connection drops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::{WsConnection, WsEndpoint};
use crate::config::ClientConfig;
use crate::events::{ChannelEvent, EventKind};
use crate::messages::ClientMessage;
use crate::processor::{process_frames, SessionEnd};
use crate::reconnect::{next_delay, reconnect_loop, ReconnectConfig};
use crate::registry::{Listener, ListenerId, ListenerRegistry};

/// How long `disconnect()` waits for the connection task to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Errors surfaced by [`RealtimeChannel::connect`].
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Every handshake attempt up to the retry ceiling failed.
    #[error("Failed to connect to realtime channel after {attempts} attempts: {last_error}")]
    Connection { attempts: u32, last_error: String },
}

/// A push connection multiplexed by job id.
///
/// The session holds an `Arc<dyn RealtimeChannel>` so tests can substitute
/// an in-memory fake.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Connect, or return immediately if already connected.
    async fn connect(&self) -> Result<(), ChannelError>;

    /// Close the connection and drop every listener. No-op when already
    /// disconnected.
    async fn disconnect(&self);

    /// Subscribe to one job's updates. Does nothing (beyond a warning) when
    /// not connected; the request is not replayed later.
    fn join_job(&self, job_id: &str);

    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId;

    fn off(&self, kind: EventKind, id: ListenerId) -> bool;

    fn is_connected(&self) -> bool;
}

/// Production [`RealtimeChannel`] over `tokio-tungstenite`.
pub struct WsChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    endpoint: WsEndpoint,
    reconnect: ReconnectConfig,
    registry: ListenerRegistry,
    connected: AtomicBool,
    /// Sender half feeding the live connection's writer.
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    live: Mutex<Option<LiveConnection>>,
    /// Serialises connect/disconnect so only one socket ever exists.
    connect_lock: tokio::sync::Mutex<()>,
}

/// Internal bookkeeping for the running connection task.
struct LiveConnection {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WsChannel {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_endpoint(
            WsEndpoint::new(config.ws_url.clone(), config.handshake_timeout),
            config.reconnect.clone(),
        )
    }

    pub fn with_endpoint(endpoint: WsEndpoint, reconnect: ReconnectConfig) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                endpoint,
                reconnect,
                registry: ListenerRegistry::new(),
                connected: AtomicBool::new(false),
                outbound: Mutex::new(None),
                live: Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.registry.listener_count(kind)
    }

    /// Spawn the connection task for a freshly opened connection.
    fn start(&self, conn: WsConnection) {
        let cancel = CancellationToken::new();
        let outbound = self.inner.attach();
        let task = tokio::spawn(run_connection_loop(
            Arc::clone(&self.inner),
            conn,
            outbound,
            cancel.clone(),
        ));
        *lock(&self.inner.live) = Some(LiveConnection { cancel, task });
    }

    /// Stop the connection task, if any, and wait for it to exit.
    async fn stop_live(&self) -> bool {
        let Some(mut live) = lock(&self.inner.live).take() else {
            return false;
        };
        live.cancel.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut live.task).await.is_err() {
            tracing::warn!("Realtime connection task did not stop in time, aborting");
            live.task.abort();
        }
        self.inner.detach();
        true
    }
}

#[async_trait]
impl RealtimeChannel for WsChannel {
    async fn connect(&self) -> Result<(), ChannelError> {
        let _guard = self.inner.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        // A background loop may still be retrying after a drop.
        self.stop_live().await;

        tracing::info!(url = %self.inner.endpoint.ws_url(), "Connecting to realtime channel");

        let config = &self.inner.reconnect;
        let max_attempts = config.max_attempts.max(1);
        let mut delay = config.initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.inner.endpoint.connect().await {
                Ok(conn) => {
                    self.start(conn);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Realtime connection attempt failed");
                    if attempt >= max_attempts {
                        return Err(ChannelError::Connection {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, config);
                }
            }
        }
    }

    async fn disconnect(&self) {
        let _guard = self.inner.connect_lock.lock().await;
        if self.stop_live().await {
            tracing::info!("Disconnected realtime channel");
            self.inner.registry.clear();
        }
    }

    fn join_job(&self, job_id: &str) {
        let outbound = lock(&self.inner.outbound);
        let sender = match outbound.as_ref() {
            Some(sender) if self.is_connected() => sender,
            _ => {
                tracing::warn!(job_id, "Cannot join job - realtime channel not connected");
                return;
            }
        };

        let message = ClientMessage::JoinJob {
            job_id: job_id.to_string(),
        };
        match message.to_json() {
            Ok(json) => {
                if sender.send(Message::Text(json)).is_err() {
                    tracing::warn!(job_id, "Realtime connection closed before join was sent");
                } else {
                    tracing::info!(job_id, "Joining job room");
                }
            }
            Err(e) => tracing::error!(job_id, error = %e, "Failed to encode join request"),
        }
    }

    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.inner.registry.on(kind, listener)
    }

    fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.registry.off(kind, id)
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        if let Some(live) = lock(&self.inner.live).take() {
            live.cancel.cancel();
        }
    }
}

impl ChannelInner {
    /// Install a fresh outbound queue and mark the channel connected.
    fn attach(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.outbound) = Some(tx);
        self.connected.store(true, Ordering::SeqCst);
        rx
    }

    fn detach(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *lock(&self.outbound) = None;
    }
}

/// Core connection loop: process frames -> reconnect -> process frames.
///
/// Runs until cancelled or until reconnection gives up, in which case
/// listeners receive [`ChannelEvent::Closed`].
async fn run_connection_loop(
    inner: Arc<ChannelInner>,
    mut conn: WsConnection,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        let WsConnection {
            client_id,
            ws_stream,
        } = conn;

        let end = process_frames(ws_stream, outbound, &inner.registry, &cancel).await;
        inner.detach();

        let reason = match end {
            SessionEnd::Cancelled => return,
            SessionEnd::Dropped(reason) => reason,
        };

        tracing::warn!(client_id = %client_id, reason = %reason, "Realtime connection lost");
        inner
            .registry
            .dispatch(&ChannelEvent::Disconnected { reason });

        if cancel.is_cancelled() {
            return;
        }

        match reconnect_loop(&inner.endpoint, &inner.reconnect, &cancel).await {
            Some(next) => {
                conn = next;
                outbound = inner.attach();
                inner.registry.dispatch(&ChannelEvent::Reconnected);
            }
            None => {
                if !cancel.is_cancelled() {
                    let attempts = inner.reconnect.max_attempts;
                    tracing::error!(attempts, "Giving up on realtime channel");
                    inner.registry.dispatch(&ChannelEvent::Closed { attempts });
                }
                return;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
