//! WebSocket frame processing loop.
//!
//! Reads raw frames from the realtime connection, parses them into typed
//! [`ServerMessage`](crate::messages::ServerMessage) variants, and
//! dispatches the resulting [`ChannelEvent`]s to the listener registry.
//! Outbound frames queued by the channel are written on the same task.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::WsStream;
use crate::events::ChannelEvent;
use crate::messages::parse_message;
use crate::registry::ListenerRegistry;

/// Why a connection's processing loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The channel was shut down locally.
    Cancelled,
    /// The connection dropped; the reason is for diagnostics only.
    Dropped(String),
}

/// Drive one connection until it closes, errors, or `cancel` fires.
///
/// Binary frames are ignored; ping/pong is handled by tungstenite.
pub async fn process_frames(
    ws_stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    registry: &ListenerRegistry,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "Close frame not delivered");
                }
                return SessionEnd::Cancelled;
            }
            Some(msg) = outbound.recv() => {
                if let Err(e) = sink.send(msg).await {
                    tracing::error!(error = %e, "WebSocket send error");
                    return SessionEnd::Dropped(format!("send failed: {e}"));
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_text_frame(&text, registry);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::trace!("Ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Realtime channel closed by server");
                        return SessionEnd::Dropped("closed by server".to_string());
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket receive error");
                        return SessionEnd::Dropped(e.to_string());
                    }
                    None => {
                        tracing::info!("WebSocket stream exhausted");
                        return SessionEnd::Dropped("stream exhausted".to_string());
                    }
                }
            }
        }
    }
}

/// Parse one text frame and dispatch it. Unknown or malformed frames are
/// logged and skipped.
pub fn handle_text_frame(text: &str, registry: &ListenerRegistry) {
    let event = match parse_message(text) {
        Ok(msg) => ChannelEvent::from(msg),
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Failed to parse realtime message");
            return;
        }
    };

    match &event {
        ChannelEvent::Connected { message } => {
            tracing::info!(message = %message, "Server acknowledged connection");
        }
        ChannelEvent::JobUpdate(job) => {
            tracing::debug!(
                job_id = %job.job_id,
                status = %job.status,
                progress = job.progress,
                "Job update",
            );
        }
        ChannelEvent::JoinedJob { job_id, .. } => {
            tracing::info!(job_id = %job_id, "Joined job room");
        }
        ChannelEvent::Error { message, job_id } => {
            tracing::error!(message = %message, job_id = ?job_id, "Realtime channel error");
        }
        ChannelEvent::Disconnected { .. }
        | ChannelEvent::Reconnected
        | ChannelEvent::Closed { .. } => {}
    }

    registry.dispatch(&event);
}
