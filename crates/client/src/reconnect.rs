//! Exponential-backoff reconnection logic for the realtime channel.
//!
//! Used both for the initial `connect()` retries and for the background
//! loop that restores a connection after it drops. Both give up after
//! [`ReconnectConfig::max_attempts`] consecutive failures.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{WsConnection, WsEndpoint};

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Consecutive failed attempts tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Attempt to reconnect with exponential backoff.
///
/// Waits `initial_delay` before the first attempt. Returns
/// `Some(connection)` once a connection succeeds, or `None` if the `cancel`
/// token fires or `max_attempts` consecutive attempts fail.
pub async fn reconnect_loop(
    endpoint: &WsEndpoint,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<WsConnection> {
    let mut delay = config.initial_delay;

    for attempt in 1..=config.max_attempts {
        // Wait before the attempt, respecting cancellation.
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to realtime channel",
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reconnect cancelled");
                return None;
            }
            result = endpoint.connect() => {
                match result {
                    Ok(conn) => {
                        tracing::info!(attempt, "Reconnected to realtime channel");
                        return Some(conn);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Reconnect attempt {attempt} failed");
                    }
                }
            }
        }

        delay = next_delay(delay, config);
    }

    tracing::error!(
        attempts = config.max_attempts,
        "Giving up on realtime channel reconnection",
    );
    None
}
