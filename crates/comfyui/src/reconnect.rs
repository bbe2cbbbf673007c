//! Bounded-retry WebSocket connection for a single job session.
//!
//! [`connect_with_retry`] makes up to [`RetryConfig::max_attempts`]
//! connection attempts with the same client id, sleeping between them,
//! and gives up with [`ConnectError::Exhausted`]. The delay schedule is
//! fixed by default and can grow exponentially via
//! [`RetryConfig::multiplier`].

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{ComfyUIClient, ComfyUIConnection};

/// Tunable parameters for the retry schedule.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of connection attempts.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    /// 36 attempts, 5 seconds apart: roughly three minutes of retrying.
    fn default() -> Self {
        Self::fixed(36, Duration::from_secs(5))
    }
}

impl RetryConfig {
    /// Constant spacing between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`RetryConfig::max_delay`].
pub fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Failed to connect to WebSocket after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("WebSocket connection cancelled")]
    Cancelled,
}

/// Connect to ComfyUI as `client_id`, retrying on failure.
pub async fn connect_with_retry(
    client: &ComfyUIClient,
    client_id: &str,
    config: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<ComfyUIConnection, ConnectError> {
    let mut delay = config.initial_delay;
    let mut last_error = String::from("no attempts made");

    for attempt in 1..=config.max_attempts {
        tracing::info!(
            client_id = %client_id,
            attempt,
            max_attempts = config.max_attempts,
            "Attempting WebSocket connection",
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(client_id = %client_id, "Connect cancelled");
                return Err(ConnectError::Cancelled);
            }
            result = client.connect(client_id) => {
                match result {
                    Ok(conn) => {
                        tracing::info!(client_id = %client_id, attempt, "WebSocket connected");
                        return Ok(conn);
                    }
                    Err(e) => {
                        tracing::warn!(
                            client_id = %client_id,
                            error = %e,
                            "WebSocket connection attempt {attempt} failed",
                        );
                        last_error = e.to_string();
                    }
                }
            }
        }

        if attempt == config.max_attempts {
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, config);
    }

    Err(ConnectError::Exhausted {
        attempts: config.max_attempts,
        last_error,
    })
}
