//! Readiness polling for a ComfyUI instance that may still be booting.
//!
//! [`wait_until_ready`] probes at a fixed interval for a bounded number of
//! attempts. The bound counts attempts, not wall-clock time, so slow
//! probes stretch the total wait.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Result of a single readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The service accepted the probe.
    Ready,
    /// Transient failure (refused, timed out, non-200); retry.
    NotReadyYet(String),
    /// The probe can never succeed (e.g. malformed base URL); stop.
    Fatal(String),
}

/// Something that can be asked whether a dependency is up.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self) -> ProbeOutcome;
}

/// Tunable parameters for readiness polling.
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Total number of probes before giving up.
    pub max_attempts: u32,
    /// Pause after each failed probe.
    pub interval: Duration,
    /// Log a progress line every this many failed attempts.
    pub progress_every: u32,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: 300,
            interval: Duration::from_secs(1),
            progress_every: 30,
        }
    }
}

impl ReadinessConfig {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("ComfyUI did not become ready within {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("ComfyUI readiness probe cannot succeed: {0}")]
    Fatal(String),

    #[error("Readiness wait cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

/// Poll `probe` until it reports [`ProbeOutcome::Ready`].
///
/// Transient failures are swallowed. Both the probe and the pause after it
/// race `cancel`. Returns the number of probes made.
pub async fn wait_until_ready<P>(
    probe: &P,
    config: &ReadinessConfig,
    cancel: &CancellationToken,
) -> Result<u32, ReadinessError>
where
    P: ReadinessProbe + ?Sized,
{
    tracing::info!(max_attempts = config.max_attempts, "Waiting for ComfyUI");

    for attempt in 1..=config.max_attempts {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(attempt, "Readiness wait cancelled");
                return Err(ReadinessError::Cancelled { attempts: attempt - 1 });
            }
            outcome = probe.probe() => outcome,
        };

        match outcome {
            ProbeOutcome::Ready => {
                tracing::info!(attempt, "ComfyUI HTTP is ready");
                return Ok(attempt);
            }
            ProbeOutcome::NotReadyYet(reason) => {
                tracing::debug!(attempt, reason = %reason, "ComfyUI not ready yet");
            }
            ProbeOutcome::Fatal(reason) => {
                tracing::error!(attempt, reason = %reason, "Readiness probe failed fatally");
                return Err(ReadinessError::Fatal(reason));
            }
        }

        if config.progress_every > 0 && attempt % config.progress_every == 0 {
            tracing::info!(
                attempt,
                max_attempts = config.max_attempts,
                "Still waiting for ComfyUI",
            );
        }

        if attempt < config.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(attempt, "Readiness wait cancelled");
                    return Err(ReadinessError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(config.interval) => {}
            }
        }
    }

    Err(ReadinessError::Timeout {
        attempts: config.max_attempts,
    })
}
