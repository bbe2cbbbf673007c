use std::path::PathBuf;
use std::time::Duration;

use ltx_comfyui::{ComfyUIEndpoint, ReadinessConfig, RetryConfig};

/// Worker configuration loaded from environment variables.
///
/// Defaults match a ComfyUI instance running on the same machine.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// ComfyUI host name or IP.
    pub comfy_host: String,
    pub comfy_port: u16,
    /// API-format workflow JSON injected per job.
    pub workflow_path: PathBuf,
    /// Readiness probes (one per second) before giving up.
    pub ready_max_attempts: u32,
    pub ws_max_attempts: u32,
    pub ws_retry_delay_secs: u64,
    pub ws_connect_timeout_secs: u64,
    /// Job intake server bind address.
    pub host: String,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                  | Default              |
    /// |--------------------------|----------------------|
    /// | `SERVER_ADDRESS`         | `127.0.0.1`          |
    /// | `COMFY_PORT`             | `8188`               |
    /// | `WORKFLOW_PATH`          | `/workflow_api.json` |
    /// | `READY_MAX_ATTEMPTS`     | `300`                |
    /// | `WS_MAX_ATTEMPTS`        | `36`                 |
    /// | `WS_RETRY_DELAY_SECS`    | `5`                  |
    /// | `WS_CONNECT_TIMEOUT_SECS`| `1200`               |
    /// | `HOST`                   | `0.0.0.0`            |
    /// | `PORT`                   | `8000`               |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            comfy_host: string("SERVER_ADDRESS", "127.0.0.1"),
            comfy_port: parse(&lookup, "COMFY_PORT", 8188)?,
            workflow_path: PathBuf::from(string("WORKFLOW_PATH", "/workflow_api.json")),
            ready_max_attempts: parse(&lookup, "READY_MAX_ATTEMPTS", 300)?,
            ws_max_attempts: parse(&lookup, "WS_MAX_ATTEMPTS", 36)?,
            ws_retry_delay_secs: parse(&lookup, "WS_RETRY_DELAY_SECS", 5)?,
            ws_connect_timeout_secs: parse(&lookup, "WS_CONNECT_TIMEOUT_SECS", 1200)?,
            host: string("HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 8000)?,
        })
    }

    pub fn endpoint(&self) -> ComfyUIEndpoint {
        ComfyUIEndpoint::from_host(&self.comfy_host, self.comfy_port)
    }

    pub fn readiness(&self) -> ReadinessConfig {
        ReadinessConfig::with_max_attempts(self.ready_max_attempts)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::fixed(
            self.ws_max_attempts,
            Duration::from_secs(self.ws_retry_delay_secs),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_connect_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            })
        }
    }
}
