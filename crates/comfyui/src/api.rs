//! Typed calls against the ComfyUI HTTP surface.
//!
//! Wraps the ComfyUI HTTP API (readiness, workflow submission,
//! cancellation, interruption, history retrieval, file download) using
//! [`reqwest`]. Every call carries its own bounded timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::client::ComfyUIEndpoint;
use crate::history::ArtifactRef;
use crate::readiness::{ProbeOutcome, ReadinessProbe};

/// Timeout for a single readiness probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for workflow submission.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for history retrieval.
pub const HISTORY_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for downloading an output file.
pub const VIEW_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for queue deletion and interrupt calls.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Error bodies are cut to this many characters before being surfaced.
pub const MAX_ERROR_BODY_CHARS: usize = 500;

/// REST handle for one ComfyUI server.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body of a successful `POST /prompt`: the id ComfyUI assigned
/// and the queue position.
#[derive(Debug, Clone)]
pub struct SubmitResponse {
    /// Key for completion events and the history record.
    pub prompt_id: String,
    /// Position in the execution queue, when reported.
    pub number: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawSubmitResponse {
    #[serde(default)]
    prompt_id: Option<String>,
    #[serde(default)]
    number: Option<i64>,
}

/// Failure of a single REST call.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Any non-2xx answer.
    #[error("ComfyUI rejected request (HTTP {status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated to [`MAX_ERROR_BODY_CHARS`].
        body: String,
    },

    /// `/prompt` answered 2xx without a `prompt_id`.
    #[error("Failed to get prompt_id from ComfyUI")]
    MissingPromptId,
}

impl ComfyUIApi {
    /// Build against `endpoint` with a fresh [`reqwest::Client`].
    pub fn new(endpoint: &ComfyUIEndpoint) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, endpoint: &ComfyUIEndpoint) -> Self {
        Self {
            client,
            api_url: endpoint.api_url.clone(),
        }
    }

    /// Queue `workflow` under `client_id`.
    ///
    /// ComfyUI routes the prompt's progress and completion events to
    /// the WebSocket session opened with the same `client_id`, so the
    /// session must exist before this is called.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .timeout(SUBMIT_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let raw: RawSubmitResponse = Self::parse_response(response).await?;
        let prompt_id = raw
            .prompt_id
            .filter(|id| !id.is_empty())
            .ok_or(ComfyUIApiError::MissingPromptId)?;

        Ok(SubmitResponse {
            prompt_id,
            number: raw.number,
        })
    }

    /// Drop `prompt_id` from the pending queue.
    ///
    /// Has no effect on a prompt that is already running; pair it with
    /// [`interrupt`](Self::interrupt).
    pub async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "delete": [prompt_id],
        });

        let response = self
            .client
            .post(format!("{}/queue", self.api_url))
            .timeout(CONTROL_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Stop whatever ComfyUI is executing right now.
    ///
    /// `POST /interrupt` is global: it stops the running prompt, whichever
    /// client submitted it.
    pub async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// `GET /history/{prompt_id}`.
    ///
    /// The document is keyed by prompt id; see [`crate::history`] for
    /// the entry shape.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .timeout(HISTORY_TIMEOUT)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download an output file via `GET /view`.
    pub async fn view(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&artifact.query_params())
            .timeout(VIEW_TIMEOUT)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // helpers

    /// Pass 2xx responses through. Anything else becomes
    /// [`ComfyUIApiError::Rejected`] with the body cut to
    /// [`MAX_ERROR_BODY_CHARS`].
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        Ok(response)
    }

    /// Check the status, then decode the JSON body as `T`.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Check the status and drop the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// `GET /system_stats` answers 200 once the server has finished booting.
#[async_trait]
impl ReadinessProbe for ComfyUIApi {
    async fn probe(&self) -> ProbeOutcome {
        let result = self
            .client
            .get(format!("{}/system_stats", self.api_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status() == reqwest::StatusCode::OK => ProbeOutcome::Ready,
            Ok(response) => ProbeOutcome::NotReadyYet(format!("HTTP {}", response.status())),
            Err(e) if e.is_builder() => ProbeOutcome::Fatal(e.to_string()),
            Err(e) => ProbeOutcome::NotReadyYet(e.to_string()),
        }
    }
}

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
