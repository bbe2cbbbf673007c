//! Job orchestration: one text-to-video request from input to encoded
//! video.
//!
//! The sequence per job is validate -> inject -> wait for ComfyUI ->
//! connect (fresh client id) -> submit -> wait for completion -> fetch
//! output -> close. The WebSocket is closed on every path once it has
//! been opened, and a failed close never replaces the job's own error.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use ltx_comfyui::client::new_client_id;
use ltx_comfyui::history::{resolve_artifact, Artifact};
use ltx_comfyui::readiness::wait_until_ready;
use ltx_comfyui::reconnect::connect_with_retry;
use ltx_comfyui::watcher::{wait_for_completion, WatchError};
use ltx_comfyui::{ComfyUIApi, ComfyUIClient, ComfyUIConnection, ReadinessConfig, RetryConfig};
use ltx_core::job_input::JobInput;
use ltx_core::workflow::WorkflowTemplate;

use crate::config::WorkerConfig;
use crate::error::JobError;

/// Prompts are cut to this many characters in log lines.
const LOG_PROMPT_CHARS: usize = 80;

/// Successful job result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    /// Base64-encoded video bytes.
    pub video: String,
    pub seed: u64,
    pub prompt_id: String,
    pub frame_count: u32,
    pub duration_seconds: f64,
}

/// What a job returns to its caller: the output, or an error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandlerResponse {
    Success(JobOutput),
    Failure { error: String },
}

impl HandlerResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Runs text-to-video jobs against one ComfyUI instance.
///
/// Holds no per-job state, so one handler can serve concurrent jobs; each
/// job opens its own WebSocket session under its own client id.
pub struct JobHandler {
    api: ComfyUIApi,
    client: ComfyUIClient,
    template: WorkflowTemplate,
    readiness: ReadinessConfig,
    retry: RetryConfig,
}

impl JobHandler {
    pub fn new(config: &WorkerConfig, template: WorkflowTemplate) -> Self {
        let endpoint = config.endpoint();
        Self {
            api: ComfyUIApi::new(&endpoint),
            client: ComfyUIClient::new(&endpoint).with_connect_timeout(config.connect_timeout()),
            template,
            readiness: config.readiness(),
            retry: config.retry(),
        }
    }

    /// Assemble a handler from already-built parts.
    pub fn from_parts(
        api: ComfyUIApi,
        client: ComfyUIClient,
        template: WorkflowTemplate,
        readiness: ReadinessConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            api,
            client,
            template,
            readiness,
            retry,
        }
    }

    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }

    /// Run one job and flatten the outcome into a [`HandlerResponse`].
    ///
    /// Never fails: every error becomes `{"error": ...}`.
    pub async fn handle(&self, input: &JobInput, cancel: &CancellationToken) -> HandlerResponse {
        let task_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("job", task_id = %task_id);

        match self.run(input, cancel).instrument(span).await {
            Ok(output) => {
                tracing::info!(task_id = %task_id, prompt_id = %output.prompt_id, "Task complete");
                HandlerResponse::Success(output)
            }
            Err(e) if e.is_validation() => {
                tracing::warn!(task_id = %task_id, error = %e, "Rejected job input");
                HandlerResponse::Failure {
                    error: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Task failed");
                HandlerResponse::Failure {
                    error: format!("Processing failed: {e}"),
                }
            }
        }
    }

    /// Run one job, returning the typed error on failure.
    pub async fn run(
        &self,
        input: &JobInput,
        cancel: &CancellationToken,
    ) -> Result<JobOutput, JobError> {
        let params = input.validate().map_err(JobError::Validation)?;

        tracing::info!(
            prompt = %truncate(&params.prompt, LOG_PROMPT_CHARS),
            aspect_ratio = params.aspect_ratio.as_str(),
            width = params.width,
            height = params.height,
            frame_count = params.frame_count,
            seed = params.seed,
            "Processing text-to-video job",
        );

        let workflow = self.template.inject(&params).map_err(JobError::Workflow)?;

        wait_until_ready(&self.api, &self.readiness, cancel).await?;

        let client_id = new_client_id();
        let mut conn = connect_with_retry(&self.client, &client_id, &self.retry, cancel).await?;

        let outcome = self.execute(&mut conn, &workflow, cancel).await;

        if let Err(e) = conn.close().await {
            tracing::warn!(client_id = %client_id, error = %e, "Failed to close WebSocket");
        }

        let (prompt_id, artifact) = outcome?;
        tracing::info!(
            prompt_id = %prompt_id,
            filename = %artifact.source.filename,
            subfolder = artifact.source.subfolder.as_deref().unwrap_or(""),
            bytes = artifact.bytes.len(),
            "Encoding output video",
        );

        Ok(JobOutput {
            video: base64::engine::general_purpose::STANDARD.encode(&artifact.bytes),
            seed: params.seed,
            prompt_id,
            frame_count: params.frame_count,
            duration_seconds: params.duration_seconds(),
        })
    }

    /// Submit, wait, and fetch over an open session.
    async fn execute(
        &self,
        conn: &mut ComfyUIConnection,
        workflow: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<(String, Artifact), JobError> {
        tracing::info!(client_id = %conn.client_id, "Submitting workflow to ComfyUI");
        let submitted = self.api.submit_workflow(workflow, &conn.client_id).await?;
        let prompt_id = submitted.prompt_id;
        tracing::info!(prompt_id = %prompt_id, queue_number = ?submitted.number, "Workflow queued");

        match wait_for_completion(&mut conn.ws_stream, &prompt_id, cancel).await {
            Ok(()) => {}
            Err(WatchError::Cancelled) => {
                self.abandon(&prompt_id).await;
                return Err(WatchError::Cancelled.into());
            }
            Err(e) => return Err(e.into()),
        }

        let artifact = resolve_artifact(&self.api, &prompt_id).await?;
        Ok((prompt_id, artifact))
    }

    /// Best-effort removal of a prompt we no longer wait for.
    async fn abandon(&self, prompt_id: &str) {
        tracing::info!(prompt_id = %prompt_id, "Cancelling prompt on ComfyUI");
        if let Err(e) = self.api.cancel_execution(prompt_id).await {
            tracing::warn!(prompt_id = %prompt_id, error = %e, "Failed to dequeue prompt");
        }
        if let Err(e) = self.api.interrupt().await {
            tracing::warn!(prompt_id = %prompt_id, error = %e, "Failed to interrupt execution");
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
