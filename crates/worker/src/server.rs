//! HTTP job intake.
//!
//! Exposes a synchronous run endpoint in the shape serverless GPU
//! platforms use: `POST /runsync` with `{"id"?, "input": {...}}`, answered
//! with `{"id", "status", "output"}` once the job has finished.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use ltx_core::job_input::JobInput;

use crate::handler::{HandlerResponse, JobHandler};

/// Shared state for the intake routes.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<JobHandler>,
    /// Cancelled on shutdown; every job runs under a child token.
    pub shutdown: CancellationToken,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub input: JobInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Completed,
    Failed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub id: String,
    pub status: JobStatus,
    pub output: HandlerResponse,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// POST /runsync -- run one job to completion.
///
/// A body that does not decode still gets the `FAILED` envelope, with the
/// rejection's status code.
async fn run_sync(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> (StatusCode, Json<RunResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let id = uuid::Uuid::new_v4().to_string();
            tracing::warn!(
                job_id = %id,
                error = %rejection.body_text(),
                "Rejected malformed job request",
            );
            let output = HandlerResponse::Failure {
                error: format!("Invalid request body: {}", rejection.body_text()),
            };
            return (
                rejection.status(),
                Json(RunResponse {
                    id,
                    status: JobStatus::Failed,
                    output,
                }),
            );
        }
    };

    let id = request
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    tracing::info!(job_id = %id, "Received job");

    // The job runs on its own task so cleanup still completes if the caller
    // disconnects; dropping this future trips the guard and cancels the job.
    let cancel = state.shutdown.child_token();
    let guard = cancel.clone().drop_guard();
    let handler = Arc::clone(&state.handler);
    let input = request.input;
    let job = tokio::spawn(async move { handler.handle(&input, &cancel).await });

    let output = match job.await {
        Ok(output) => output,
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "Job task failed");
            HandlerResponse::Failure {
                error: format!("Processing failed: {e}"),
            }
        }
    };
    let _ = guard.disarm();

    let status = if output.is_success() {
        JobStatus::Completed
    } else {
        JobStatus::Failed
    };

    (StatusCode::OK, Json(RunResponse { id, status, output }))
}

/// GET /health -- liveness of the worker process itself.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/runsync", post(run_sync))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
