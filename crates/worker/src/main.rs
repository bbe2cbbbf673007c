//! `ltx-worker` -- LTX-2 text-to-video job worker.
//!
//! Waits for the local ComfyUI server to come up, then accepts jobs over
//! HTTP and runs each one through the ComfyUI workflow.
//!
//! See [`ltx_worker::config::WorkerConfig::from_env`] for the environment
//! variables.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ltx_comfyui::readiness::{wait_until_ready, ReadinessError};
use ltx_core::workflow::WorkflowTemplate;
use ltx_worker::config::WorkerConfig;
use ltx_worker::handler::JobHandler;
use ltx_worker::server::{self, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ltx_worker=info,ltx_comfyui=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });
    let endpoint = config.endpoint();
    tracing::info!(
        comfyui = %endpoint.api_url,
        workflow = %config.workflow_path.display(),
        "Loaded worker configuration",
    );

    let template = WorkflowTemplate::load(&config.workflow_path).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to load workflow template");
        std::process::exit(1);
    });

    let handler = JobHandler::new(&config, template);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    // Jobs are only accepted once ComfyUI answers.
    match wait_until_ready(handler.api(), &config.readiness(), &shutdown).await {
        Ok(_) => {}
        Err(ReadinessError::Cancelled { .. }) => {
            tracing::info!("Shutdown requested before ComfyUI became ready");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "ComfyUI never became ready");
            std::process::exit(1);
        }
    }

    let app = server::router(AppState {
        handler: Arc::new(handler),
        shutdown: shutdown.clone(),
    });

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(%addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });
    tracing::info!(%addr, "Accepting jobs");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Worker stopped");
}

/// Wait for SIGINT or SIGTERM, then cancel in-flight jobs.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }

    shutdown.cancel();
}
