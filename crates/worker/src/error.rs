use ltx_comfyui::{ComfyUIApiError, ConnectError, ReadinessError, ResolveError, WatchError};
use ltx_core::error::CoreError;

/// Every way a single job can fail.
///
/// Only [`JobHandler`](crate::handler::JobHandler) sees this type; it is
/// flattened into the `{"error": ...}` response before leaving the worker.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Bad caller input. Reported without the processing prefix and
    /// before any remote call.
    #[error(transparent)]
    Validation(CoreError),

    #[error("Failed to prepare workflow: {0}")]
    Workflow(CoreError),

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Failed to queue prompt: {0}")]
    Submit(#[from] ComfyUIApiError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl JobError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
