//! ComfyUI WebSocket and REST client library.
//!
//! Provides the pieces a worker needs to run one workflow end to end:
//! a readiness prober, WebSocket connection with bounded retry, workflow
//! submission, a completion watcher over the event stream, and a result
//! resolver that locates and downloads the produced artifact.

pub mod api;
pub mod client;
pub mod history;
pub mod messages;
pub mod readiness;
pub mod reconnect;
pub mod watcher;

pub use api::{ComfyUIApi, ComfyUIApiError};
pub use client::{ComfyUIClient, ComfyUIClientError, ComfyUIConnection, ComfyUIEndpoint};
pub use history::{Artifact, ArtifactRef, ResolveError};
pub use readiness::{ProbeOutcome, ReadinessConfig, ReadinessError, ReadinessProbe};
pub use reconnect::{ConnectError, RetryConfig};
pub use watcher::WatchError;
