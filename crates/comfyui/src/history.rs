//! Result resolution from ComfyUI execution history.
//!
//! `GET /history/{prompt_id}` returns `{prompt_id: entry}` where each
//! entry carries a status block and an `outputs` map of
//! `node id -> {output kind -> [file descriptor, ...]}`. Output shapes
//! differ per node type (`images`, `gifs`, `videos`, `animated`, ...), so
//! the scan walks them generically and takes the first descriptor that
//! names a file.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::api::{ComfyUIApi, ComfyUIApiError};

/// `status_str` value ComfyUI reports for a failed prompt.
pub const STATUS_ERROR: &str = "error";
/// `type` assumed for descriptors that omit it.
pub const DEFAULT_ARTIFACT_TYPE: &str = "output";

/// One prompt's history record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: Option<HistoryStatus>,
    /// Kept as raw JSON in document order.
    #[serde(default)]
    pub outputs: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    /// Remote diagnostic messages, passed through verbatim.
    #[serde(default)]
    pub messages: Vec<Value>,
}

impl HistoryStatus {
    pub fn is_error(&self) -> bool {
        self.status_str.as_deref() == Some(STATUS_ERROR)
    }
}

/// Location of an output file on the ComfyUI server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub filename: String,
    /// Storage bucket: `output`, `temp`, or `input`.
    pub kind: String,
    pub subfolder: Option<String>,
}

impl ArtifactRef {
    /// Build from an output descriptor; `None` unless it is an object
    /// with a string `filename`.
    pub fn from_descriptor(item: &Value) -> Option<Self> {
        let obj = item.as_object()?;
        let filename = obj.get("filename")?.as_str()?;
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ARTIFACT_TYPE);
        let subfolder = obj
            .get("subfolder")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Some(Self {
            filename: filename.to_string(),
            kind: kind.to_string(),
            subfolder,
        })
    }

    /// Query string for `GET /view`; `subfolder` is only sent when set.
    pub fn query_params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![("filename", self.filename.as_str()), ("type", self.kind.as_str())];
        if let Some(subfolder) = &self.subfolder {
            params.push(("subfolder", subfolder.as_str()));
        }
        params
    }
}

/// A downloaded output file.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub source: ArtifactRef,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Failed to get history: {0}")]
    History(#[source] ComfyUIApiError),

    #[error("No history recorded for prompt {0}")]
    HistoryMissing(String),

    #[error("Malformed history for prompt {prompt_id}: {reason}")]
    HistoryMalformed { prompt_id: String, reason: String },

    #[error("ComfyUI workflow failed: {}", Value::Array(.messages.clone()))]
    RemoteExecution { messages: Vec<Value> },

    #[error("No video output found in workflow results")]
    ArtifactNotFound,

    #[error("Failed to download {filename}: {source}")]
    Download {
        filename: String,
        #[source]
        source: ComfyUIApiError,
    },
}

/// Extract and decode the entry for `prompt_id` from a history response.
pub fn entry_for(history: &Value, prompt_id: &str) -> Result<HistoryEntry, ResolveError> {
    let raw = history
        .get(prompt_id)
        .ok_or_else(|| ResolveError::HistoryMissing(prompt_id.to_string()))?;

    HistoryEntry::deserialize(raw).map_err(|e| ResolveError::HistoryMalformed {
        prompt_id: prompt_id.to_string(),
        reason: e.to_string(),
    })
}

/// Fail with the remote messages when the prompt ended in error.
pub fn check_status(entry: &HistoryEntry) -> Result<(), ResolveError> {
    match &entry.status {
        Some(status) if status.is_error() => Err(ResolveError::RemoteExecution {
            messages: status.messages.clone(),
        }),
        _ => Ok(()),
    }
}

/// First file descriptor across all nodes and output kinds, in document
/// order. Non-list output values and descriptors without a filename are
/// skipped.
pub fn find_first_artifact(outputs: &Map<String, Value>) -> Option<ArtifactRef> {
    outputs
        .values()
        .filter_map(Value::as_object)
        .flat_map(|node_output| node_output.values())
        .filter_map(Value::as_array)
        .flatten()
        .find_map(ArtifactRef::from_descriptor)
}

/// Fetch history for `prompt_id`, check its status, and download the
/// first output file.
pub async fn resolve_artifact(api: &ComfyUIApi, prompt_id: &str) -> Result<Artifact, ResolveError> {
    let history = api
        .get_history(prompt_id)
        .await
        .map_err(ResolveError::History)?;
    let entry = entry_for(&history, prompt_id)?;
    check_status(&entry)?;

    let source = find_first_artifact(&entry.outputs).ok_or(ResolveError::ArtifactNotFound)?;
    tracing::info!(
        prompt_id = %prompt_id,
        filename = %source.filename,
        kind = %source.kind,
        "Downloading output",
    );

    let bytes = api
        .view(&source)
        .await
        .map_err(|e| ResolveError::Download {
            filename: source.filename.clone(),
            source: e,
        })?;

    tracing::info!(
        prompt_id = %prompt_id,
        filename = %source.filename,
        bytes = bytes.len(),
        "Retrieved output",
    );

    Ok(Artifact { source, bytes })
}
