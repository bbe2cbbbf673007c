//! Completion watcher for a submitted prompt.
//!
//! Reads frames from the job's WebSocket session until ComfyUI reports
//! that the prompt finished (`executing` with a null `node` and the
//! expected `prompt_id`). Every other frame is skipped: binary previews,
//! control frames, unknown or malformed JSON, other message kinds, and
//! `executing` messages for other nodes or prompts.
//!
//! There is no idle timeout; the loop ends on completion, a transport
//! error, a close, or cancellation.

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use crate::messages::{parse_message, ComfyUIMessage};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("WebSocket receive error: {0}")]
    Stream(String),

    #[error("WebSocket closed before prompt completed: {0}")]
    Closed(String),

    #[error("Wait for completion cancelled")]
    Cancelled,
}

/// Block until `prompt_id` completes on `stream`.
///
/// Receive errors are not retried here; the connection was already
/// retried when it was opened.
pub async fn wait_for_completion<S>(
    stream: &mut S,
    prompt_id: &str,
    cancel: &CancellationToken,
) -> Result<(), WatchError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    tracing::info!(prompt_id = %prompt_id, "Waiting for prompt completion");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WatchError::Cancelled),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                if handle_text_message(&text, prompt_id) {
                    tracing::info!(prompt_id = %prompt_id, "Execution complete");
                    return Ok(());
                }
            }
            Some(Ok(Message::Binary(data))) => {
                tracing::trace!(bytes = data.len(), "Ignoring binary message (preview image)");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                tracing::warn!(prompt_id = %prompt_id, ?frame, "ComfyUI closed the WebSocket");
                let reason = frame
                    .map(|f| format!("{} {}", f.code, f.reason))
                    .unwrap_or_else(|| "no close frame".to_string());
                return Err(WatchError::Closed(reason));
            }
            Some(Err(e)) => {
                tracing::error!(prompt_id = %prompt_id, error = %e, "WebSocket receive error");
                return Err(WatchError::Stream(e.to_string()));
            }
            None => {
                return Err(WatchError::Closed("stream ended".to_string()));
            }
        }
    }
}

/// Inspect one text frame. Returns `true` only for the terminal event of
/// `prompt_id`.
fn handle_text_message(text: &str, prompt_id: &str) -> bool {
    let msg = match parse_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(error = %e, raw_message = %text, "Skipping unrecognised message");
            return false;
        }
    };

    match msg {
        ComfyUIMessage::Executing(data) => {
            if data.is_completion_of(prompt_id) {
                return true;
            }
            if let Some(node) = &data.node {
                tracing::debug!(prompt_id = %data.prompt_id, node = %node, "Executing node");
            }
        }
        ComfyUIMessage::Progress(data) => {
            tracing::debug!(
                value = data.value,
                max = data.max,
                percent = data.percent(),
                "Generation progress",
            );
        }
        ComfyUIMessage::ExecutionStart(data) => {
            tracing::debug!(prompt_id = %data.prompt_id, "Execution started");
        }
        ComfyUIMessage::ExecutionCached(data) => {
            tracing::debug!(prompt_id = %data.prompt_id, cached = data.nodes.len(), "Execution used cache");
        }
        ComfyUIMessage::Executed(data) => {
            tracing::debug!(prompt_id = %data.prompt_id, node = %data.node, "Node executed with output");
        }
        ComfyUIMessage::ExecutionError(data) => {
            // Completion still arrives as `executing` with a null node; the
            // failure itself is read back from history.
            tracing::warn!(
                prompt_id = %data.prompt_id,
                node_id = %data.node_id,
                error_type = %data.exception_type,
                error_message = %data.exception_message,
                "Execution error reported",
            );
        }
        ComfyUIMessage::Status(data) => {
            tracing::debug!(
                queue_remaining = data.status.exec_info.queue_remaining,
                "ComfyUI queue status",
            );
        }
    }

    false
}
