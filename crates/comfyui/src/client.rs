//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the connection configuration for a single
//! ComfyUI instance.  Call [`ComfyUIClient::connect`] with a fresh
//! client id to establish a live [`ComfyUIConnection`] over WebSocket.

use std::time::Duration;

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Default per-attempt connect timeout. ComfyUI can take a long time to
/// accept the upgrade while it is still loading models.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1200);

/// Base URLs of one ComfyUI server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComfyUIEndpoint {
    /// HTTP base URL, e.g. `http://127.0.0.1:8188`.
    pub api_url: String,
    /// WebSocket base URL, e.g. `ws://127.0.0.1:8188`.
    pub ws_url: String,
}

impl ComfyUIEndpoint {
    /// Build both URLs from a host (name or IP) and port.
    pub fn from_host(host: &str, port: u16) -> Self {
        Self {
            api_url: format!("http://{host}:{port}"),
            ws_url: format!("ws://{host}:{port}"),
        }
    }
}

/// Generate a new client id for one WebSocket session.
///
/// Every job attempt gets its own id; ids are never reused.
pub fn new_client_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Configuration handle for a ComfyUI instance's WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
    connect_timeout: Duration,
}

/// A live WebSocket connection to a ComfyUI instance.
#[derive(Debug)]
pub struct ComfyUIConnection {
    /// Client id sent during the WebSocket handshake.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl ComfyUIClient {
    pub fn new(endpoint: &ComfyUIEndpoint) -> Self {
        Self {
            ws_url: endpoint.ws_url.clone(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the per-attempt connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Full session URL carrying `client_id` as the `clientId` query
    /// parameter so ComfyUI addresses execution messages to this session.
    pub fn session_url(&self, client_id: &str) -> String {
        format!("{}/ws?clientId={}", self.ws_url, client_id)
    }

    /// Make one connection attempt to the ComfyUI WebSocket endpoint.
    pub async fn connect(&self, client_id: &str) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = self.session_url(client_id);

        let (ws_stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(&url))
            .await
            .map_err(|_| ComfyUIClientError::Timeout(self.connect_timeout))?
            .map_err(|e| {
                ComfyUIClientError::Connection(format!(
                    "Failed to connect to ComfyUI at {}: {e}",
                    self.ws_url
                ))
            })?;

        tracing::info!(client_id = %client_id, "Connected to ComfyUI at {}", self.ws_url);

        Ok(ComfyUIConnection {
            client_id: client_id.to_string(),
            ws_stream,
        })
    }
}

impl ComfyUIConnection {
    /// Send a close frame and flush it.
    pub async fn close(&mut self) -> Result<(), ComfyUIClientError> {
        self.ws_stream
            .close(None)
            .await
            .map_err(|e| ComfyUIClientError::Protocol(format!("close failed: {e}")))
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The handshake did not complete within the connect timeout.
    #[error("Connection timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn endpoint_from_host() {
        let endpoint = ComfyUIEndpoint::from_host("10.0.0.5", 8188);
        assert_eq!(endpoint.api_url, "http://10.0.0.5:8188");
        assert_eq!(endpoint.ws_url, "ws://10.0.0.5:8188");
    }

    #[test]
    fn session_url_embeds_client_id() {
        let client = ComfyUIClient::new(&ComfyUIEndpoint::from_host("localhost", 8188));
        assert_eq!(
            client.session_url("abc"),
            "ws://localhost:8188/ws?clientId=abc"
        );
    }

    #[test]
    fn client_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| new_client_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[tokio::test]
    async fn connect_refused_is_connection_error() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = ComfyUIClient::new(&ComfyUIEndpoint::from_host("127.0.0.1", port))
            .with_connect_timeout(Duration::from_secs(5));

        let result = client.connect(&new_client_id()).await;
        assert_matches!(result, Err(ComfyUIClientError::Connection(_)));
    }
}
