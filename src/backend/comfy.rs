//! ComfyUI implementation of the backend boundary.
//!
//! Request flow mirrors the server's expectations: open the WebSocket first
//! (results are addressed by the `clientId` handshake parameter), then
//! `POST /prompt` with the workflow document, then read frames until the
//! server reports execution finished. Image bytes arrive as binary frames
//! while the `SaveImageWebsocket` node is executing, each prefixed with an
//! 8-byte event header.

use futures_util::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use super::{
    parse_wire_message, Artifact, BackendError, GenerationBackend, PendingRequest, WireMessage,
};

/// Node whose binary output frames carry the generated images.
const SAVE_NODE: &str = "SaveImageWebsocket";

/// Binary frames start with two big-endian u32s (event type, format).
const BINARY_HEADER_LEN: usize = 8;

/// HTTP + WebSocket client for one ComfyUI server.
pub struct ComfyBackend {
    client: reqwest::Client,
    http_url: String,
    ws_url: String,
}

/// Body of a successful `POST /prompt` response.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    prompt_id: String,
}

impl ComfyBackend {
    /// Create a backend client.
    ///
    /// * `http_url` - base HTTP URL, e.g. `http://127.0.0.1:8188`.
    /// * `ws_url` - base WebSocket URL, e.g. `ws://127.0.0.1:8188`.
    pub fn new(http_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            http_url: http_url.into(),
            ws_url: ws_url.into(),
        }
    }

    /// Fail on non-2xx responses, capturing the body for diagnostics.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl GenerationBackend for ComfyBackend {
    async fn submit_request(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<PendingRequest, BackendError> {
        let client_id = uuid::Uuid::new_v4().to_string();

        // Connect before queueing so no result frame can be missed.
        let ws_endpoint = format!("{}/ws?clientId={}", self.ws_url, client_id);
        let (socket, _) = connect_async(&ws_endpoint).await.map_err(|e| {
            BackendError::Connect(format!(
                "could not connect to ComfyUI at {}: {e}; is the server running?",
                self.ws_url
            ))
        })?;
        debug!(client_id = %client_id, "connected to ComfyUI socket");

        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });
        let response = self
            .client
            .post(format!("{}/prompt", self.http_url))
            .json(&body)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let submitted: SubmitResponse = response.json().await?;
        info!(prompt_id = %submitted.prompt_id, "request queued on backend");

        Ok(PendingRequest {
            request_id: submitted.prompt_id,
            socket: Some(socket),
        })
    }

    async fn stream_results(
        &self,
        pending: PendingRequest,
    ) -> Result<Vec<Artifact>, BackendError> {
        let PendingRequest { request_id, socket } = pending;
        let mut socket = socket.ok_or_else(|| {
            BackendError::Protocol("no live socket for this request".to_string())
        })?;

        let mut artifacts: Vec<Artifact> = Vec::new();
        let mut current_node = String::new();

        loop {
            let Some(frame) = socket.next().await else {
                return Err(BackendError::Protocol(
                    "socket closed before execution finished".to_string(),
                ));
            };
            match frame? {
                Message::Text(text) => match parse_wire_message(&text) {
                    Ok(WireMessage::Executing { node, prompt_id })
                        if prompt_id == request_id =>
                    {
                        match node {
                            Some(node) => {
                                trace!(node = %node, prompt_id = %request_id, "executing node");
                                current_node = node;
                            }
                            // Null node for our request: execution is done.
                            None => break,
                        }
                    }
                    Ok(WireMessage::ExecutionError(err)) if err.prompt_id == request_id => {
                        let _ = socket.close(None).await;
                        return Err(BackendError::Execution {
                            node: err.node_id,
                            message: err.exception_message,
                        });
                    }
                    Ok(_) => {}
                    // Unknown kinds are broadcast noise from newer servers.
                    Err(e) => trace!(error = %e, "ignoring unrecognized message"),
                },
                Message::Binary(data) => {
                    if current_node == SAVE_NODE {
                        if data.len() < BINARY_HEADER_LEN {
                            return Err(BackendError::Protocol(format!(
                                "binary frame shorter than the {BINARY_HEADER_LEN}-byte header"
                            )));
                        }
                        debug!(bytes = data.len() - BINARY_HEADER_LEN, "received image frame");
                        artifacts.push(data[BINARY_HEADER_LEN..].to_vec());
                    }
                }
                Message::Close(_) => {
                    return Err(BackendError::Protocol(
                        "server closed the socket mid-execution".to_string(),
                    ));
                }
                // Ping/pong are answered by the transport.
                _ => {}
            }
        }

        if let Err(e) = socket.close(None).await {
            warn!(error = %e, "error closing backend socket");
        }
        info!(prompt_id = %request_id, count = artifacts.len(), "execution complete");
        Ok(artifacts)
    }

    async fn release_resources(&self) -> Result<(), BackendError> {
        info!("requesting backend to unload models");
        let body = serde_json::json!({
            "unload_models": true,
            "free_memory": true,
        });
        let response = self
            .client
            .post(format!("{}/free", self.http_url))
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}
