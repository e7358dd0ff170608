//! The generation-backend boundary.
//!
//! The queue engine talks to the GPU-bound rendering service through the
//! narrow [`GenerationBackend`] trait: submit a request document, stream
//! back the raw artifacts, release resources. The production implementation
//! is [`ComfyBackend`]; tests substitute mocks.

mod comfy;
mod messages;

pub use comfy::ComfyBackend;
pub use messages::{parse_wire_message, ExecutionErrorData, WireMessage};

use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Raw bytes of one generated image, exactly as streamed by the backend.
pub type Artifact = Vec<u8>;

pub(crate) type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An accepted request awaiting its streamed results.
///
/// Produced by [`GenerationBackend::submit_request`] and consumed by
/// [`GenerationBackend::stream_results`]. Holds the live socket the results
/// will arrive on; mock backends build a detached one.
pub struct PendingRequest {
    /// Backend-assigned id correlating stream messages to this request.
    pub request_id: String,
    pub(crate) socket: Option<Socket>,
}

impl PendingRequest {
    /// A pending request without a live socket, for backend implementations
    /// that do not stream over a real connection (tests, shims).
    pub fn detached(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            socket: None,
        }
    }
}

/// Failures at the backend boundary.
///
/// All of these surface as job-level failures; none of them crash a worker.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Could not establish the streaming connection.
    #[error("{0}")]
    Connect(String),

    /// The HTTP request itself failed (connection refused, DNS, timeout).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// WebSocket transport failure mid-stream.
    #[error("socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The backend violated the expected message framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The backend reported a failed execution for this request.
    #[error("execution failed in node {node}: {message}")]
    Execution {
        /// Node that raised the error.
        node: String,
        /// Backend-provided failure message.
        message: String,
    },
}

/// Narrow interface to the external rendering service.
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Submit a request document for execution. Returns a handle carrying
    /// the backend-assigned request id.
    async fn submit_request(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<PendingRequest, BackendError>;

    /// Stream the ordered artifacts for an accepted request. Resolves once
    /// the backend signals end of execution.
    async fn stream_results(&self, pending: PendingRequest)
        -> Result<Vec<Artifact>, BackendError>;

    /// Ask the backend to unload models and free GPU memory. Advisory: the
    /// caller logs failures and moves on.
    async fn release_resources(&self) -> Result<(), BackendError>;
}
