//! Typed view of the backend's WebSocket text messages.
//!
//! ComfyUI sends JSON frames shaped `{"type": "<kind>", "data": {...}}`.
//! Only a few kinds matter to the streaming loop (`executing` marks node
//! transitions and completion, `execution_error` aborts the request); the
//! rest are broadcast noise that callers ignore, along with any unknown
//! kinds newer server versions may add.

use serde::Deserialize;

/// Backend WebSocket messages the streaming loop inspects.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WireMessage {
    /// Queue-depth broadcast. Ignored.
    #[serde(rename = "status")]
    Status(serde_json::Value),

    /// A request began executing.
    #[serde(rename = "execution_start")]
    ExecutionStart {
        /// Request this message belongs to.
        prompt_id: String,
    },

    /// Node outputs served from cache. Ignored.
    #[serde(rename = "execution_cached")]
    ExecutionCached(serde_json::Value),

    /// Node transition: `node` names the node now running, or is `null`
    /// when execution of the request has finished.
    #[serde(rename = "executing")]
    Executing {
        /// Currently executing node, `None` at end of execution.
        node: Option<String>,
        /// Request this message belongs to.
        prompt_id: String,
    },

    /// Step-level progress within a node. Ignored.
    #[serde(rename = "progress")]
    Progress {
        /// Current step.
        value: u32,
        /// Total steps.
        max: u32,
    },

    /// A node finished and produced output metadata. Ignored - artifact
    /// bytes arrive on binary frames instead.
    #[serde(rename = "executed")]
    Executed(serde_json::Value),

    /// Execution failed.
    #[serde(rename = "execution_error")]
    ExecutionError(ExecutionErrorData),
}

/// Payload of an `execution_error` message.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionErrorData {
    /// Request that failed.
    pub prompt_id: String,
    /// Node that raised the error.
    pub node_id: String,
    /// Human-readable failure message.
    pub exception_message: String,
}

/// Parse one text frame.
///
/// Errors for malformed JSON or unknown `type` values; the streaming loop
/// logs and skips those rather than failing the request.
pub fn parse_wire_message(text: &str) -> Result<WireMessage, serde_json::Error> {
    serde_json::from_str(text)
}
