//! Error types for the MCP crate.
//!
//! One enum covers the whole taxonomy: transport failures, version
//! negotiation failures (always fatal to the session), connection-level
//! problems, tool failures surfaced to `call_tool` callers, and request
//! timeouts. `to_rpc_error` maps each variant onto the wire-level code
//! catalog.

use serde_json::json;
use std::time::Duration;

use crate::types::{error_codes, JsonRpcError};

/// Errors that can occur during MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Failed to parse JSON.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Transport I/O failure (spawn, pipe write, stream read).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// `start()` was called twice on the same transport instance.
    #[error("transport already started")]
    AlreadyStarted,

    /// A send raced or followed a close.
    #[error("transport closed")]
    TransportClosed,

    /// The framer's accumulation buffer exceeded its bound.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    /// One line of the child process's stderr, forwarded as a non-fatal event.
    #[error("server stderr: {0}")]
    Stderr(String),

    /// Handshake/version mismatch. Fatal to the session.
    #[error("unsupported protocol version: {requested} (supported: {supported:?})")]
    ProtocolVersion {
        requested: String,
        supported: Vec<String>,
    },

    /// Malformed frame or unsolicited server-side error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The requested method is not supported.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// A message whose `jsonrpc` field is not the supported constant.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid parameters for a method.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The requested tool was not found in the registry.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Tool-level failure reported by the server to a `call_tool` caller.
    #[error("tool execution failed: {message}")]
    Tool { code: i64, message: String },

    /// No response arrived within the configured deadline.
    #[error("request '{method}' timed out after {timeout:?}")]
    RequestTimeout { method: String, timeout: Duration },

    /// Catch-all for failures inside the dispatch loop.
    #[error("internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// Convert to a JSON-RPC error object using the normative code catalog.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let code = match self {
            McpError::JsonParse(_) | McpError::FrameTooLarge { .. } => error_codes::PARSE_ERROR,
            McpError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            McpError::UnknownTool(_) => error_codes::TOOL_EXECUTION_ERROR,
            McpError::Tool { code, .. } => *code,
            McpError::ProtocolVersion { .. } => error_codes::PROTOCOL_ERROR,
            _ => error_codes::INTERNAL_ERROR,
        };
        let data = match self {
            McpError::ProtocolVersion { supported, .. } => {
                Some(json!({ "supportedVersions": supported }))
            }
            _ => None,
        };
        JsonRpcError {
            code,
            message: self.to_string(),
            data,
        }
    }
}
