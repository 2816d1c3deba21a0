//! MCP server engine.
//!
//! Owns a tool registry and serves one session over a pull-style transport.
//! Message processing is a pure function of (state, frame) to an optional
//! reply, so the dispatch table is testable without any transport at all;
//! `run` just pumps frames through it. A `catch_unwind` safety net around
//! each message turns a dispatch panic into an internal-error reply
//! addressed to the offending request, and the loop keeps serving.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use toolpipe_tools::{RegistryError, ToolRegistry};

use crate::error::McpError;
use crate::transport::ServerTransport;
use crate::types::*;

/// Lifecycle of one server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    Initialized,
    ShuttingDown,
    Stopped,
}

type StubHandler = Box<dyn Fn(Option<Value>) -> Result<Value, McpError> + Send>;

/// An MCP server: registry, identity, session state, and the dispatch table.
pub struct McpServer {
    registry: ToolRegistry,
    info: ServerInfo,
    state: ServerState,
    overrides: HashMap<String, StubHandler>,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
            state: ServerState::Uninitialized,
            overrides: HashMap::new(),
        }
    }

    /// Set the identity advertised in the `initialize` result.
    pub fn with_name(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.info = ServerInfo {
            name: name.into(),
            version: Some(version.into()),
        };
        self
    }

    /// Install an application handler for a method, replacing the built-in
    /// behavior. Intended for the `resources/list`, `roots/list` and
    /// `sampling/*` stubs.
    pub fn override_method(
        &mut self,
        method: impl Into<String>,
        handler: impl Fn(Option<Value>) -> Result<Value, McpError> + Send + 'static,
    ) {
        self.overrides.insert(method.into(), Box::new(handler));
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serve one session until the transport reaches EOF or a shutdown
    /// request stops the server.
    pub async fn run<T: ServerTransport>(&mut self, transport: &mut T) -> Result<(), McpError> {
        tracing::info!(server = %self.info.name, "serving MCP session");
        while self.state != ServerState::Stopped {
            let Some(line) = transport.receive().await? else {
                tracing::info!("transport reached end of input");
                break;
            };

            let reply = catch_unwind(AssertUnwindSafe(|| self.process(&line)))
                .unwrap_or_else(|_| Some(panicked_reply(&line)));
            if let Some(reply) = reply {
                let frame = serde_json::to_string(&reply)?;
                transport.send(&frame).await?;
            }

            // The shutdown ack goes out before the stop takes effect.
            if self.state == ServerState::ShuttingDown {
                self.state = ServerState::Stopped;
                tracing::info!("server stopped");
            }
        }
        Ok(())
    }

    /// Process one inbound frame and produce the reply, if any.
    fn process(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                // Unparseable input cannot be correlated; reply with a null id.
                return Some(JsonRpcResponse::error(
                    RpcId::Null,
                    McpError::JsonParse(e).to_rpc_error(),
                ));
            }
        };

        let id: Option<RpcId> = value
            .get("id")
            .map(|raw| serde_json::from_value(raw.clone()).unwrap_or(RpcId::Null));

        if value.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            let err = McpError::InvalidRequest("missing or invalid jsonrpc field".to_string());
            return id.map(|id| JsonRpcResponse::error(id, err.to_rpc_error()));
        }

        let Some(method) = value.get("method").and_then(Value::as_str).map(String::from) else {
            let err = McpError::InvalidRequest("missing method field".to_string());
            return id.map(|id| JsonRpcResponse::error(id, err.to_rpc_error()));
        };
        let params = value.get("params").cloned();

        match id {
            Some(id) => Some(self.dispatch(id, &method, params)),
            None => {
                self.handle_notification(&method);
                None
            }
        }
    }

    fn handle_notification(&mut self, method: &str) {
        match method {
            "initialized" => tracing::info!("client confirmed initialization"),
            "shutdown" => self.begin_shutdown(),
            other => tracing::debug!(method = %other, "ignoring unknown notification"),
        }
    }

    fn dispatch(&mut self, id: RpcId, method: &str, params: Option<Value>) -> JsonRpcResponse {
        tracing::debug!(method = %method, "dispatching request");
        if let Some(handler) = self.overrides.get(method) {
            return match handler(params) {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(e) => JsonRpcResponse::error(id, e.to_rpc_error()),
            };
        }

        match method {
            "initialize" => self.handle_initialize(id, params),
            "tools/list" => {
                let tools: Vec<ToolInfo> = self
                    .registry
                    .definitions()
                    .into_iter()
                    .map(ToolInfo::from)
                    .collect();
                success_reply(id, &ListToolsResult { tools })
            }
            "tools/call" => self.handle_call(id, params),
            "resources/list" => JsonRpcResponse::success(id, json!({ "resources": [] })),
            "roots/list" => JsonRpcResponse::success(id, json!({ "roots": [] })),
            "sampling/prepare" | "sampling/sample" => {
                JsonRpcResponse::success(id, json!({ "notImplemented": true }))
            }
            "shutdown" => {
                self.begin_shutdown();
                JsonRpcResponse::success(id, json!({}))
            }
            other => JsonRpcResponse::error(
                id,
                McpError::MethodNotFound(other.to_string()).to_rpc_error(),
            ),
        }
    }

    fn handle_initialize(&mut self, id: RpcId, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::error(id, e.to_rpc_error()),
        };

        // Version negotiation is stateless per message; a mismatch replies
        // without touching durable state.
        if !SUPPORTED_VERSIONS.contains(&params.protocol_version.as_str()) {
            let err = McpError::ProtocolVersion {
                requested: params.protocol_version,
                supported: SUPPORTED_VERSIONS.iter().map(|s| s.to_string()).collect(),
            };
            return JsonRpcResponse::error(id, err.to_rpc_error());
        }

        if self.state == ServerState::Uninitialized {
            self.state = ServerState::Initialized;
        }
        tracing::info!(client = %params.client_info.name, "session initialized");

        let result = InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: self.info.clone(),
        };
        success_reply(id, &result)
    }

    fn handle_call(&mut self, id: RpcId, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::error(id, e.to_rpc_error()),
        };

        match self.registry.invoke(&params.name, &params.arguments) {
            // Body failures arrive as error envelopes and ship as results.
            Ok(envelope) => JsonRpcResponse::success(id, envelope),
            Err(RegistryError::UnknownTool(name)) => {
                JsonRpcResponse::error(id, McpError::UnknownTool(name).to_rpc_error())
            }
            Err(other) => JsonRpcResponse::error(
                id,
                McpError::Internal(other.to_string()).to_rpc_error(),
            ),
        }
    }

    fn begin_shutdown(&mut self) {
        if self.state != ServerState::Stopped {
            self.state = ServerState::ShuttingDown;
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, McpError> {
    let params = params.ok_or_else(|| McpError::InvalidParams("missing params".to_string()))?;
    serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))
}

fn success_reply<T: Serialize>(id: RpcId, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, McpError::JsonParse(e).to_rpc_error()),
    }
}

/// Internal-error reply for a message whose dispatch panicked, addressed to
/// the original id when one can be recovered.
fn panicked_reply(line: &str) -> JsonRpcResponse {
    let id = serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("id").cloned())
        .and_then(|raw| serde_json::from_value(raw).ok())
        .unwrap_or(RpcId::Null);
    let err = McpError::Internal("message processing panicked".to_string());
    JsonRpcResponse::error(id, err.to_rpc_error())
}
