//! MCP client engine.
//!
//! Drives one session as caller over an event-driven transport: allocates
//! request ids, correlates responses, performs the startup handshake, and
//! exposes deadline-bounded call semantics over the asynchronous channel.
//!
//! `connect` returns before the handshake completes; the handshake outcome
//! is observable through `wait_initialized` and the registered error
//! handlers, never through `connect`'s own result. Background failures are
//! delivered to handlers in registration order; a default logging handler
//! is always installed so an unhandled error is an explicit, inspectable
//! state rather than a crash.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::McpError;
use crate::process::ProcessTransport;
use crate::transport::ClientTransport;
use crate::types::*;

/// Default deadline for `list_tools`/`call_tool`.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound between predicate rechecks while waiting for a response, so
/// a missed or coalesced wakeup cannot block a caller indefinitely.
const WAIT_POLL: Duration = Duration::from_millis(100);

type ClientErrorHandler = Arc<dyn Fn(&McpError) + Send + Sync>;

/// Client-side record of an outstanding request. The slot is kept after its
/// response arrives so the response stays addressable by id.
struct Pending {
    method: String,
    response: Option<JsonRpcResponse>,
}

#[derive(Default)]
struct SessionState {
    initialized: bool,
    handshake_failed: bool,
    protocol_version: Option<String>,
    server_info: Option<ServerInfo>,
    server_capabilities: Option<ServerCapabilities>,
    closed: bool,
}

struct ClientInner {
    transport: Arc<dyn ClientTransport>,
    pending: Mutex<HashMap<i64, Pending>>,
    wakeup: Notify,
    session: Mutex<SessionState>,
    next_id: AtomicI64,
    init_id: AtomicI64,
    handlers: Mutex<Vec<ClientErrorHandler>>,
    close_once: AtomicBool,
}

/// An MCP client session over an event-driven transport.
pub struct McpClient {
    inner: Arc<ClientInner>,
}

impl McpClient {
    /// Spawn an MCP server subprocess and connect to it.
    pub async fn spawn(program: &str, args: &[&str], info: ClientInfo) -> Result<Self, McpError> {
        Self::connect(Arc::new(ProcessTransport::new(program, args)), info).await
    }

    /// Wire up a transport and begin the handshake.
    ///
    /// The frame/error/close callbacks are registered, the transport is
    /// started, and the `initialize` request is sent. The handshake then
    /// completes (or fails) in the background.
    pub async fn connect(
        transport: Arc<dyn ClientTransport>,
        info: ClientInfo,
    ) -> Result<Self, McpError> {
        let inner = Arc::new(ClientInner {
            transport,
            pending: Mutex::new(HashMap::new()),
            wakeup: Notify::new(),
            session: Mutex::new(SessionState::default()),
            next_id: AtomicI64::new(1),
            init_id: AtomicI64::new(0),
            handlers: Mutex::new(vec![Arc::new(|e: &McpError| {
                tracing::warn!(error = %e, "unhandled MCP client error");
            }) as ClientErrorHandler]),
            close_once: AtomicBool::new(false),
        });

        let sink = inner.transport.sink();
        let weak = Arc::downgrade(&inner);
        sink.on_frame(move |raw| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_frame(raw);
            }
        });
        let weak = Arc::downgrade(&inner);
        sink.on_error(move |err| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch_error(err);
            }
        });
        let weak = Arc::downgrade(&inner);
        sink.on_close(move |_status| {
            if let Some(inner) = weak.upgrade() {
                inner.session.lock().unwrap().closed = true;
                inner.wakeup.notify_waiters();
            }
        });

        inner.transport.start().await?;

        let id = inner.alloc_id();
        inner.init_id.store(id, Ordering::SeqCst);
        inner.pending.lock().unwrap().insert(
            id,
            Pending {
                method: "initialize".to_string(),
                response: None,
            },
        );

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": serde_json::to_value(&info)?,
        });
        let request = JsonRpcRequest::new(RpcId::Number(id), "initialize", Some(params));
        inner.transport.send(&serde_json::to_string(&request)?).await?;

        Ok(Self { inner })
    }

    /// Register a handler for background/unsolicited errors. Handlers are
    /// invoked in registration order.
    pub fn on_error(&self, handler: impl Fn(&McpError) + Send + Sync + 'static) {
        self.inner.handlers.lock().unwrap().push(Arc::new(handler));
    }

    /// Whether a version-matched handshake has completed.
    pub fn initialized(&self) -> bool {
        self.inner.session.lock().unwrap().initialized
    }

    /// The negotiated protocol version, once the handshake has completed.
    pub fn protocol_version(&self) -> Option<String> {
        self.inner.session.lock().unwrap().protocol_version.clone()
    }

    /// The server's identity, once the handshake has completed.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.inner.session.lock().unwrap().server_info.clone()
    }

    /// The server's capabilities, once the handshake has completed.
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.inner
            .session
            .lock()
            .unwrap()
            .server_capabilities
            .clone()
    }

    /// Block until the handshake completes, fails, or the deadline elapses.
    pub async fn wait_initialized(&self, timeout: Duration) -> Result<(), McpError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let session = self.inner.session.lock().unwrap();
                if session.initialized {
                    return Ok(());
                }
                if session.handshake_failed {
                    return Err(McpError::Connection(
                        "handshake failed: unsupported protocol version".to_string(),
                    ));
                }
                if session.closed {
                    return Err(McpError::TransportClosed);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(McpError::RequestTimeout {
                    method: "initialize".to_string(),
                    timeout,
                });
            }
            let wait = WAIT_POLL.min(deadline - now);
            let _ = tokio::time::timeout(wait, self.inner.wakeup.notified()).await;
        }
    }

    /// List the server's tools, waiting up to the default deadline.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, McpError> {
        self.list_tools_with_timeout(DEFAULT_CALL_TIMEOUT).await
    }

    pub async fn list_tools_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Vec<ToolInfo>, McpError> {
        let response = self.request("tools/list", None, timeout).await?;
        if let Some(err) = response.error {
            return Err(McpError::Connection(format!(
                "tools/list failed: {} (code {})",
                err.message, err.code
            )));
        }
        let result: ListToolsResult = serde_json::from_value(
            response
                .result
                .ok_or_else(|| McpError::Connection("tools/list reply missing result".into()))?,
        )?;
        Ok(result.tools)
    }

    /// Call a tool, waiting up to the default deadline.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        self.call_tool_with_timeout(name, arguments, DEFAULT_CALL_TIMEOUT)
            .await
    }

    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<CallToolResult, McpError> {
        let params = json!({ "name": name, "arguments": arguments });
        let response = self.request("tools/call", Some(params), timeout).await?;
        if let Some(err) = response.error {
            return Err(McpError::Tool {
                code: err.code,
                message: err.message,
            });
        }
        let result: CallToolResult = serde_json::from_value(
            response
                .result
                .ok_or_else(|| McpError::Connection("tools/call reply missing result".into()))?,
        )?;
        Ok(result)
    }

    /// Close the session. Idempotent: the transport is closed at most once.
    pub async fn close(&self) {
        self.inner.close_transport().await;
    }

    /// Issue one request and wait for its correlated response.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.inner.alloc_id();
        self.inner.pending.lock().unwrap().insert(
            id,
            Pending {
                method: method.to_string(),
                response: None,
            },
        );

        let request = JsonRpcRequest::new(RpcId::Number(id), method, params);
        tracing::debug!(method = %method, id = id, "sending request");
        self.inner
            .transport
            .send(&serde_json::to_string(&request)?)
            .await?;

        self.inner.wait_response(id, method, timeout).await
    }
}

impl ClientInner {
    fn alloc_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Wait until a response for `id` is recorded or the deadline elapses.
    ///
    /// Rechecks the predicate on every wakeup and at least every `WAIT_POLL`
    /// so a coalesced notification cannot cause indefinite blocking.
    async fn wait_response(
        &self,
        id: i64,
        method: &str,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, McpError> {
        let deadline = Instant::now() + timeout;
        loop {
            let recorded = {
                let pending = self.pending.lock().unwrap();
                pending.get(&id).and_then(|slot| slot.response.clone())
            };
            if let Some(response) = recorded {
                return Ok(response);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(McpError::RequestTimeout {
                    method: method.to_string(),
                    timeout,
                });
            }
            let wait = WAIT_POLL.min(deadline - now);
            let _ = tokio::time::timeout(wait, self.wakeup.notified()).await;
        }
    }

    /// Inbound frame dispatch, invoked from the transport's reader worker.
    fn handle_frame(self: &Arc<Self>, raw: &str) {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                self.dispatch_error(&McpError::Connection(format!("unparseable frame: {e}")));
                return;
            }
        };

        // A version-negotiation failure may arrive without a correlated id;
        // detect it before id routing.
        if let Some(err_obj) = value.get("error") {
            let code = err_obj.get("code").and_then(Value::as_i64);
            let message = err_obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if code == Some(error_codes::PROTOCOL_ERROR)
                && message.to_ascii_lowercase().contains("version")
            {
                let supported = err_obj
                    .pointer("/data/supportedVersions")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                self.fail_handshake(McpError::ProtocolVersion {
                    requested: PROTOCOL_VERSION.to_string(),
                    supported,
                });
                return;
            }
        }

        let Some(id) = value.get("id").and_then(Value::as_i64) else {
            tracing::debug!("ignoring frame without a numeric id");
            return;
        };

        let response: JsonRpcResponse = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                self.dispatch_error(&McpError::Connection(format!("malformed response: {e}")));
                return;
            }
        };

        // Record only ids we issued; a response for an unknown id is
        // discarded, not an error.
        {
            let mut pending = self.pending.lock().unwrap();
            match pending.get_mut(&id) {
                Some(slot) => {
                    tracing::debug!(id = id, method = %slot.method, "response recorded");
                    slot.response = Some(response.clone());
                }
                None => {
                    tracing::debug!(id = id, "response for unknown id discarded");
                    return;
                }
            }
        }
        self.wakeup.notify_waiters();

        if id == self.init_id.load(Ordering::SeqCst) {
            self.complete_handshake(response);
        } else if let Some(err) = response.error {
            self.dispatch_error(&McpError::Connection(format!(
                "server error for request {id}: {} (code {})",
                err.message, err.code
            )));
        }
    }

    /// Handshake completion for the `initialize` response.
    fn complete_handshake(self: &Arc<Self>, response: JsonRpcResponse) {
        if let Some(err) = response.error {
            let supported = err
                .data
                .as_ref()
                .and_then(|d| d.get("supportedVersions"))
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            self.fail_handshake(McpError::ProtocolVersion {
                requested: PROTOCOL_VERSION.to_string(),
                supported,
            });
            return;
        }

        let result: InitializeResult = match response
            .result
            .ok_or_else(|| McpError::Connection("initialize reply missing result".into()))
            .and_then(|v| serde_json::from_value(v).map_err(McpError::from))
        {
            Ok(r) => r,
            Err(e) => {
                self.fail_handshake(e);
                return;
            }
        };

        if !SUPPORTED_VERSIONS.contains(&result.protocol_version.as_str()) {
            self.fail_handshake(McpError::ProtocolVersion {
                requested: result.protocol_version,
                supported: SUPPORTED_VERSIONS.iter().map(|s| s.to_string()).collect(),
            });
            return;
        }

        {
            let mut session = self.session.lock().unwrap();
            session.initialized = true;
            session.protocol_version = Some(result.protocol_version);
            session.server_info = Some(result.server_info);
            session.server_capabilities = Some(result.capabilities);
        }
        self.wakeup.notify_waiters();
        tracing::info!("MCP handshake complete");

        // Confirm the handshake; no response is expected.
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let notif = JsonRpcNotification::new("initialized", None);
            if let Ok(json) = serde_json::to_string(&notif) {
                let _ = inner.transport.send(&json).await;
            }
        });
    }

    /// A failed handshake closes the session and is reported only to the
    /// registered handlers; `initialized` stays false.
    fn fail_handshake(self: &Arc<Self>, err: McpError) {
        {
            let mut session = self.session.lock().unwrap();
            session.handshake_failed = true;
            session.initialized = false;
        }
        self.wakeup.notify_waiters();
        self.dispatch_error(&err);

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.close_transport().await;
        });
    }

    async fn close_transport(&self) {
        if self.close_once.swap(true, Ordering::SeqCst) {
            return;
        }
        self.transport.close().await;
    }

    fn dispatch_error(&self, err: &McpError) {
        let handlers: Vec<ClientErrorHandler> = self.handlers.lock().unwrap().clone();
        for handler in handlers {
            handler(err);
        }
    }
}
