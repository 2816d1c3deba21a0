//! Transport abstractions.
//!
//! Two seams, one per protocol side:
//!
//! - `ServerTransport` is pull-based: the server engine loops on
//!   `receive()` and replies with `send()`. Implementations: `StdioTransport`
//!   (the child process's own stdin/stdout) and `ChannelTransport` for
//!   in-memory testing.
//! - `ClientTransport` is event-driven: the client engine registers frame,
//!   error, and close callbacks on the transport's `EventSink` and background
//!   workers push into them. Implementations: `ProcessTransport` (spawns the
//!   server subprocess) and `ChannelClientTransport` for in-memory testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::McpError;
use crate::framing::FrameDecoder;

// ── Event sink (client side) ────────────────────────────────────────

pub type FrameHandler = Arc<dyn Fn(&str) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&McpError) + Send + Sync>;
pub type CloseHandler = Arc<dyn Fn(Option<i32>) + Send + Sync>;

/// Listener registry shared by a transport's background workers.
///
/// Handlers run in registration order. The close event fires at most once
/// per transport lifetime, whichever worker or teardown path gets there
/// first. Handlers are cloned out of the lock before invocation, so
/// emitting never holds a lock across user code.
#[derive(Default)]
pub struct EventSink {
    frame_handlers: Mutex<Vec<FrameHandler>>,
    error_handlers: Mutex<Vec<ErrorHandler>>,
    close_handlers: Mutex<Vec<CloseHandler>>,
    close_emitted: AtomicBool,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_frame(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.frame_handlers.lock().unwrap().push(Arc::new(handler));
    }

    pub fn on_error(&self, handler: impl Fn(&McpError) + Send + Sync + 'static) {
        self.error_handlers.lock().unwrap().push(Arc::new(handler));
    }

    pub fn on_close(&self, handler: impl Fn(Option<i32>) + Send + Sync + 'static) {
        self.close_handlers.lock().unwrap().push(Arc::new(handler));
    }

    pub fn emit_frame(&self, frame: &str) {
        let handlers: Vec<FrameHandler> = self.frame_handlers.lock().unwrap().clone();
        for handler in handlers {
            handler(frame);
        }
    }

    pub fn emit_error(&self, error: &McpError) {
        let handlers: Vec<ErrorHandler> = self.error_handlers.lock().unwrap().clone();
        if handlers.is_empty() {
            tracing::debug!(error = %error, "transport error with no listeners");
        }
        for handler in handlers {
            handler(error);
        }
    }

    /// Emit the close event. No-op after the first call.
    pub fn emit_close(&self, exit_status: Option<i32>) {
        if self.close_emitted.swap(true, Ordering::SeqCst) {
            return;
        }
        let handlers: Vec<CloseHandler> = self.close_handlers.lock().unwrap().clone();
        for handler in handlers {
            handler(exit_status);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close_emitted.load(Ordering::SeqCst)
    }
}

// ── Client-side transport seam ──────────────────────────────────────

/// Event-driven transport the client engine drives a session over.
#[async_trait]
pub trait ClientTransport: Send + Sync + 'static {
    /// Spawn the peer (where applicable) and start delivering events.
    /// Fails with `AlreadyStarted` on a second call.
    async fn start(&self) -> Result<(), McpError>;

    /// Write one frame. A missing line terminator is appended. Failures are
    /// returned *and* reported through the sink's error event.
    async fn send(&self, frame: &str) -> Result<(), McpError>;

    /// Tear the transport down. Idempotent; emits at most one close event.
    async fn close(&self);

    /// The listener registry events are delivered through.
    fn sink(&self) -> Arc<EventSink>;
}

// ── Server-side transport seam ──────────────────────────────────────

/// Pull-based transport for the server engine.
#[async_trait]
pub trait ServerTransport: Send {
    /// Read the next complete frame. Returns `None` when the peer is gone.
    async fn receive(&mut self) -> Result<Option<String>, McpError>;

    /// Write one frame followed by a line terminator.
    async fn send(&mut self, frame: &str) -> Result<(), McpError>;
}

/// Stdio transport: frames arrive on stdin through the frame decoder and
/// replies leave on stdout. Logging must go to stderr so stdout stays a
/// clean protocol channel.
pub struct StdioTransport {
    stdin: tokio::io::Stdin,
    stdout: tokio::io::Stdout,
    decoder: FrameDecoder,
    ready: std::collections::VecDeque<String>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            stdin: tokio::io::stdin(),
            stdout: tokio::io::stdout(),
            decoder: FrameDecoder::new(),
            ready: std::collections::VecDeque::new(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServerTransport for StdioTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }
            let mut chunk = [0u8; 4096];
            let n = self.stdin.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None); // EOF
            }
            self.ready.extend(self.decoder.push(&chunk[..n])?);
        }
    }

    async fn send(&mut self, frame: &str) -> Result<(), McpError> {
        self.stdout.write_all(frame.as_bytes()).await?;
        if !frame.ends_with('\n') {
            self.stdout.write_all(b"\n").await?;
        }
        self.stdout.flush().await?;
        Ok(())
    }
}

/// In-memory transport for testing, backed by channel pairs.
pub struct ChannelTransport {
    rx: tokio::sync::mpsc::Receiver<String>,
    tx: tokio::sync::mpsc::Sender<String>,
}

impl ChannelTransport {
    /// Create a pair of connected transports for testing.
    ///
    /// Frames sent on one transport are received by the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = tokio::sync::mpsc::channel(32);
        let (tx_b, rx_a) = tokio::sync::mpsc::channel(32);
        (
            Self { rx: rx_a, tx: tx_a },
            Self { rx: rx_b, tx: tx_b },
        )
    }
}

#[async_trait]
impl ServerTransport for ChannelTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        Ok(self.rx.recv().await)
    }

    async fn send(&mut self, frame: &str) -> Result<(), McpError> {
        self.tx
            .send(frame.trim_end_matches('\n').to_string())
            .await
            .map_err(|_| McpError::TransportClosed)?;
        Ok(())
    }
}

/// Client-side in-memory transport, the event-driven counterpart of
/// `ChannelTransport`. Lets a client engine talk to a server engine (or a
/// test script) without a child process.
pub struct ChannelClientTransport {
    tx: Mutex<Option<tokio::sync::mpsc::Sender<String>>>,
    rx: Mutex<Option<tokio::sync::mpsc::Receiver<String>>>,
    sink: Arc<EventSink>,
    started: AtomicBool,
}

impl ChannelClientTransport {
    /// Create a connected (client transport, server transport) pair.
    pub fn pair() -> (Self, ChannelTransport) {
        let (tx_client, rx_server) = tokio::sync::mpsc::channel(32);
        let (tx_server, rx_client) = tokio::sync::mpsc::channel(32);
        (
            Self {
                tx: Mutex::new(Some(tx_client)),
                rx: Mutex::new(Some(rx_client)),
                sink: Arc::new(EventSink::new()),
                started: AtomicBool::new(false),
            },
            ChannelTransport {
                rx: rx_server,
                tx: tx_server,
            },
        )
    }
}

#[async_trait]
impl ClientTransport for ChannelClientTransport {
    async fn start(&self) -> Result<(), McpError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(McpError::AlreadyStarted);
        }
        let mut rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or(McpError::TransportClosed)?;
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                sink.emit_frame(&frame);
            }
            sink.emit_close(None);
        });
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), McpError> {
        let tx = self.tx.lock().unwrap().clone();
        match tx {
            Some(tx) => {
                let trimmed = frame.trim_end_matches('\n').to_string();
                if tx.send(trimmed).await.is_err() {
                    self.sink.emit_error(&McpError::TransportClosed);
                    return Err(McpError::TransportClosed);
                }
                Ok(())
            }
            None => {
                self.sink.emit_error(&McpError::TransportClosed);
                Err(McpError::TransportClosed)
            }
        }
    }

    async fn close(&self) {
        self.tx.lock().unwrap().take();
        self.sink.emit_close(None);
    }

    fn sink(&self) -> Arc<EventSink> {
        Arc::clone(&self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_channel_transport_pair() {
        let (mut a, mut b) = ChannelTransport::pair();

        a.send("hello from a").await.unwrap();
        let msg = b.receive().await.unwrap();
        assert_eq!(msg, Some("hello from a".to_string()));

        b.send("hello from b").await.unwrap();
        let msg = a.receive().await.unwrap();
        assert_eq!(msg, Some("hello from b".to_string()));
    }

    #[tokio::test]
    async fn test_channel_transport_closed() {
        let (mut a, b) = ChannelTransport::pair();
        drop(b);
        let result = a.receive().await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_event_sink_delivery_order() {
        let sink = EventSink::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            sink.on_frame(move |_| log.lock().unwrap().push(tag));
        }
        sink.emit_frame("{}");
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_event_sink_close_fires_once() {
        let sink = EventSink::new();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        sink.on_close(move |_| *c.lock().unwrap() += 1);
        sink.emit_close(Some(0));
        sink.emit_close(Some(1));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_channel_client_transport_roundtrip() {
        let (client, mut server) = ChannelClientTransport::pair();
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&received);
        client.sink().on_frame(move |f| r.lock().unwrap().push(f.to_string()));
        client.start().await.unwrap();

        client.send("{\"a\":1}").await.unwrap();
        assert_eq!(server.receive().await.unwrap(), Some("{\"a\":1}".to_string()));

        server.send("{\"b\":2}").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*received.lock().unwrap(), vec!["{\"b\":2}".to_string()]);
    }

    #[tokio::test]
    async fn test_channel_client_transport_double_start() {
        let (client, _server) = ChannelClientTransport::pair();
        client.start().await.unwrap();
        assert!(matches!(client.start().await, Err(McpError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_send_after_close_fails_cleanly() {
        let (client, _server) = ChannelClientTransport::pair();
        client.start().await.unwrap();
        client.close().await;
        assert!(matches!(
            client.send("{}").await,
            Err(McpError::TransportClosed)
        ));
    }
}
