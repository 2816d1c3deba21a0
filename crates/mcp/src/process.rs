//! Child-process transport.
//!
//! `ProcessTransport` owns one server subprocess and its three standard
//! streams. Frames go out on the child's stdin; three background workers
//! funnel inbound traffic into the shared `EventSink`:
//!
//! - stdout reader: raw chunks through the `FrameDecoder`, emitted as
//!   frame events;
//! - stderr forwarder: one non-fatal error event per line;
//! - exit monitor: polls for an unprompted child exit and emits the close
//!   event with its status. An already-reaped child is a race against an
//!   explicit close, not an error.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::McpError;
use crate::framing::FrameDecoder;
use crate::transport::{ClientTransport, EventSink};

/// How long to wait for the child to exit after its stdin is closed.
const GRACE_PERIOD: Duration = Duration::from_secs(2);
/// How long to wait after sending the terminate signal.
const TERM_PERIOD: Duration = Duration::from_secs(1);
/// Poll interval for the exit monitor and the close waits.
const EXIT_POLL: Duration = Duration::from_millis(50);

/// Stdio transport over a spawned subprocess.
pub struct ProcessTransport {
    program: String,
    args: Vec<String>,
    sink: Arc<EventSink>,
    stdin: Mutex<Option<ChildStdin>>,
    child: Arc<Mutex<Option<Child>>>,
    started: AtomicBool,
    closing: AtomicBool,
    max_frame: usize,
}

impl ProcessTransport {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            sink: Arc::new(EventSink::new()),
            stdin: Mutex::new(None),
            child: Arc::new(Mutex::new(None)),
            started: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            max_frame: crate::framing::DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Override the framer's buffer bound.
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Wait up to `timeout` for the child to exit, reaping it on success.
    ///
    /// Returns `None` while the child is still running; `Some(status)` once
    /// it is gone (status unknown when another path already reaped it).
    async fn wait_exit(&self, timeout: Duration) -> Option<Option<i32>> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut guard = self.child.lock().await;
                match guard.as_mut() {
                    None => return Some(None),
                    Some(child) => {
                        if let Ok(Some(status)) = child.try_wait() {
                            guard.take();
                            return Some(status.code());
                        }
                    }
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }

    /// Ask the child to terminate gracefully.
    ///
    /// On Unix this sends SIGTERM via the kill command; tokio's own kill is
    /// SIGKILL and skips the child's chance to clean up.
    async fn terminate(&self) {
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return;
        };
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                let _ = std::process::Command::new("kill")
                    .args(["-TERM", &pid.to_string()])
                    .output();
                tracing::debug!(pid = pid, "sent SIGTERM");
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }
    }
}

#[async_trait]
impl ClientTransport for ProcessTransport {
    async fn start(&self) -> Result<(), McpError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(McpError::AlreadyStarted);
        }

        tracing::info!(program = %self.program, "spawning MCP server process");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Connection("failed to capture child stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Connection("failed to capture child stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::Connection("failed to capture child stderr".to_string()))?;

        *self.stdin.lock().await = Some(stdin);
        *self.child.lock().await = Some(child);

        // Worker 1: stdout reader/framer.
        let sink = Arc::clone(&self.sink);
        let max_frame = self.max_frame;
        tokio::spawn(async move {
            let mut stdout = stdout;
            let mut decoder = FrameDecoder::with_max_frame(max_frame);
            let mut chunk = [0u8; 4096];
            loop {
                match stdout.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => match decoder.push(&chunk[..n]) {
                        Ok(frames) => {
                            for frame in frames {
                                sink.emit_frame(&frame);
                            }
                        }
                        Err(e) => sink.emit_error(&e),
                    },
                    Err(e) => {
                        sink.emit_error(&McpError::Transport(e));
                        break;
                    }
                }
            }
            tracing::debug!("stdout reader finished");
        });

        // Worker 2: stderr line forwarder.
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                sink.emit_error(&McpError::Stderr(line));
            }
            tracing::debug!("stderr forwarder finished");
        });

        // Worker 3: exit monitor.
        let sink = Arc::clone(&self.sink);
        let child_slot = Arc::clone(&self.child);
        tokio::spawn(async move {
            loop {
                {
                    let mut guard = child_slot.lock().await;
                    match guard.as_mut() {
                        // Explicit close got there first.
                        None => break,
                        Some(child) => match child.try_wait() {
                            Ok(Some(status)) => {
                                guard.take();
                                drop(guard);
                                tracing::debug!(code = ?status.code(), "child exited");
                                sink.emit_close(status.code());
                                break;
                            }
                            Ok(None) => {}
                            Err(_) => break,
                        },
                    }
                }
                tokio::time::sleep(EXIT_POLL).await;
            }
        });

        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), McpError> {
        let mut guard = self.stdin.lock().await;
        let Some(writer) = guard.as_mut() else {
            let err = McpError::TransportClosed;
            self.sink.emit_error(&err);
            return Err(err);
        };

        let mut outcome = writer.write_all(frame.as_bytes()).await;
        if outcome.is_ok() && !frame.ends_with('\n') {
            outcome = writer.write_all(b"\n").await;
        }
        if outcome.is_ok() {
            outcome = writer.flush().await;
        }

        if let Err(e) = outcome {
            // Broken pipe: drop the writer so later sends fail fast.
            guard.take();
            let err = McpError::Transport(e);
            self.sink.emit_error(&err);
            return Err(err);
        }
        Ok(())
    }

    async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        // Signal end of writes.
        self.stdin.lock().await.take();

        // Give the child a grace period to exit on its own.
        if let Some(status) = self.wait_exit(GRACE_PERIOD).await {
            self.sink.emit_close(status);
            return;
        }

        self.terminate().await;
        if let Some(status) = self.wait_exit(TERM_PERIOD).await {
            self.sink.emit_close(status);
            return;
        }

        // Still alive: force kill and reap.
        let taken = self.child.lock().await.take();
        if let Some(mut child) = taken {
            tracing::warn!(program = %self.program, "child did not terminate, killing");
            let _ = child.kill().await;
            let status = child.wait().await.ok().and_then(|s| s.code());
            self.sink.emit_close(status);
        }
    }

    fn sink(&self) -> Arc<EventSink> {
        Arc::clone(&self.sink)
    }
}
