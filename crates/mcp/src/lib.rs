//! MCP (Model Context Protocol) engine for toolpipe.
//!
//! This crate implements both sides of MCP over JSON-RPC 2.0, one JSON
//! document per line across a child process's standard streams.
//!
//! # Architecture
//!
//! - **types**: JSON-RPC 2.0 and MCP-specific protocol types
//! - **framing**: newline-delimited frame decoder over a byte stream
//! - **transport**: transport seams (stdio, in-memory channels)
//! - **process**: subprocess transport with child lifecycle management
//! - **server**: MCP server wrapping a `ToolRegistry`
//! - **client**: MCP client connecting to server subprocesses
//! - **error**: Unified error types
//!
//! # Usage
//!
//! ## Server
//! ```no_run
//! use toolpipe_mcp::server::McpServer;
//! use toolpipe_mcp::transport::StdioTransport;
//! use toolpipe_tools::ToolRegistry;
//!
//! # async fn example() {
//! let registry = ToolRegistry::new();
//! let mut server = McpServer::new(registry);
//! let mut transport = StdioTransport::new();
//! server.run(&mut transport).await.unwrap();
//! # }
//! ```
//!
//! ## Client
//! ```no_run
//! use toolpipe_mcp::client::McpClient;
//! use toolpipe_mcp::types::ClientInfo;
//!
//! # async fn example() {
//! let info = ClientInfo { name: "my-app".into(), version: None };
//! let client = McpClient::spawn("my-mcp-server", &[], info).await.unwrap();
//! let tools = client.list_tools().await.unwrap();
//! # }
//! ```

pub mod client;
pub mod error;
pub mod framing;
pub mod process;
pub mod server;
pub mod transport;
pub mod types;

pub use client::{McpClient, DEFAULT_CALL_TIMEOUT};
pub use error::McpError;
pub use framing::{FrameDecoder, DEFAULT_MAX_FRAME_BYTES};
pub use process::ProcessTransport;
pub use server::{McpServer, ServerState};
pub use transport::{
    ChannelClientTransport, ChannelTransport, ClientTransport, EventSink, ServerTransport,
    StdioTransport,
};
pub use types::*;
