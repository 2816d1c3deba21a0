//! Demo MCP server over stdio.
//!
//! Serves the demo tool catalog on stdin/stdout. Stdout carries protocol
//! frames only, so logging goes to stderr.

use toolpipe_mcp::server::McpServer;
use toolpipe_mcp::transport::StdioTransport;
use toolpipe_tools::demo_registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut server = McpServer::new(demo_registry()?)
        .with_name("toolpipe-demo-server", env!("CARGO_PKG_VERSION"));
    let mut transport = StdioTransport::new();
    server.run(&mut transport).await?;
    Ok(())
}
