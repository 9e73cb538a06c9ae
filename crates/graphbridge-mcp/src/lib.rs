//! MCP (Model Context Protocol) client used to reach the knowledge-graph service.
//!
//! The knowledge-graph service is only reachable as a child process speaking
//! JSON-RPC 2.0 over stdio. This crate owns that channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpClient                                                  │
//! │  - open: spawn + initialize handshake (bounded)             │
//! │  - tools/list, tools/call (bounded per request)             │
//! │  - shutdown: close stdin, grace period, kill                │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpTransport                                               │
//! │  - writer task → child stdin (newline or Content-Length)    │
//! │  - reader task ← child stdout, routes responses by id       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use graphbridge_mcp::{McpClient, McpServerConfig};
//!
//! let config = McpServerConfig::new("graphiti-mcp", "python")
//!     .with_arg("-m")
//!     .with_arg("graphiti_mcp.server");
//!
//! let mut client = McpClient::open(config).await?;
//! let result = client
//!     .call_tool("add_episode", Some(json!({"content": "...", "group_id": "market_signals"})))
//!     .await?;
//! client.shutdown().await?;
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, McpClient, McpServerConfig,
    SERVER_NAME_ENV,
};
pub use error::{McpError, Result};
pub use protocol::{
    CallToolParams, CallToolResult, IncomingMessage, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolContent, ToolInfo,
};
pub use transport::{Framing, FrameReader, McpTransport, encode_frame};
