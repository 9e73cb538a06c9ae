//! MCP client for one knowledge-graph server.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;

use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, ListToolsResult, ServerInfo, ToolInfo,
};
use crate::transport::{Framing, McpTransport};

/// Environment variable that tells the spawned server who it is.
pub const SERVER_NAME_ENV: &str = "MCP_SERVER_NAME";

/// Default bound on the initialize exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for spawning and talking to an MCP server.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Server identity, exported to the child as `MCP_SERVER_NAME`.
    pub name: String,
    /// Command to spawn.
    pub command: String,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
    /// Wire framing.
    pub framing: Framing,
    /// Bound on spawn + initialize.
    pub handshake_timeout: Duration,
    /// Bound on each request after the handshake.
    pub request_timeout: Duration,
}

impl McpServerConfig {
    /// Create a new server config.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            framing: Framing::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Replace the arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the wire framing.
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Set the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Environment overrides handed to the child.
    ///
    /// Configured entries come first; the server identity always wins.
    pub fn child_env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .env
            .iter()
            .filter(|(key, _)| key != SERVER_NAME_ENV)
            .cloned()
            .collect();
        env.push((SERVER_NAME_ENV.to_string(), self.name.clone()));
        env
    }
}

/// An MCP client connected to a single server.
pub struct McpClient {
    config: McpServerConfig,
    transport: McpTransport,
    server_info: Option<ServerInfo>,
    request_id: AtomicU64,
}

impl McpClient {
    /// Spawn the server and complete the handshake.
    ///
    /// If the handshake fails or exceeds `handshake_timeout`, the child is
    /// torn down before the error is returned.
    pub async fn open(config: McpServerConfig) -> Result<Self> {
        let mut client = Self::connect_stdio(config)?;
        match client.initialize().await {
            Ok(_) => Ok(client),
            Err(e) => {
                tracing::warn!(server = %client.name(), error = %e, "MCP handshake failed");
                let _ = client.shutdown().await;
                Err(e)
            }
        }
    }

    /// Spawn the server process without initializing.
    pub fn connect_stdio(config: McpServerConfig) -> Result<Self> {
        let transport = McpTransport::spawn_stdio(
            &config.command,
            &config.args,
            &config.child_env(),
            config.framing,
        )?;

        tracing::info!(
            server = %config.name,
            command = %config.command,
            "connected to MCP server via stdio"
        );

        Ok(Self::with_transport(config, transport))
    }

    /// Wrap an existing transport (used with in-memory streams).
    pub fn with_transport(config: McpServerConfig, transport: McpTransport) -> Self {
        Self {
            config,
            transport,
            server_info: None,
            request_id: AtomicU64::new(1),
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the server info (after initialization).
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Check if the client has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.server_info.is_some()
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let request = JsonRpcRequest::new(self.next_request_id(), method, params);
        let response = self.transport.request(&request, timeout).await?;

        response
            .into_result()
            .map_err(|e| McpError::server_error(e.code, e.message, e.data))
    }

    /// Perform the initialize exchange and send `notifications/initialized`.
    pub async fn initialize(&mut self) -> Result<&ServerInfo> {
        if self.server_info.is_none() {
            let params = serde_json::to_value(InitializeParams::default())?;
            let result = self
                .send_request("initialize", Some(params), self.config.handshake_timeout)
                .await?;
            let init: InitializeResult = serde_json::from_value(result)?;

            tracing::info!(
                server = %init.server_info.name,
                version = %init.server_info.version,
                protocol = %init.protocol_version,
                "MCP server initialized"
            );

            self.transport
                .notify(&JsonRpcNotification::new("notifications/initialized", None))?;
            self.server_info = Some(init.server_info);
        }

        self.server_info.as_ref().ok_or(McpError::NotInitialized)
    }

    /// List available tools from the server.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        if !self.is_initialized() {
            return Err(McpError::NotInitialized);
        }

        let result = self
            .send_request("tools/list", None, self.config.request_timeout)
            .await?;
        let list: ListToolsResult = serde_json::from_value(result)?;

        tracing::debug!(
            server = %self.config.name,
            tool_count = list.tools.len(),
            "listed MCP tools"
        );

        Ok(list.tools)
    }

    /// Call a tool on the server.
    ///
    /// A result flagged `isError` is returned as `Ok`; callers decide whether
    /// that is a rejection (see [`CallToolResult::is_error`]).
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        if !self.is_initialized() {
            return Err(McpError::NotInitialized);
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .send_request(
                "tools/call",
                Some(serde_json::to_value(&params)?),
                self.config.request_timeout,
            )
            .await?;
        let call_result: CallToolResult = serde_json::from_value(result)?;

        if call_result.is_error() {
            tracing::warn!(
                server = %self.config.name,
                tool = %name,
                message = %call_result.text(),
                "tool call returned error"
            );
        } else {
            tracing::debug!(server = %self.config.name, tool = %name, "tool call succeeded");
        }

        Ok(call_result)
    }

    /// Shutdown the connection. Safe to call more than once.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!(server = %self.config.name, "shutting down MCP client");
        self.server_info = None;
        self.transport.shutdown().await
    }

    /// Check if the connection is still active.
    pub fn is_connected(&mut self) -> bool {
        self.transport.is_connected()
    }
}
