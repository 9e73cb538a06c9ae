//! Graph session seam and its MCP implementation.

use async_trait::async_trait;
use graphbridge_mcp::{McpClient, McpServerConfig};
use serde_json::Value;

use crate::error::{SessionError, SubmitError};

/// Opens sessions to the knowledge-graph service.
#[async_trait]
pub trait GraphConnector: Send + Sync {
    /// Spawn and handshake. Failure leaves nothing running.
    async fn open(&self) -> Result<Box<dyn GraphSession>, SessionError>;
}

/// An open channel to the knowledge-graph service.
#[async_trait]
pub trait GraphSession: Send {
    /// Invoke a tool and return its textual acknowledgement.
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<String, SubmitError>;

    /// Tear the session down. Called exactly once per opened session.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// [`GraphConnector`] that spawns an MCP server over stdio.
#[derive(Debug, Clone)]
pub struct McpConnector {
    config: McpServerConfig,
}

impl McpConnector {
    /// Create a connector for the given server.
    pub fn new(config: McpServerConfig) -> Self {
        Self { config }
    }

    /// Server configuration.
    pub fn config(&self) -> &McpServerConfig {
        &self.config
    }
}

#[async_trait]
impl GraphConnector for McpConnector {
    async fn open(&self) -> Result<Box<dyn GraphSession>, SessionError> {
        let client = McpClient::open(self.config.clone()).await?;
        if let Some(info) = client.server_info() {
            tracing::info!(
                server = %info.name,
                version = %info.version,
                "graph session open"
            );
        }
        Ok(Box::new(McpSession { client }))
    }
}

/// [`GraphSession`] over an initialized [`McpClient`].
pub struct McpSession {
    client: McpClient,
}

#[async_trait]
impl GraphSession for McpSession {
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<String, SubmitError> {
        let result = self.client.call_tool(name, Some(arguments)).await?;
        Ok(result.into_text()?)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.client.shutdown().await?;
        Ok(())
    }
}
