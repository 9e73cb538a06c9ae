//! CLI command handlers.

pub mod check;
pub mod config;
pub mod extract;
pub mod sync;

use std::path::Path;

use anyhow::{Context as _, Result};
use graphbridge_config::{
    BridgeConfig, GraphFraming, GraphSection, LoadOptions, LoadedConfig, load_config_with_options,
};
use graphbridge_mcp::{Framing, McpServerConfig};
use graphbridge_store::StoreClient;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Resolved configuration and where it came from.
    pub loaded: LoadedConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Resolve configuration layers, then apply CLI / env overrides.
    pub fn load(
        config_file: Option<&Path>,
        store_url: Option<&str>,
        json_output: bool,
        verbose: bool,
    ) -> Result<Self> {
        let options = LoadOptions {
            explicit_file: config_file.map(Path::to_path_buf),
            ..Default::default()
        };
        let mut loaded =
            load_config_with_options(&options).context("failed to load configuration")?;

        for warning in &loaded.warnings {
            tracing::warn!("{}", warning);
        }

        if let Some(url) = store_url {
            loaded.config.set_store_url(url);
        }
        loaded.config.validate().context("invalid configuration")?;

        Ok(Self {
            loaded,
            json_output,
            verbose,
        })
    }

    /// The merged configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.loaded.config
    }

    /// Build the content store client.
    pub fn store_client(&self) -> Result<StoreClient> {
        let config = self.config();
        StoreClient::builder()
            .base_url(config.store_url())
            .timeout(config.store_timeout())
            .build()
            .with_context(|| format!("invalid content store URL '{}'", config.store_url()))
    }
}

/// Map the `[graph]` section onto an MCP server config.
///
/// Fails when no command is configured.
pub fn server_config(graph: &GraphSection) -> Result<McpServerConfig> {
    let command = graph.require_command()?;
    let framing = match graph.framing() {
        GraphFraming::Newline => Framing::Newline,
        GraphFraming::ContentLength => Framing::ContentLength,
    };

    let mut config = McpServerConfig::new(graph.name(), command)
        .with_args(graph.args().to_vec())
        .with_framing(framing)
        .with_handshake_timeout(graph.handshake_timeout())
        .with_request_timeout(graph.request_timeout());
    for (key, value) in graph.env_tuples() {
        config = config.with_env_var(key, value);
    }
    Ok(config)
}
