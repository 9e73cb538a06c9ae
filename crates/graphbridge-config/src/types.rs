//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [store]     # content store endpoint
//! [graph]     # knowledge-graph server process and tool
//! [sync]      # run-level settings
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default content store location.
pub const DEFAULT_STORE_URL: &str = "http://localhost:8787";
/// Default per-request store timeout.
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;
/// Default server identity passed to the graph server.
pub const DEFAULT_SERVER_NAME: &str = "graphiti-mcp";
/// Default tool invoked once per fact.
pub const DEFAULT_TOOL: &str = "add_episode";
/// Default knowledge-graph namespace.
pub const DEFAULT_GROUP_ID: &str = "market_signals";
/// Default handshake timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 30;
/// Default per-call timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Every field is optional so partial layers (a project-local file that only
/// sets `graph.command`, say) can be loaded and merged. Accessors apply the
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Content store settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreSection>,
    /// Knowledge-graph server settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphSection>,
    /// Run settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncSection>,
}

impl BridgeConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority, field by field).
    pub fn merge(&mut self, other: BridgeConfig) {
        merge_section(&mut self.store, other.store, StoreSection::merge);
        merge_section(&mut self.graph, other.graph, GraphSection::merge);
        merge_section(&mut self.sync, other.sync, SyncSection::merge);
    }

    /// Content store base URL.
    pub fn store_url(&self) -> &str {
        self.store
            .as_ref()
            .and_then(|s| s.base_url.as_deref())
            .unwrap_or(DEFAULT_STORE_URL)
    }

    /// Per-request content store timeout.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(
            self.store
                .as_ref()
                .and_then(|s| s.timeout_secs)
                .unwrap_or(DEFAULT_STORE_TIMEOUT_SECS),
        )
    }

    /// Graph section with defaults applied to missing fields.
    pub fn graph(&self) -> GraphSection {
        self.graph.clone().unwrap_or_default()
    }

    /// Run-level deadline, if configured.
    pub fn run_timeout(&self) -> Option<Duration> {
        self.sync
            .as_ref()
            .and_then(|s| s.run_timeout_secs)
            .map(Duration::from_secs)
    }

    /// Override the store URL (CLI / env layer).
    pub fn set_store_url(&mut self, url: impl Into<String>) {
        self.store.get_or_insert_with(StoreSection::default).base_url = Some(url.into());
    }

    /// Override the run timeout (CLI layer).
    pub fn set_run_timeout_secs(&mut self, secs: u64) {
        self.sync.get_or_insert_with(SyncSection::default).run_timeout_secs = Some(secs);
    }

    /// Check values that would only fail later, at run time.
    ///
    /// A missing `graph.command` is not checked here; commands that never spawn
    /// the server (`extract`, `config show`) work without one.
    pub fn validate(&self) -> Result<()> {
        if self.store_url().trim().is_empty() {
            return Err(ConfigError::invalid("store.base_url", "must not be empty"));
        }
        if self.store_timeout().is_zero() {
            return Err(ConfigError::invalid("store.timeout_secs", "must be at least 1"));
        }
        if self.run_timeout().is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::invalid("sync.run_timeout_secs", "must be at least 1"));
        }

        let graph = self.graph();
        if graph.tool().trim().is_empty() {
            return Err(ConfigError::invalid("graph.tool", "must not be empty"));
        }
        if graph.group_id().trim().is_empty() {
            return Err(ConfigError::invalid("graph.group_id", "must not be empty"));
        }
        if graph.handshake_timeout().is_zero() {
            return Err(ConfigError::invalid(
                "graph.handshake_timeout_secs",
                "must be at least 1",
            ));
        }
        if graph.request_timeout().is_zero() {
            return Err(ConfigError::invalid(
                "graph.request_timeout_secs",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
    if let Some(layer) = other {
        match base {
            Some(existing) => merge(existing, layer),
            None => *base = Some(layer),
        }
    }
}

macro_rules! take_some {
    ($self:ident, $other:ident, $($field:ident),+ $(,)?) => {
        $(
            if $other.$field.is_some() {
                $self.$field = $other.$field;
            }
        )+
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// `[store]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Base URL of the content store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl StoreSection {
    fn merge(&mut self, other: StoreSection) {
        take_some!(self, other, base_url, timeout_secs);
    }
}

/// Wire framing used on the graph server's stdio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GraphFraming {
    /// One JSON message per line.
    #[default]
    #[serde(alias = "newline-delimited")]
    Newline,
    /// `Content-Length` headers.
    ContentLength,
}

/// `[graph]` section: how to spawn the knowledge-graph server and what to call.
///
/// ```toml
/// [graph]
/// name = "graphiti-mcp"
/// command = "python"
/// args = ["-m", "graphiti_mcp.server"]
/// env = [["NEO4J_URI", "bolt://localhost:7687"]]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    /// Server identity, exported to the child as `MCP_SERVER_NAME`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Program to execute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments to pass to the command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Extra environment variables as `[key, value]` pairs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<[String; 2]>>,
    /// Stdio framing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framing: Option<GraphFraming>,
    /// Tool invoked once per fact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Namespace every fact is filed under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Spawn + initialize deadline in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handshake_timeout_secs: Option<u64>,
    /// Per-call deadline in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl GraphSection {
    fn merge(&mut self, other: GraphSection) {
        take_some!(
            self,
            other,
            name,
            command,
            args,
            env,
            framing,
            tool,
            group_id,
            handshake_timeout_secs,
            request_timeout_secs,
        );
    }

    /// Server identity.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_SERVER_NAME)
    }

    /// The command to spawn, required before any session is opened.
    pub fn require_command(&self) -> Result<&str> {
        self.command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ConfigError::missing("command", "[graph]"))
    }

    /// Command arguments.
    pub fn args(&self) -> &[String] {
        self.args.as_deref().unwrap_or_default()
    }

    /// Environment entries as tuples.
    pub fn env_tuples(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .flatten()
            .map(|[k, v]| (k.clone(), v.clone()))
            .collect()
    }

    /// Stdio framing.
    pub fn framing(&self) -> GraphFraming {
        self.framing.unwrap_or_default()
    }

    /// Tool name.
    pub fn tool(&self) -> &str {
        self.tool.as_deref().unwrap_or(DEFAULT_TOOL)
    }

    /// Group id.
    pub fn group_id(&self) -> &str {
        self.group_id.as_deref().unwrap_or(DEFAULT_GROUP_ID)
    }

    /// Handshake timeout.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(
            self.handshake_timeout_secs
                .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
        )
    }

    /// Per-call timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }
}

/// `[sync]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// Deadline for a whole run, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<u64>,
}

impl SyncSection {
    fn merge(&mut self, other: SyncSection) {
        take_some!(self, other, run_timeout_secs);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_defaults() {
        let config = BridgeConfig::from_toml("").unwrap();
        assert_eq!(config.store_url(), DEFAULT_STORE_URL);
        assert_eq!(config.store_timeout(), Duration::from_secs(30));
        assert_eq!(config.run_timeout(), None);

        let graph = config.graph();
        assert_eq!(graph.name(), "graphiti-mcp");
        assert_eq!(graph.tool(), "add_episode");
        assert_eq!(graph.group_id(), "market_signals");
        assert_eq!(graph.framing(), GraphFraming::Newline);
        assert_eq!(graph.handshake_timeout(), Duration::from_secs(30));
        assert_eq!(graph.request_timeout(), Duration::from_secs(60));
        assert!(graph.args().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config = BridgeConfig::from_toml(
            r#"
[store]
base_url = "http://store.internal:8787"
timeout_secs = 10

[graph]
name = "graph-prod"
command = "python"
args = ["-m", "graphiti_mcp.server"]
env = [["NEO4J_URI", "bolt://localhost:7687"]]
framing = "content-length"
tool = "mcp_graphiti-mcp_add_episode"
group_id = "signals"
handshake_timeout_secs = 5
request_timeout_secs = 15

[sync]
run_timeout_secs = 600
"#,
        )
        .unwrap();

        assert_eq!(config.store_url(), "http://store.internal:8787");
        assert_eq!(config.store_timeout(), Duration::from_secs(10));
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(600)));

        let graph = config.graph();
        assert_eq!(graph.require_command().unwrap(), "python");
        assert_eq!(graph.args(), ["-m", "graphiti_mcp.server"]);
        assert_eq!(
            graph.env_tuples(),
            vec![("NEO4J_URI".to_string(), "bolt://localhost:7687".to_string())]
        );
        assert_eq!(graph.framing(), GraphFraming::ContentLength);
        assert_eq!(graph.tool(), "mcp_graphiti-mcp_add_episode");
        assert_eq!(graph.group_id(), "signals");
    }

    #[test]
    fn test_framing_alias() {
        let config = BridgeConfig::from_toml("[graph]\nframing = \"newline-delimited\"\n").unwrap();
        assert_eq!(config.graph().framing(), GraphFraming::Newline);
    }

    #[test]
    fn test_unknown_framing_is_parse_error() {
        let err = BridgeConfig::from_toml("[graph]\nframing = \"websocket\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_merge_is_field_level() {
        let mut base = BridgeConfig::from_toml(
            r#"
[store]
base_url = "http://user-level:8787"
timeout_secs = 5

[graph]
command = "graphiti-mcp"
group_id = "user_group"
"#,
        )
        .unwrap();
        let project = BridgeConfig::from_toml(
            r#"
[store]
base_url = "http://project:8787"

[graph]
args = ["--transport", "stdio"]
"#,
        )
        .unwrap();

        base.merge(project);

        assert_eq!(base.store_url(), "http://project:8787");
        assert_eq!(base.store_timeout(), Duration::from_secs(5));
        let graph = base.graph();
        assert_eq!(graph.require_command().unwrap(), "graphiti-mcp");
        assert_eq!(graph.group_id(), "user_group");
        assert_eq!(graph.args(), ["--transport", "stdio"]);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = BridgeConfig::new();
        config.set_store_url("http://cli:1234");
        config.set_run_timeout_secs(42);
        assert_eq!(config.store_url(), "http://cli:1234");
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(42)));
    }

    #[test]
    fn test_missing_command() {
        let config = BridgeConfig::from_toml("[graph]\ncommand = \"  \"\n").unwrap();
        let err = config.graph().require_command().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }));
        assert!(err.to_string().contains("[graph]"));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts_and_empty_names() {
        let config = BridgeConfig::from_toml("[store]\ntimeout_secs = 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let config = BridgeConfig::from_toml("[graph]\ngroup_id = \"\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("graph.group_id"));

        let config = BridgeConfig::from_toml("[sync]\nrun_timeout_secs = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_round_trip_omits_unset() {
        let mut config = BridgeConfig::new();
        config.set_store_url("http://x:1");
        let text = config.to_toml().unwrap();
        assert!(text.contains("base_url"));
        assert!(!text.contains("timeout_secs"));
        assert_eq!(BridgeConfig::from_toml(&text).unwrap(), config);
    }
}
