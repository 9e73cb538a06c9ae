//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `$GRAPHBRIDGE_CONFIG_DIR/config.toml`, else the platform config dir
//!    (`~/.config/graphbridge/config.toml` on Linux)
//! 2. `./graphbridge.toml`, or an explicit `--config` file in its place
//! 3. CLI arguments and environment (handled by the binary)

use std::path::{Path, PathBuf};

use crate::{BridgeConfig, ConfigError, Result};

/// Default config filename for project-local config.
pub const PROJECT_CONFIG_FILE: &str = "graphbridge.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for platform directory resolution.
const APP_NAME: &str = "graphbridge";

/// Environment variable to override the config directory.
pub const CONFIG_DIR_ENV: &str = "GRAPHBRIDGE_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: BridgeConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Problems with discovered files that were skipped.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Where to look for config layers.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// User config directory; `None` uses `GRAPHBRIDGE_CONFIG_DIR` or the platform default.
    pub config_dir: Option<PathBuf>,
    /// Directory searched for `graphbridge.toml`; `None` is the working directory.
    pub project_dir: Option<PathBuf>,
    /// Explicit file replacing the project layer. Must exist.
    pub explicit_file: Option<PathBuf>,
}

/// Load configuration from the default locations.
pub fn load_config() -> Result<LoadedConfig> {
    load_config_with_options(&LoadOptions::default())
}

/// Load configuration with explicit control over every layer's location.
///
/// Discovered files that are unreadable or malformed are skipped with a
/// warning. An explicit file is different: failing to load it is an error.
pub fn load_config_with_options(options: &LoadOptions) -> Result<LoadedConfig> {
    let mut config = BridgeConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    // 1. User config
    let user_config_path = match &options.config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => user_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    // 2. Project-local or explicit config
    match &options.explicit_file {
        Some(path) => {
            config.merge(load_config_file(path)?);
            sources.push(ConfigSource {
                path: path.clone(),
                loaded: true,
            });
        }
        None => {
            let path = options
                .project_dir
                .as_ref()
                .map(|d| d.join(PROJECT_CONFIG_FILE))
                .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
            sources.push(load_layer(&mut config, &path, &mut warnings));
        }
    }

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<BridgeConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    BridgeConfig::from_toml(&contents)
}

/// Get the user config file path.
pub fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the graphbridge config directory.
///
/// Checks `GRAPHBRIDGE_CONFIG_DIR` first, then falls back to the platform default.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
fn load_layer(config: &mut BridgeConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
