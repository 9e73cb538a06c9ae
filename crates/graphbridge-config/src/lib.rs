//! Configuration for the graphbridge knowledge sync bridge.
//!
//! TOML files layered from the user config directory and the project
//! directory, merged field by field. Every value has a default, so an empty
//! (or absent) configuration is valid until something needs the graph
//! server's command.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigSource, LoadOptions, LoadedConfig, PROJECT_CONFIG_FILE, config_dir,
    load_config, load_config_file, load_config_with_options, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
