//! Global config file source: $XDG_CONFIG_HOME/summit/config.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use directories::BaseDirs;
use std::path::PathBuf;
use tracing::debug;

/// Path to the global config file, if a home directory can be resolved.
pub fn global_config_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.config_dir().join("summit").join("config.toml"))
}

/// Add the global config file to the builder if it exists.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match global_config_path() {
        Some(path) if path.exists() => Ok(builder.add_source(File::from(path).required(false))),
        Some(path) => {
            debug!(config_path = %path.display(), "No global configuration file");
            Ok(builder)
        }
        None => Ok(builder),
    }
}
