//! Workspace config file source: <workspace>/summit.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};

pub const WORKSPACE_CONFIG_FILE: &str = "summit.toml";

pub fn workspace_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(WORKSPACE_CONFIG_FILE)
}

/// Add the workspace config file, then an explicitly named file, to the builder.
///
/// The explicit file must exist.
pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
    explicit: Option<&Path>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let workspace_path = workspace_config_path(workspace_root);
    if workspace_path.exists() {
        builder = builder.add_source(File::from(workspace_path).required(false));
    }

    if let Some(path) = explicit {
        builder = builder.add_source(File::from(path.to_path_buf()).required(true));
    }

    Ok(builder)
}
