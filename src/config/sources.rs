//! Config sources, lowest precedence first.

use crate::error::ConfigError;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const WORKSPACE_CONFIG_FILE: &str = "pagesmith.toml";

pub(super) fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(Config::builder().set_default("output_dir", ".")?)
}

/// `$XDG_CONFIG_HOME/pagesmith/config.toml`, falling back to `~/.config/pagesmith/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("pagesmith").join("config.toml"))
}

pub fn workspace_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(WORKSPACE_CONFIG_FILE)
}

pub(super) fn add_global_file(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let Some(path) = global_config_path() else {
        return Ok(builder);
    };
    if !path.exists() {
        debug!(config_path = %path.display(), "No global configuration file");
        return Ok(builder);
    }
    Ok(builder.add_source(File::from(path).required(false)))
}

pub(super) fn add_workspace_file(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let path = workspace_config_path(workspace_root);
    if !path.exists() {
        return Ok(builder);
    }
    Ok(builder.add_source(File::from(path).required(false)))
}

/// `PAGESMITH__PIPELINE__MAX_ATTEMPTS=5` sets `pipeline.max_attempts`.
pub(super) fn add_environment(
    builder: ConfigBuilder<DefaultState>,
) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("PAGESMITH")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
