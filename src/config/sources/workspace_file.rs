//! Workspace config files

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_ENVIRONMENT: &str = "development";

/// Existing workspace config files, lowest precedence first:
/// `revdoc.toml`, `config/config.toml`, `config/{REVDOC_ENV}.toml`.
pub fn workspace_files(workspace_root: &Path) -> Vec<PathBuf> {
    let environment =
        std::env::var("REVDOC_ENV").unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string());
    let config_dir = workspace_root.join("config");

    [
        workspace_root.join("revdoc.toml"),
        config_dir.join("config.toml"),
        config_dir.join(format!("{}.toml", environment)),
    ]
    .into_iter()
    .filter(|path| path.is_file())
    .collect()
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let files = workspace_files(workspace_root);
    if files.is_empty() {
        debug!(workspace_root = %workspace_root.display(), "No workspace configuration files");
    }
    Ok(files.iter().fold(builder, |builder, path| {
        builder.add_source(File::from(path.as_path()).required(false))
    }))
}
