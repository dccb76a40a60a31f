//! Config loading entry points.

use super::{merge, sources, RevdocConfig};
use config::{ConfigError, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`RevdocConfig`] from layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load defaults, global file, workspace files and environment, in that order.
    pub fn load(workspace_root: &Path) -> Result<RevdocConfig, ConfigError> {
        let builder = merge::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = sources::environment::add_to_builder(builder)?;

        let config: RevdocConfig = builder.build()?.try_deserialize()?;
        debug!(
            workspace_root = %workspace_root.display(),
            database = %config.database.name,
            backend = ?config.storage.backend,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load defaults plus one explicit file; the environment still overrides it.
    pub fn load_from_file(path: &Path) -> Result<RevdocConfig, ConfigError> {
        let builder = merge::builder_with_defaults()?.add_source(File::from(path).required(true));
        let builder = sources::environment::add_to_builder(builder)?;
        builder.build()?.try_deserialize()
    }

    /// Global config file location, whether or not it exists.
    pub fn xdg_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }
}
