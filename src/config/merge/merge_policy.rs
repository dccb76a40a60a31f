//! Merge rules: defaults first, later sources override earlier ones key by key.

use crate::storage::DEFAULT_MAX_REVISION_DEPTH;
use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("database.name", "db")?
        .set_default("storage.backend", "memory")?
        .set_default(
            "storage.max_revision_depth",
            DEFAULT_MAX_REVISION_DEPTH as u64,
        )?
        .set_default("logging.level", "info")
}
