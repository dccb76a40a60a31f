//! Environment source: REVDOC__SECTION__KEY, e.g. REVDOC__STORAGE__BACKEND=sled

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder.add_source(
        Environment::with_prefix("REVDOC")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    ))
}
