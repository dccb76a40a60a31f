//! Configuration System
//!
//! Layered configuration built with the `config` crate. Sources, lowest precedence first:
//! merge-policy defaults, the global file (`$XDG_CONFIG_HOME/revdoc/config.toml` or
//! `~/.config/revdoc/config.toml`), workspace files (`revdoc.toml`, then
//! `config/config.toml` and `config/{REVDOC_ENV}.toml`) and `REVDOC__SECTION__KEY`
//! environment variables.

use crate::database::{validate_database_name, validate_id_prefix};
use crate::error::DbError;
use crate::logging::LoggingConfig;
use crate::storage::{MemoryBackend, RevisionStore, DEFAULT_MAX_REVISION_DEPTH};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevdocConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database instance settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_name")]
    pub name: String,

    /// Prefix for generated document IDs
    #[serde(default)]
    pub id_prefix: Option<String>,
}

fn default_database_name() -> String {
    "db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_database_name(),
            id_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

/// Storage engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Sled directory; the platform data directory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Revisions retained per document, current included
    #[serde(default = "default_max_revision_depth")]
    pub max_revision_depth: usize,
}

fn default_max_revision_depth() -> usize {
    DEFAULT_MAX_REVISION_DEPTH
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: None,
            max_revision_depth: default_max_revision_depth(),
        }
    }
}

/// Default sled directory: `<platform data dir>/revdoc/store`
pub fn default_store_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "revdoc")
        .map(|dirs| dirs.data_dir().join("store"))
        .unwrap_or_else(|| PathBuf::from(".revdoc").join("store"))
}

impl StorageConfig {
    /// Directory a sled store opens at
    pub fn store_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_store_path)
    }

    /// Create the store this configuration describes.
    pub fn open_store(&self) -> Result<Arc<RevisionStore>, DbError> {
        match self.backend {
            StorageBackend::Memory => Ok(RevisionStore::new(
                Box::new(MemoryBackend::new()),
                self.max_revision_depth,
            )),
            StorageBackend::Sled => {
                Ok(RevisionStore::open_sled(self.store_path(), self.max_revision_depth)?)
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_revision_depth == 0 {
            return Err("max_revision_depth must be at least 1".to_string());
        }
        if self.backend == StorageBackend::Sled
            && self.path.as_ref().map_or(false, |p| p.as_os_str().is_empty())
        {
            return Err("sled store path cannot be empty".to_string());
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_database_name(&self.name).map_err(|e| e.to_string())?;
        if let Some(prefix) = &self.id_prefix {
            validate_id_prefix(prefix).map_err(|e| format!("id_prefix: {}", e))?;
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Database(String),
    Storage(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Database(msg) => write!(f, "Database: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl RevdocConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.database.validate() {
            errors.push(ValidationError::Database(e));
        }
        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// [`validate`](Self::validate), folded into one config error.
    pub fn validated(self) -> Result<Self, DbError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            DbError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(self)
    }
}
