//! Integration tests for the configuration system

use super::test_utils::{EnvGuard, ENV_MUTEX};
use revdoc::config::{ConfigLoader, StorageBackend, ValidationError};
use revdoc::{Database, ErrorKind};
use tempfile::TempDir;

#[test]
fn test_config_file_drives_database_settings() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("revdoc.toml");
    std::fs::write(
        &config_file,
        r#"
[database]
name = "notes"
id_prefix = "note-"

[storage]
backend = "memory"
max_revision_depth = 4
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert!(config.validate().is_ok());

    let db = Database::open_with_config(&config).unwrap();
    assert_eq!(db.name(), "notes");
    let doc = db.create_document();
    assert!(doc.id().as_str().starts_with("note-"));
}

#[test]
fn test_invalid_config_reports_every_problem() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("revdoc.toml");
    std::fs::write(
        &config_file,
        r#"
[database]
name = "bad/name"

[storage]
max_revision_depth = 0

[logging]
format = "yaml"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 3);
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::Database(msg) if msg.contains("bad/name"))));

    let err = Database::open_with_config(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongFormat);
}

#[test]
fn test_unknown_backend_fails_to_load() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("revdoc.toml");
    std::fs::write(&config_file, "[storage]\nbackend = \"rocks\"\n").unwrap();
    assert!(ConfigLoader::load_from_file(&config_file).is_err());
}

#[test]
fn test_environment_overrides_workspace_file() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path();
    std::fs::create_dir_all(workspace.join("config")).unwrap();
    std::fs::write(
        workspace.join("config").join("config.toml"),
        "[storage]\nbackend = \"memory\"\nmax_revision_depth = 3\n",
    )
    .unwrap();

    let home = workspace.join("home");
    std::fs::create_dir_all(&home).unwrap();
    let home_str = home.to_string_lossy().to_string();
    let _env = EnvGuard::set(&[
        ("HOME", Some(home_str.as_str())),
        ("XDG_CONFIG_HOME", None),
        ("REVDOC__STORAGE__BACKEND", Some("sled")),
    ]);

    let config = ConfigLoader::load(workspace).unwrap();
    assert_eq!(config.storage.backend, StorageBackend::Sled);
    assert_eq!(config.storage.max_revision_depth, 3);
}

#[test]
fn test_workspace_config_dir_overrides_root_file() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path();
    std::fs::write(
        workspace.join("revdoc.toml"),
        "[database]\nname = \"root\"\nid_prefix = \"r-\"\n",
    )
    .unwrap();
    std::fs::create_dir_all(workspace.join("config")).unwrap();
    std::fs::write(
        workspace.join("config").join("config.toml"),
        "[database]\nname = \"nested\"\n",
    )
    .unwrap();

    let home = workspace.join("home");
    std::fs::create_dir_all(&home).unwrap();
    let home_str = home.to_string_lossy().to_string();
    let _env = EnvGuard::set(&[
        ("HOME", Some(home_str.as_str())),
        ("XDG_CONFIG_HOME", None),
        ("REVDOC_ENV", None),
    ]);

    let config = ConfigLoader::load(workspace).unwrap();
    assert_eq!(config.database.name, "nested");
    assert_eq!(config.database.id_prefix.as_deref(), Some("r-"));
}
