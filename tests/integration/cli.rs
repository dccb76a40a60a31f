//! CLI route table against a sled store in a temporary directory.

use super::test_utils::{EnvGuard, ENV_MUTEX};
use revdoc::cli::{map_error, Commands, ResolverChoice, RunContext};
use revdoc::ErrorKind;
use std::path::Path;
use tempfile::TempDir;

fn set(id: &str, assignments: &[&str], base: Option<&str>, resolver: ResolverChoice) -> Commands {
    Commands::Set {
        id: id.to_string(),
        assignments: assignments.iter().map(|a| a.to_string()).collect(),
        base: base.map(str::to_string),
        resolver,
    }
}

fn get_json(context: &RunContext, id: &str) -> serde_json::Value {
    let output = context
        .execute(&Commands::Get {
            id: id.to_string(),
            format: "json".to_string(),
        })
        .unwrap();
    serde_json::from_str(&output).unwrap()
}

fn isolated_env(root: &Path) -> EnvGuard {
    let home = root.join("home");
    std::fs::create_dir_all(&home).unwrap();
    let home_str = home.to_string_lossy().to_string();
    EnvGuard::set(&[
        ("HOME", Some(home_str.as_str())),
        ("XDG_CONFIG_HOME", None),
        ("REVDOC_ENV", None),
    ])
}

#[test]
fn test_set_get_count_info() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let _env = isolated_env(temp_dir.path());
    let store = temp_dir.path().join("store");

    let context = RunContext::new(temp_dir.path(), None, Some(store.clone())).unwrap();
    let output = context
        .execute(&set("note", &["title=hello", "stars=5"], None, ResolverChoice::Generation))
        .unwrap();
    assert!(output.starts_with("note: committed 1-"));

    let doc = get_json(&context, "note");
    assert_eq!(doc["properties"]["title"], "hello");
    assert_eq!(doc["properties"]["stars"], 5);
    assert_eq!(doc["sequence"], 1);

    assert_eq!(context.execute(&Commands::Count).unwrap(), "1");
    let info = context.execute(&Commands::Info).unwrap();
    assert!(info.contains("database: db"));
    assert!(info.contains("last sequence: 1"));
    assert_eq!(context.store_path(), store.as_path());
}

#[test]
fn test_state_persists_between_runs() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let _env = isolated_env(temp_dir.path());
    let store = temp_dir.path().join("store");

    {
        let context = RunContext::new(temp_dir.path(), None, Some(store.clone())).unwrap();
        context
            .execute(&set("note", &["v=1"], None, ResolverChoice::Generation))
            .unwrap();
    }

    let context = RunContext::new(temp_dir.path(), None, Some(store)).unwrap();
    context
        .execute(&set("note", &["v=2"], None, ResolverChoice::Generation))
        .unwrap();
    let doc = get_json(&context, "note");
    assert_eq!(doc["properties"]["v"], 2);
    assert!(doc["revision"].as_str().unwrap().starts_with("2-"));
}

#[test]
fn test_stale_base_with_resolvers() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let _env = isolated_env(temp_dir.path());
    let context =
        RunContext::new(temp_dir.path(), None, Some(temp_dir.path().join("store"))).unwrap();

    context
        .execute(&set("note", &["title=a", "body=x"], None, ResolverChoice::Generation))
        .unwrap();
    let base = get_json(&context, "note")["revision"]
        .as_str()
        .unwrap()
        .to_string();
    context
        .execute(&set("note", &["title=b"], None, ResolverChoice::Generation))
        .unwrap();

    let err = context
        .execute(&set("note", &["body=y"], Some(&base), ResolverChoice::Reject))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(map_error(&err).starts_with("error (conflict):"));

    let output = context
        .execute(&set("note", &["body=y"], Some(&base), ResolverChoice::ThreeWay))
        .unwrap();
    assert!(output.starts_with("note: merged 3-"));
    let doc = get_json(&context, "note");
    assert_eq!(doc["properties"]["title"], "b");
    assert_eq!(doc["properties"]["body"], "y");
}

#[test]
fn test_delete_and_purge() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let _env = isolated_env(temp_dir.path());
    let context =
        RunContext::new(temp_dir.path(), None, Some(temp_dir.path().join("store"))).unwrap();

    context
        .execute(&set("note", &["k=v"], None, ResolverChoice::Generation))
        .unwrap();
    context
        .execute(&Commands::Delete {
            id: "note".to_string(),
        })
        .unwrap();
    assert_eq!(context.execute(&Commands::Count).unwrap(), "0");

    let err = context
        .execute(&Commands::Get {
            id: "note".to_string(),
            format: "text".to_string(),
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    context
        .execute(&Commands::Purge {
            id: "note".to_string(),
        })
        .unwrap();
    let err = context
        .execute(&Commands::Purge {
            id: "note".to_string(),
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_bad_input_is_reported() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let _env = isolated_env(temp_dir.path());
    let context =
        RunContext::new(temp_dir.path(), None, Some(temp_dir.path().join("store"))).unwrap();

    let err = context
        .execute(&set("note", &["missing-equals"], None, ResolverChoice::Generation))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let err = context
        .execute(&set("note", &["k=v"], Some("not-a-revision"), ResolverChoice::Generation))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongFormat);

    let err = context
        .execute(&set("_reserved", &["k=v"], None, ResolverChoice::Generation))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongFormat);
}
