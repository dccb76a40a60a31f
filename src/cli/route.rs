//! CLI route: single route table and run context.

use crate::cli::parse::{Commands, ResolverChoice};
use crate::cli::presentation::{format_document_json, format_document_text, format_save_outcome};
use crate::config::{ConfigLoader, StorageBackend};
use crate::database::Database;
use crate::document::MutableDocument;
use crate::error::{DbError, StorageError};
use crate::resolver::{ConflictResolver, LocalWins, RejectConflicts, RemoteWins, ThreeWayMerge};
use crate::storage::RevisionStore;
use crate::types::{DocId, RevisionId};
use crate::value::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Split `key=value`; the value is parsed as JSON, falling back to a plain string.
pub fn parse_assignment(assignment: &str) -> Result<(String, Value), DbError> {
    let (key, raw) = assignment.split_once('=').ok_or_else(|| {
        DbError::InvalidOperation(format!("expected key=value, got {:?}", assignment))
    })?;
    if key.is_empty() {
        return Err(DbError::InvalidOperation(format!(
            "empty property name in {:?}",
            assignment
        )));
    }
    let value =
        serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Runtime context for CLI execution: one sled-backed store and a database on it.
pub struct RunContext {
    store: Arc<RevisionStore>,
    db: Database,
    store_path: PathBuf,
}

impl RunContext {
    /// Load config (explicit file or layered from `workspace_root`) and open the store.
    ///
    /// The CLI always uses a sled store; `store_override` replaces `storage.path`.
    pub fn new(
        workspace_root: &Path,
        config_path: Option<&Path>,
        store_override: Option<PathBuf>,
    ) -> Result<Self, DbError> {
        let mut config = match config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(workspace_root)?,
        };
        config.storage.backend = StorageBackend::Sled;
        if let Some(path) = store_override {
            config.storage.path = Some(path);
        }
        let config = config.validated()?;

        let store_path = config.storage.store_path();
        std::fs::create_dir_all(&store_path).map_err(StorageError::IoError)?;
        let store = config.storage.open_store()?;
        let mut db = Database::open(&config.database.name, &store)?;
        db.set_id_prefix(config.database.id_prefix.clone())?;

        debug!(store = %store_path.display(), database = %db.name(), "CLI context ready");
        Ok(Self {
            store,
            db,
            store_path,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn execute(&self, command: &Commands) -> Result<String, DbError> {
        let output = match command {
            Commands::Get { id, format } => {
                let doc = self
                    .db
                    .get_document(id)?
                    .ok_or_else(|| not_found(id))?;
                match format.as_str() {
                    "json" => format_document_json(&doc),
                    "text" => format_document_text(&doc),
                    other => {
                        return Err(DbError::InvalidOperation(format!(
                            "unknown output format {:?} (expected text or json)",
                            other
                        )))
                    }
                }
            }
            Commands::Set {
                id,
                assignments,
                base,
                resolver,
            } => self.set(id, assignments, base.as_deref(), *resolver)?,
            Commands::Delete { id } => {
                let mut doc = self
                    .db
                    .get_document(id)?
                    .ok_or_else(|| not_found(id))?
                    .to_mutable();
                let outcome = self.db.delete_document(&mut doc)?;
                format_save_outcome(id, &outcome)
            }
            Commands::Purge { id } => {
                self.db.purge_document_by_id(id)?;
                format!("{}: purged", id)
            }
            Commands::Count => self.db.document_count()?.to_string(),
            Commands::Info => format!(
                "database: {}\nstore: {}\ndocuments: {}\nlast sequence: {}",
                self.db.name(),
                self.store_path.display(),
                self.db.document_count()?,
                self.db.last_sequence()?
            ),
        };
        self.store.flush()?;
        Ok(output)
    }

    fn set(
        &self,
        id: &str,
        assignments: &[String],
        base: Option<&str>,
        resolver: ResolverChoice,
    ) -> Result<String, DbError> {
        let mut doc = match base {
            Some(base) => {
                let revision: RevisionId = base.parse()?;
                self.db
                    .get_revision(id, &revision)?
                    .ok_or_else(|| not_found(id))?
                    .to_mutable()
            }
            None => match self.db.get_document(id)? {
                Some(current) => current.to_mutable(),
                None => MutableDocument::with_id(id)?,
            },
        };

        for assignment in assignments {
            let (key, value) = parse_assignment(assignment)?;
            doc.set(key, value);
        }

        let outcome = match resolver_for(resolver) {
            Some(resolver) => self.db.save_document_with_resolver(&mut doc, resolver.as_ref())?,
            None => self.db.save_document(&mut doc)?,
        };
        Ok(format_save_outcome(id, &outcome))
    }
}

fn resolver_for(choice: ResolverChoice) -> Option<Box<dyn ConflictResolver>> {
    match choice {
        ResolverChoice::Generation => None,
        ResolverChoice::LocalWins => Some(Box::new(LocalWins)),
        ResolverChoice::RemoteWins => Some(Box::new(RemoteWins)),
        ResolverChoice::Reject => Some(Box::new(RejectConflicts)),
        ResolverChoice::ThreeWay => Some(Box::new(ThreeWayMerge)),
    }
}

fn not_found(id: &str) -> DbError {
    match DocId::new(id) {
        Ok(id) => DbError::NotFound(id),
        Err(e) => e,
    }
}
