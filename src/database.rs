//! Database instances
//!
//! A [`Database`] is one named, open view onto a [`RevisionStore`], holding its own
//! storage connection. Every write entry point (save, delete, purge, batch, blob staging)
//! runs under the instance's reentrant write lock, so a batch closure can call back into
//! the same database on the same thread.

use crate::config::RevdocConfig;
use crate::coordinator::{SaveCoordinator, SaveOutcome};
use crate::document::{Document, MutableDocument};
use crate::error::{DbError, StorageError};
use crate::resolver::ConflictResolver;
use crate::storage::{run_in_transaction, RevisionStore, StorageGateway};
use crate::types::{DocId, InstanceId, RevisionId};
use crate::value::BlobRef;
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::Arc;
use tracing::{debug, info};

const MAX_NAME_LENGTH: usize = 240;

/// Check a database name: 1..=240 characters of `[A-Za-z0-9_.-]`, not starting with `.`.
pub fn validate_database_name(name: &str) -> Result<(), DbError> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(DbError::WrongFormat(format!(
            "database name must be 1 to {} characters, got {}",
            MAX_NAME_LENGTH,
            name.len()
        )));
    }
    if name.starts_with('.') {
        return Err(DbError::WrongFormat(format!(
            "database name may not start with '.': {}",
            name
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(DbError::WrongFormat(format!(
            "database name contains invalid character {:?}: {}",
            bad, name
        )));
    }
    Ok(())
}

/// Check that IDs generated with `prefix` are valid document IDs.
pub fn validate_id_prefix(prefix: &str) -> Result<(), DbError> {
    // Generated IDs append 32 hex characters.
    DocId::new(format!("{}{}", prefix, "0".repeat(32))).map(|_| ())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    Closed,
    Deleted,
}

/// One open database instance
pub struct Database {
    name: String,
    instance: InstanceId,
    gateway: Box<dyn StorageGateway>,
    lifecycle: Mutex<Lifecycle>,
    write_lock: ReentrantMutex<()>,
    id_prefix: Option<String>,
}

impl Database {
    /// Open a database instance on `store` with its own connection.
    pub fn open(name: &str, store: &Arc<RevisionStore>) -> Result<Self, DbError> {
        Self::with_gateway(name, Box::new(store.connect()))
    }

    /// Open the database described by `config`, creating its store.
    pub fn open_with_config(config: &RevdocConfig) -> Result<Self, DbError> {
        let store = config.storage.open_store()?;
        let mut db = Self::open(&config.database.name, &store)?;
        db.set_id_prefix(config.database.id_prefix.clone())?;
        Ok(db)
    }

    /// Open a database instance over an arbitrary gateway.
    pub fn with_gateway(name: &str, gateway: Box<dyn StorageGateway>) -> Result<Self, DbError> {
        validate_database_name(name)?;
        let instance = InstanceId::next();
        info!(database = name, instance = %instance, "Opened database");
        Ok(Self {
            name: name.to_string(),
            instance,
            gateway,
            lifecycle: Mutex::new(Lifecycle::Open),
            write_lock: ReentrantMutex::new(()),
            id_prefix: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    pub fn is_open(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Open
    }

    /// Prefix for generated document IDs.
    pub fn set_id_prefix(&mut self, prefix: Option<String>) -> Result<(), DbError> {
        if let Some(prefix) = &prefix {
            validate_id_prefix(prefix)?;
        }
        self.id_prefix = prefix;
        Ok(())
    }

    /// New unsaved document with a generated ID, bound to this instance.
    pub fn create_document(&self) -> MutableDocument {
        let mut doc = MutableDocument::from_id(DocId::generate(self.id_prefix.as_deref()));
        doc.bind(self.instance);
        doc
    }

    /// Current revision of `id`; tombstones read as absent.
    pub fn get_document(&self, id: &str) -> Result<Option<Document>, DbError> {
        self.check_open()?;
        let id = DocId::new(id)?;
        match self.gateway.load(&id, false)? {
            Some(stored) if !stored.deleted => {
                Ok(Some(Document::from_stored(&stored, self.instance)?))
            }
            _ => Ok(None),
        }
    }

    /// A revision of `id` still held in the retained history, tombstones included.
    pub fn get_revision(
        &self,
        id: &str,
        revision: &RevisionId,
    ) -> Result<Option<Document>, DbError> {
        self.check_open()?;
        let id = DocId::new(id)?;
        Ok(self
            .gateway
            .load_revision(&id, revision)?
            .map(|stored| Document::from_stored(&stored, self.instance))
            .transpose()?)
    }

    pub fn contains_document(&self, id: &str) -> Result<bool, DbError> {
        Ok(self.get_document(id)?.is_some())
    }

    /// Save with the default generation policy.
    pub fn save_document(&self, doc: &mut MutableDocument) -> Result<SaveOutcome, DbError> {
        self.save(doc, None, false)
    }

    pub fn save_document_with_resolver(
        &self,
        doc: &mut MutableDocument,
        resolver: &dyn ConflictResolver,
    ) -> Result<SaveOutcome, DbError> {
        self.save(doc, Some(resolver), false)
    }

    /// Commit a tombstone for `doc`. A deletion that conflicts with a concurrent write
    /// loses: the handle adopts the stored revision instead.
    pub fn delete_document(&self, doc: &mut MutableDocument) -> Result<SaveOutcome, DbError> {
        self.save(doc, None, true)
    }

    fn save(
        &self,
        doc: &mut MutableDocument,
        resolver: Option<&dyn ConflictResolver>,
        is_deletion: bool,
    ) -> Result<SaveOutcome, DbError> {
        self.check_open()?;
        self.check_owner(doc)?;
        let _guard = self.write_lock.lock();

        let outcome =
            SaveCoordinator::new(self.gateway.as_ref(), self.instance).save(doc, resolver, is_deletion)?;
        doc.bind(self.instance);
        Ok(outcome)
    }

    /// Remove every trace of `doc` from storage; the handle reads as never saved afterwards.
    pub fn purge_document(&self, doc: &mut MutableDocument) -> Result<(), DbError> {
        self.check_open()?;
        self.check_owner(doc)?;
        if doc.revision().is_none() {
            return Err(DbError::NotFound(doc.id().clone()));
        }
        let _guard = self.write_lock.lock();
        self.gateway.purge(doc.id())?;
        doc.detach();
        debug!(database = %self.name, doc_id = %doc.id(), "Purged document");
        Ok(())
    }

    pub fn purge_document_by_id(&self, id: &str) -> Result<(), DbError> {
        self.check_open()?;
        let id = DocId::new(id)?;
        let _guard = self.write_lock.lock();
        self.gateway.purge(&id)?;
        debug!(database = %self.name, doc_id = %id, "Purged document");
        Ok(())
    }

    /// Run `f` as one transaction: every write inside commits together or not at all.
    ///
    /// Handles saved inside a batch that later fails keep the revision they adopted; their
    /// next save writes them as new documents.
    pub fn in_batch<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Database) -> Result<T, DbError>,
    {
        self.check_open()?;
        let _guard = self.write_lock.lock();
        run_in_transaction(self.gateway.as_ref(), || f(self))
    }

    /// Number of documents whose current revision is not a tombstone.
    pub fn document_count(&self) -> Result<u64, DbError> {
        self.check_open()?;
        Ok(self.gateway.document_count()?)
    }

    pub fn last_sequence(&self) -> Result<u64, DbError> {
        self.check_open()?;
        Ok(self.gateway.last_sequence()?)
    }

    /// Stage blob content; reference the returned [`BlobRef`] from a document property.
    pub fn save_blob(&self, content: &[u8], content_type: Option<&str>) -> Result<BlobRef, DbError> {
        self.check_open()?;
        let _guard = self.write_lock.lock();
        let digest = self.gateway.store_blob(content)?;
        Ok(BlobRef::new(
            digest,
            content.len() as u64,
            content_type.map(str::to_string),
        ))
    }

    pub fn get_blob(&self, blob: &BlobRef) -> Result<Option<Vec<u8>>, DbError> {
        self.check_open()?;
        let Some(content) = self.gateway.load_blob(&blob.digest)? else {
            return Ok(None);
        };
        if content.len() as u64 != blob.length {
            return Err(StorageError::Corrupt(format!(
                "blob {} has {} bytes, reference says {}",
                blob.digest,
                content.len(),
                blob.length
            ))
            .into());
        }
        Ok(Some(content))
    }

    /// Close this instance. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), DbError> {
        let _guard = self.write_lock.lock();
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle != Lifecycle::Open {
            return Ok(());
        }
        self.gateway.close()?;
        *lifecycle = Lifecycle::Closed;
        info!(database = %self.name, instance = %self.instance, "Closed database");
        Ok(())
    }

    /// Erase all content of the underlying store and close this instance.
    ///
    /// Fails with `Busy` while other instances hold connections to the same store.
    pub fn delete(&self) -> Result<(), DbError> {
        self.check_open()?;
        let _guard = self.write_lock.lock();
        if self.gateway.in_transaction() {
            return Err(DbError::TransactionInProgress(
                "cannot delete a database inside a batch".to_string(),
            ));
        }
        self.gateway.erase()?;
        self.gateway.close()?;
        *self.lifecycle.lock() = Lifecycle::Deleted;
        info!(database = %self.name, instance = %self.instance, "Deleted database");
        Ok(())
    }

    fn check_open(&self) -> Result<(), DbError> {
        match *self.lifecycle.lock() {
            Lifecycle::Open => Ok(()),
            Lifecycle::Closed => Err(DbError::InvalidOperation(format!(
                "database {} is closed",
                self.name
            ))),
            Lifecycle::Deleted => Err(DbError::InvalidOperation(format!(
                "database {} was deleted",
                self.name
            ))),
        }
    }

    fn check_owner(&self, doc: &MutableDocument) -> Result<(), DbError> {
        match doc.owner() {
            Some(owner) if owner != self.instance => Err(DbError::Forbidden {
                doc_id: doc.id().clone(),
                owner: owner.get(),
                instance: self.instance.get(),
            }),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("instance", &self.instance)
            .field("lifecycle", &*self.lifecycle.lock())
            .finish()
    }
}
