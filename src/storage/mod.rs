//! Storage Gateway
//!
//! The interface the save layer consumes from a revision-oriented storage engine:
//! loads, a compare-and-swap `put` keyed on the parent revision, purge, blob staging
//! and transaction boundaries. No retry, locking or conflict policy lives here.
//!
//! Two reference engines are provided: [`MemoryBackend`] and [`SledBackend`], both
//! driven through a shared [`RevisionStore`] and per-instance [`StoreConnection`]s.

pub mod engine;
pub mod memory;
pub mod persistence;

pub use engine::{RevisionStore, StoreConnection, DEFAULT_MAX_REVISION_DEPTH};
pub use memory::MemoryBackend;
pub use persistence::SledBackend;

use crate::error::StorageError;
use crate::types::{BlobDigest, DocId, RevisionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One committed revision of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRevision {
    pub doc_id: DocId,
    pub revision: RevisionId,
    pub parent: Option<RevisionId>,
    pub sequence: u64,
    pub deleted: bool,
    pub doc_type: Option<String>,
    pub body: Vec<u8>,
}

impl StoredRevision {
    pub fn generation(&self) -> u64 {
        self.revision.generation()
    }
}

/// A request to commit a new revision on top of `parent`
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub doc_id: DocId,
    /// Revision the caller last saw; `None` for a document the caller believes is new.
    pub parent: Option<RevisionId>,
    pub body: Vec<u8>,
    pub deleted: bool,
    pub doc_type: Option<String>,
    /// Blobs the body references; each must already be staged.
    pub blobs: BTreeSet<BlobDigest>,
}

/// Result of a compare-and-swap put
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Committed(StoredRevision),
    /// The stored current revision is not the requested parent.
    Conflict,
}

/// Interface the save layer requires from the storage engine.
pub trait StorageGateway: Send + Sync {
    /// Load the current revision of a document (tombstones included).
    ///
    /// Returns `DocumentNotFound` when `must_exist` is set and the document is absent.
    fn load(&self, id: &DocId, must_exist: bool) -> Result<Option<StoredRevision>, StorageError>;

    /// Load a specific revision from the retained history.
    fn load_revision(
        &self,
        id: &DocId,
        revision: &RevisionId,
    ) -> Result<Option<StoredRevision>, StorageError>;

    fn put(&self, request: PutRequest) -> Result<PutOutcome, StorageError>;

    /// Remove every trace of a document. `DocumentNotFound` if absent.
    fn purge(&self, id: &DocId) -> Result<(), StorageError>;

    fn begin_transaction(&self) -> Result<(), StorageError>;

    fn end_transaction(&self, commit: bool) -> Result<(), StorageError>;

    fn in_transaction(&self) -> bool;

    /// Number of documents whose current revision is not a tombstone.
    fn document_count(&self) -> Result<u64, StorageError>;

    fn last_sequence(&self) -> Result<u64, StorageError>;

    fn store_blob(&self, content: &[u8]) -> Result<BlobDigest, StorageError>;

    fn load_blob(&self, digest: &BlobDigest) -> Result<Option<Vec<u8>>, StorageError>;

    fn close(&self) -> Result<(), StorageError>;

    /// Delete all content of the underlying store.
    fn erase(&self) -> Result<(), StorageError>;
}

/// Run `f` inside a transaction on `gateway`.
///
/// Commits when `f` returns `Ok`, aborts and propagates the error otherwise.
/// Nested calls act as savepoints.
pub fn run_in_transaction<T, E, F>(gateway: &dyn StorageGateway, f: F) -> Result<T, E>
where
    E: From<StorageError>,
    F: FnOnce() -> Result<T, E>,
{
    gateway.begin_transaction()?;
    match f() {
        Ok(value) => {
            gateway.end_transaction(true)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(abort_err) = gateway.end_transaction(false) {
                tracing::error!(error = %abort_err, "Failed to abort transaction");
            }
            Err(err)
        }
    }
}

/// Persisted state of one document: its current revision plus retained ancestors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub current: StoredRevision,
    /// Ancestors of `current`, newest first.
    pub history: Vec<StoredRevision>,
}

impl DocumentRecord {
    pub fn new(current: StoredRevision) -> Self {
        Self {
            current,
            history: Vec::new(),
        }
    }

    /// Make `next` current, keeping at most `max_depth` revisions in total.
    pub fn advance(&mut self, next: StoredRevision, max_depth: usize) {
        let previous = std::mem::replace(&mut self.current, next);
        self.history.insert(0, previous);
        self.history.truncate(max_depth.saturating_sub(1));
    }

    pub fn find(&self, revision: &RevisionId) -> Option<&StoredRevision> {
        std::iter::once(&self.current)
            .chain(self.history.iter())
            .find(|r| r.revision == *revision)
    }

    pub fn is_live(&self) -> bool {
        !self.current.deleted
    }
}

/// Writes accumulated by one transaction, applied atomically on commit
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// `None` marks a purge.
    pub records: BTreeMap<DocId, Option<DocumentRecord>>,
    pub blobs: BTreeMap<BlobDigest, Vec<u8>>,
    pub last_sequence: u64,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.blobs.is_empty()
    }
}

/// Committed-state backend behind a [`RevisionStore`]
pub trait RecordBackend: Send + Sync {
    fn get_record(&self, id: &DocId) -> Result<Option<DocumentRecord>, StorageError>;

    fn get_blob(&self, digest: &BlobDigest) -> Result<Option<Vec<u8>>, StorageError>;

    fn contains_blob(&self, digest: &BlobDigest) -> Result<bool, StorageError>;

    fn last_sequence(&self) -> Result<u64, StorageError>;

    fn live_count(&self) -> Result<u64, StorageError>;

    /// Apply every change or none.
    fn apply(&self, changes: ChangeSet) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
