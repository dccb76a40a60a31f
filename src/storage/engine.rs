//! Revision store engine
//!
//! A [`RevisionStore`] owns one committed-state backend. Each database instance talks to
//! it through its own [`StoreConnection`], which buffers a transaction's writes in an
//! overlay and applies them to the backend in one atomic step on commit.
//!
//! Write transactions are exclusive: the outermost `begin_transaction` takes the store's
//! writer gate and holds it until the matching `end_transaction`. Reads outside a
//! transaction see committed state only.

use crate::error::StorageError;
use crate::storage::{
    ChangeSet, DocumentRecord, MemoryBackend, PutOutcome, PutRequest, RecordBackend,
    SledBackend, StorageGateway, StoredRevision,
};
use crate::types::{BlobDigest, DocId, RevisionId};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use tracing::{debug, trace, warn};

/// Revisions kept per document (current plus ancestors) when not configured.
pub const DEFAULT_MAX_REVISION_DEPTH: usize = 20;

#[derive(Debug, Clone, Copy)]
struct GateHolder {
    connection: u64,
    thread: ThreadId,
}

/// Single-writer gate shared by all connections of a store
#[derive(Default)]
struct WriterGate {
    holder: Mutex<Option<GateHolder>>,
    released: Condvar,
}

impl WriterGate {
    fn acquire(&self, connection: u64) -> Result<(), StorageError> {
        let me = std::thread::current().id();
        let mut holder = self.holder.lock();
        loop {
            match *holder {
                None => {
                    *holder = Some(GateHolder {
                        connection,
                        thread: me,
                    });
                    return Ok(());
                }
                // Waiting would deadlock: the holder can only finish on this thread.
                Some(h) if h.thread == me => {
                    return Err(StorageError::Busy(format!(
                        "connection {} already holds a write transaction on this thread",
                        h.connection
                    )));
                }
                Some(_) => self.released.wait(&mut holder),
            }
        }
    }

    fn release(&self, connection: u64) {
        let mut holder = self.holder.lock();
        if holder.map_or(false, |h| h.connection == connection) {
            *holder = None;
            self.released.notify_all();
        }
    }
}

/// Shared revision store
pub struct RevisionStore {
    backend: Box<dyn RecordBackend>,
    gate: WriterGate,
    open_connections: AtomicUsize,
    next_connection: AtomicU64,
    max_revision_depth: usize,
}

impl RevisionStore {
    pub fn new(backend: Box<dyn RecordBackend>, max_revision_depth: usize) -> Arc<Self> {
        Arc::new(Self {
            backend,
            gate: WriterGate::default(),
            open_connections: AtomicUsize::new(0),
            next_connection: AtomicU64::new(1),
            max_revision_depth: max_revision_depth.max(1),
        })
    }

    /// Create an empty in-memory store
    pub fn in_memory() -> Arc<Self> {
        Self::new(Box::new(MemoryBackend::new()), DEFAULT_MAX_REVISION_DEPTH)
    }

    /// Open (or create) a sled-backed store at `path`
    pub fn open_sled<P: AsRef<Path>>(
        path: P,
        max_revision_depth: usize,
    ) -> Result<Arc<Self>, StorageError> {
        let backend = SledBackend::new(path)?;
        Ok(Self::new(Box::new(backend), max_revision_depth))
    }

    /// Open a new connection to this store.
    pub fn connect(self: &Arc<Self>) -> StoreConnection {
        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        self.open_connections.fetch_add(1, Ordering::SeqCst);
        trace!(connection = id, "Opened store connection");
        StoreConnection {
            id,
            store: Arc::clone(self),
            state: Mutex::new(TxnState::default()),
        }
    }

    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    pub fn max_revision_depth(&self) -> usize {
        self.max_revision_depth
    }

    /// Flush committed state to durable storage (no-op for memory stores)
    pub fn flush(&self) -> Result<(), StorageError> {
        self.backend.flush()
    }
}

impl Drop for RevisionStore {
    fn drop(&mut self) {
        if let Err(e) = self.backend.flush() {
            warn!(error = %e, "Failed to flush revision store on drop");
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Overlay {
    records: BTreeMap<DocId, Option<DocumentRecord>>,
    blobs: BTreeMap<BlobDigest, Vec<u8>>,
    last_sequence: u64,
}

impl Overlay {
    fn into_changes(self) -> ChangeSet {
        ChangeSet {
            records: self.records,
            blobs: self.blobs,
            last_sequence: self.last_sequence,
        }
    }
}

struct TxnState {
    open: bool,
    depth: usize,
    overlay: Overlay,
    savepoints: Vec<Overlay>,
}

impl Default for TxnState {
    fn default() -> Self {
        Self {
            open: true,
            depth: 0,
            overlay: Overlay::default(),
            savepoints: Vec::new(),
        }
    }
}

/// One database instance's connection to a [`RevisionStore`]
pub struct StoreConnection {
    id: u64,
    store: Arc<RevisionStore>,
    state: Mutex<TxnState>,
}

impl StoreConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn store(&self) -> &Arc<RevisionStore> {
        &self.store
    }

    /// Open a transaction level. The writer gate is only ever awaited with `state`
    /// unlocked, so readers of this connection never queue behind another writer.
    fn begin(&self) -> Result<(), StorageError> {
        {
            let mut state = self.readable()?;
            if state.depth > 0 {
                let savepoint = state.overlay.clone();
                state.savepoints.push(savepoint);
                state.depth += 1;
                return Ok(());
            }
        }

        self.store.gate.acquire(self.id)?;
        let mut state = self.state.lock();
        if let Err(e) = self.start_locked(&mut state) {
            self.store.gate.release(self.id);
            return Err(e);
        }
        Ok(())
    }

    /// Outermost level; the caller holds the gate.
    fn start_locked(&self, state: &mut TxnState) -> Result<(), StorageError> {
        if !state.open {
            return Err(StorageError::Closed);
        }
        if state.depth > 0 {
            return Err(StorageError::TransactionInProgress(format!(
                "connection {} began a transaction concurrently",
                self.id
            )));
        }
        state.overlay = Overlay {
            last_sequence: self.store.backend.last_sequence()?,
            ..Overlay::default()
        };
        state.savepoints.clear();
        state.depth = 1;
        Ok(())
    }

    fn end_locked(&self, state: &mut TxnState, commit: bool) -> Result<(), StorageError> {
        match state.depth {
            0 => Err(StorageError::NoTransaction),
            1 => {
                state.depth = 0;
                let overlay = std::mem::take(&mut state.overlay);
                let result = if commit {
                    let changes = overlay.into_changes();
                    if changes.is_empty() {
                        Ok(())
                    } else {
                        debug!(
                            connection = self.id,
                            records = changes.records.len(),
                            blobs = changes.blobs.len(),
                            last_sequence = changes.last_sequence,
                            "Committing transaction"
                        );
                        self.store.backend.apply(changes)
                    }
                } else {
                    debug!(connection = self.id, "Aborting transaction");
                    Ok(())
                };
                self.store.gate.release(self.id);
                result
            }
            _ => {
                state.depth -= 1;
                let savepoint = state.savepoints.pop().unwrap_or_default();
                if !commit {
                    state.overlay = savepoint;
                }
                Ok(())
            }
        }
    }

    /// Run a write step, opening an implicit transaction when none is active.
    fn write<T>(
        &self,
        f: impl FnOnce(&mut TxnState) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let implicit = self.readable()?.depth == 0;
        if implicit {
            self.begin()?;
        }
        let mut state = self.state.lock();
        if state.depth == 0 {
            return Err(StorageError::NoTransaction);
        }
        let result = f(&mut state);
        if !implicit {
            return result;
        }
        let end = self.end_locked(&mut state, result.is_ok());
        match (result, end) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        }
    }

    fn read_record(
        &self,
        state: &TxnState,
        id: &DocId,
    ) -> Result<Option<DocumentRecord>, StorageError> {
        if state.depth > 0 {
            if let Some(pending) = state.overlay.records.get(id) {
                return Ok(pending.clone());
            }
        }
        self.store.backend.get_record(id)
    }

    fn blob_exists(&self, state: &TxnState, digest: &BlobDigest) -> Result<bool, StorageError> {
        if state.depth > 0 && state.overlay.blobs.contains_key(digest) {
            return Ok(true);
        }
        self.store.backend.contains_blob(digest)
    }

    fn readable(&self) -> Result<parking_lot::MutexGuard<'_, TxnState>, StorageError> {
        let state = self.state.lock();
        if !state.open {
            return Err(StorageError::Closed);
        }
        Ok(state)
    }
}

impl StorageGateway for StoreConnection {
    fn load(&self, id: &DocId, must_exist: bool) -> Result<Option<StoredRevision>, StorageError> {
        let state = self.readable()?;
        match self.read_record(&state, id)? {
            Some(record) => Ok(Some(record.current)),
            None if must_exist => Err(StorageError::DocumentNotFound(id.clone())),
            None => Ok(None),
        }
    }

    fn load_revision(
        &self,
        id: &DocId,
        revision: &RevisionId,
    ) -> Result<Option<StoredRevision>, StorageError> {
        let state = self.readable()?;
        Ok(self
            .read_record(&state, id)?
            .and_then(|record| record.find(revision).cloned()))
    }

    fn put(&self, request: PutRequest) -> Result<PutOutcome, StorageError> {
        let max_depth = self.store.max_revision_depth;
        self.write(|state| {
            let existing = self.read_record(state, &request.doc_id)?;

            let parent_matches = match (&existing, &request.parent) {
                (None, None) => true,
                // A tombstone may be overwritten by a writer that believes the document is new.
                (Some(record), None) => record.current.deleted,
                (Some(record), Some(parent)) => record.current.revision == *parent,
                (None, Some(_)) => false,
            };
            if !parent_matches {
                debug!(
                    doc_id = %request.doc_id,
                    expected_parent = ?request.parent.map(|r| r.to_string()),
                    current = ?existing.as_ref().map(|r| r.current.revision.to_string()),
                    "Put rejected: parent is not current"
                );
                return Ok(PutOutcome::Conflict);
            }

            for digest in &request.blobs {
                if !self.blob_exists(state, digest)? {
                    return Err(StorageError::BlobNotFound(digest.clone()));
                }
            }

            let parent = existing.as_ref().map(|r| r.current.revision);
            let revision = RevisionId::derive(parent.as_ref(), request.deleted, &request.body);
            state.overlay.last_sequence += 1;

            let stored = StoredRevision {
                doc_id: request.doc_id.clone(),
                revision,
                parent,
                sequence: state.overlay.last_sequence,
                deleted: request.deleted,
                doc_type: request.doc_type,
                body: request.body,
            };

            let record = match existing {
                Some(mut record) => {
                    record.advance(stored.clone(), max_depth);
                    record
                }
                None => DocumentRecord::new(stored.clone()),
            };
            state.overlay.records.insert(request.doc_id, Some(record));

            Ok(PutOutcome::Committed(stored))
        })
    }

    fn purge(&self, id: &DocId) -> Result<(), StorageError> {
        self.write(|state| {
            if self.read_record(state, id)?.is_none() {
                return Err(StorageError::DocumentNotFound(id.clone()));
            }
            state.overlay.records.insert(id.clone(), None);
            Ok(())
        })
    }

    fn begin_transaction(&self) -> Result<(), StorageError> {
        self.begin()
    }

    fn end_transaction(&self, commit: bool) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        self.end_locked(&mut state, commit)
    }

    fn in_transaction(&self) -> bool {
        self.state.lock().depth > 0
    }

    fn document_count(&self) -> Result<u64, StorageError> {
        let state = self.readable()?;
        let mut count = self.store.backend.live_count()? as i64;
        if state.depth > 0 {
            for (id, pending) in &state.overlay.records {
                let before = self
                    .store
                    .backend
                    .get_record(id)?
                    .map_or(false, |r| r.is_live());
                let after = pending.as_ref().map_or(false, |r| r.is_live());
                count += after as i64 - before as i64;
            }
        }
        Ok(count.max(0) as u64)
    }

    fn last_sequence(&self) -> Result<u64, StorageError> {
        let state = self.readable()?;
        if state.depth > 0 {
            Ok(state.overlay.last_sequence)
        } else {
            self.store.backend.last_sequence()
        }
    }

    fn store_blob(&self, content: &[u8]) -> Result<BlobDigest, StorageError> {
        let digest = BlobDigest::of(content);
        self.write(|state| {
            if !self.blob_exists(state, &digest)? {
                state
                    .overlay
                    .blobs
                    .insert(digest.clone(), content.to_vec());
            }
            Ok(digest.clone())
        })
    }

    fn load_blob(&self, digest: &BlobDigest) -> Result<Option<Vec<u8>>, StorageError> {
        let state = self.readable()?;
        if state.depth > 0 {
            if let Some(content) = state.overlay.blobs.get(digest) {
                return Ok(Some(content.clone()));
            }
        }
        self.store.backend.get_blob(digest)
    }

    fn close(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if !state.open {
            return Ok(());
        }
        if state.depth > 0 {
            return Err(StorageError::TransactionInProgress(
                "cannot close a connection with an open transaction".to_string(),
            ));
        }
        state.open = false;
        self.store.open_connections.fetch_sub(1, Ordering::SeqCst);
        trace!(connection = self.id, "Closed store connection");
        Ok(())
    }

    fn erase(&self) -> Result<(), StorageError> {
        {
            let state = self.readable()?;
            if state.depth > 0 {
                return Err(StorageError::TransactionInProgress(
                    "cannot erase a store with an open transaction".to_string(),
                ));
            }
        }
        let others = self.store.open_connections().saturating_sub(1);
        if others > 0 {
            return Err(StorageError::Busy(format!(
                "{} other connection(s) are open on this store",
                others
            )));
        }
        self.store.gate.acquire(self.id)?;
        let result = self.store.backend.clear();
        self.store.gate.release(self.id);
        result
    }
}

impl Drop for StoreConnection {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.depth > 0 {
            state.depth = 0;
            self.store.gate.release(self.id);
        }
        if state.open {
            state.open = false;
            self.store.open_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
