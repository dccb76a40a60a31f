//! Shared test utilities for integration tests

use revdoc::storage::{PutOutcome, PutRequest, StoreConnection};
use revdoc::{
    BlobDigest, Database, DocId, MutableDocument, RevisionId, RevisionStore, StorageError,
    StorageGateway, Value,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Global mutex to serialize environment variable access across tests
pub static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Sets environment variables for the lifetime of the guard.
pub struct EnvGuard {
    saved: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    pub fn set(vars: &[(&'static str, Option<&str>)]) -> Self {
        let saved = vars
            .iter()
            .map(|(key, value)| {
                let previous = std::env::var(key).ok();
                match value {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
                (*key, previous)
            })
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

pub fn open_memory_db() -> Database {
    Database::open("db", &RevisionStore::in_memory()).unwrap()
}

pub fn doc_with(id: &str, props: &[(&str, &str)]) -> MutableDocument {
    let mut doc = MutableDocument::with_id(id).unwrap();
    for (key, value) in props {
        doc.set(*key, *value);
    }
    doc
}

pub fn string_prop(db: &Database, id: &str, key: &str) -> Option<String> {
    db.get_document(id)
        .unwrap()
        .and_then(|doc| doc.get(key).and_then(Value::as_str).map(str::to_string))
}

/// Shared switch for [`RacingGateway`]
#[derive(Default)]
pub struct RaceControl {
    puts: AtomicUsize,
    rival_at: Mutex<Option<usize>>,
}

impl RaceControl {
    /// Number of puts forwarded so far
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Commit a rival revision right before the `nth` put from now (1-based).
    pub fn rival_before(&self, nth: usize) {
        *self.rival_at.lock().unwrap() = Some(self.puts() + nth);
    }
}

/// Gateway that lets a test commit a competing revision in the middle of a save
pub struct RacingGateway {
    inner: StoreConnection,
    control: Arc<RaceControl>,
}

impl RacingGateway {
    pub fn new(store: &Arc<RevisionStore>) -> (Self, Arc<RaceControl>) {
        let control = Arc::new(RaceControl::default());
        (
            Self {
                inner: store.connect(),
                control: Arc::clone(&control),
            },
            control,
        )
    }

    fn commit_rival(&self, id: &DocId, n: usize) -> Result<(), StorageError> {
        let parent = self.inner.load(id, false)?.map(|current| current.revision);
        let rival = PutRequest {
            doc_id: id.clone(),
            parent,
            body: format!("{{\"rival\":{}}}", n).into_bytes(),
            deleted: false,
            doc_type: None,
            blobs: BTreeSet::new(),
        };
        match self.inner.put(rival)? {
            PutOutcome::Committed(_) => Ok(()),
            PutOutcome::Conflict => Err(StorageError::Corrupt("rival put conflicted".into())),
        }
    }
}

impl StorageGateway for RacingGateway {
    fn load(
        &self,
        id: &DocId,
        must_exist: bool,
    ) -> Result<Option<revdoc::storage::StoredRevision>, StorageError> {
        self.inner.load(id, must_exist)
    }

    fn load_revision(
        &self,
        id: &DocId,
        revision: &RevisionId,
    ) -> Result<Option<revdoc::storage::StoredRevision>, StorageError> {
        self.inner.load_revision(id, revision)
    }

    fn put(&self, request: PutRequest) -> Result<PutOutcome, StorageError> {
        let n = self.control.puts.fetch_add(1, Ordering::SeqCst) + 1;
        let armed = {
            let mut rival_at = self.control.rival_at.lock().unwrap();
            if *rival_at == Some(n) {
                *rival_at = None;
                true
            } else {
                false
            }
        };
        if armed {
            self.commit_rival(&request.doc_id, n)?;
        }
        self.inner.put(request)
    }

    fn purge(&self, id: &DocId) -> Result<(), StorageError> {
        self.inner.purge(id)
    }

    fn begin_transaction(&self) -> Result<(), StorageError> {
        self.inner.begin_transaction()
    }

    fn end_transaction(&self, commit: bool) -> Result<(), StorageError> {
        self.inner.end_transaction(commit)
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn document_count(&self) -> Result<u64, StorageError> {
        self.inner.document_count()
    }

    fn last_sequence(&self) -> Result<u64, StorageError> {
        self.inner.last_sequence()
    }

    fn store_blob(&self, content: &[u8]) -> Result<BlobDigest, StorageError> {
        self.inner.store_blob(content)
    }

    fn load_blob(&self, digest: &BlobDigest) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.load_blob(digest)
    }

    fn close(&self) -> Result<(), StorageError> {
        self.inner.close()
    }

    fn erase(&self) -> Result<(), StorageError> {
        self.inner.erase()
    }
}
