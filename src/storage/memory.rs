//! In-memory record backend

use crate::error::StorageError;
use crate::storage::{ChangeSet, DocumentRecord, RecordBackend};
use crate::types::{BlobDigest, DocId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<DocId, DocumentRecord>,
    blobs: HashMap<BlobDigest, Vec<u8>>,
    last_sequence: u64,
}

/// Volatile backend; contents live as long as the owning store.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordBackend for MemoryBackend {
    fn get_record(&self, id: &DocId) -> Result<Option<DocumentRecord>, StorageError> {
        Ok(self.state.read().records.get(id).cloned())
    }

    fn get_blob(&self, digest: &BlobDigest) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.state.read().blobs.get(digest).cloned())
    }

    fn contains_blob(&self, digest: &BlobDigest) -> Result<bool, StorageError> {
        Ok(self.state.read().blobs.contains_key(digest))
    }

    fn last_sequence(&self) -> Result<u64, StorageError> {
        Ok(self.state.read().last_sequence)
    }

    fn live_count(&self) -> Result<u64, StorageError> {
        Ok(self
            .state
            .read()
            .records
            .values()
            .filter(|r| r.is_live())
            .count() as u64)
    }

    fn apply(&self, changes: ChangeSet) -> Result<(), StorageError> {
        let mut state = self.state.write();
        for (id, record) in changes.records {
            match record {
                Some(record) => {
                    state.records.insert(id, record);
                }
                None => {
                    state.records.remove(&id);
                }
            }
        }
        state.blobs.extend(changes.blobs);
        state.last_sequence = state.last_sequence.max(changes.last_sequence);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.state.write() = MemoryState::default();
        Ok(())
    }
}
