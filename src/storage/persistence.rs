//! Persistence layer for revision records
//!
//! Everything lives in one sled tree so a commit can be applied with a single atomic
//! `sled::Batch`. Keys are separated by prefix:
//! - `doc:{id}` -> bincode `DocumentRecord`
//! - `blob:{digest}` -> raw blob content
//! - `meta:last_sequence` -> big-endian u64

use crate::error::StorageError;
use crate::storage::{ChangeSet, DocumentRecord, RecordBackend};
use crate::types::{BlobDigest, DocId};
use bincode;
use sled;
use std::path::Path;

const DOC_PREFIX: &str = "doc:";
const BLOB_PREFIX: &str = "blob:";
const LAST_SEQUENCE_KEY: &[u8] = b"meta:last_sequence";

/// Sled-based implementation of RecordBackend
pub struct SledBackend {
    db: sled::Db,
}

fn sled_error(context: &str, e: sled::Error) -> StorageError {
    StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("{}: {}", context, e),
    ))
}

fn doc_key(id: &DocId) -> Vec<u8> {
    format!("{}{}", DOC_PREFIX, id).into_bytes()
}

fn blob_key(digest: &BlobDigest) -> Vec<u8> {
    format!("{}{}", BLOB_PREFIX, digest).into_bytes()
}

impl SledBackend {
    /// Open a sled database at the given path
    ///
    /// The path is a directory; sled creates it if needed.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| sled_error("Failed to open sled database", e))?;
        Ok(Self { db })
    }

    fn decode_record(bytes: &[u8]) -> Result<DocumentRecord, StorageError> {
        bincode::deserialize(bytes).map_err(|e| {
            StorageError::Corrupt(format!("Failed to deserialize document record: {}", e))
        })
    }
}

impl RecordBackend for SledBackend {
    fn get_record(&self, id: &DocId) -> Result<Option<DocumentRecord>, StorageError> {
        match self
            .db
            .get(doc_key(id))
            .map_err(|e| sled_error("Failed to get document record", e))?
        {
            Some(value) => Ok(Some(Self::decode_record(&value)?)),
            None => Ok(None),
        }
    }

    fn get_blob(&self, digest: &BlobDigest) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .db
            .get(blob_key(digest))
            .map_err(|e| sled_error("Failed to get blob", e))?
            .map(|value| value.to_vec()))
    }

    fn contains_blob(&self, digest: &BlobDigest) -> Result<bool, StorageError> {
        self.db
            .contains_key(blob_key(digest))
            .map_err(|e| sled_error("Failed to check blob existence", e))
    }

    fn last_sequence(&self) -> Result<u64, StorageError> {
        match self
            .db
            .get(LAST_SEQUENCE_KEY)
            .map_err(|e| sled_error("Failed to read last sequence", e))?
        {
            Some(value) => {
                let bytes = <[u8; 8]>::try_from(&value[..]).map_err(|_| {
                    StorageError::Corrupt(format!(
                        "last sequence has {} bytes, expected 8",
                        value.len()
                    ))
                })?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    fn live_count(&self) -> Result<u64, StorageError> {
        let mut count = 0u64;
        for item in self.db.scan_prefix(DOC_PREFIX.as_bytes()) {
            let (_, value) = item.map_err(|e| sled_error("Failed to iterate store", e))?;
            if Self::decode_record(&value)?.is_live() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn apply(&self, changes: ChangeSet) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();

        for (id, record) in &changes.records {
            match record {
                Some(record) => {
                    let value = bincode::serialize(record).map_err(|e| {
                        StorageError::Corrupt(format!(
                            "Failed to serialize document record: {}",
                            e
                        ))
                    })?;
                    batch.insert(doc_key(id), value);
                }
                None => batch.remove(doc_key(id)),
            }
        }
        for (digest, content) in changes.blobs {
            batch.insert(blob_key(&digest), content);
        }
        if changes.last_sequence > self.last_sequence()? {
            batch.insert(LAST_SEQUENCE_KEY, &changes.last_sequence.to_be_bytes()[..]);
        }

        self.db
            .apply_batch(batch)
            .map_err(|e| sled_error("Failed to apply batch", e))
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.db
            .clear()
            .map_err(|e| sled_error("Failed to clear database", e))
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| sled_error("Failed to flush database", e))?;
        Ok(())
    }
}
