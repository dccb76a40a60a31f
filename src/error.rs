//! Error types for the revdoc document store.

use crate::types::{BlobDigest, DocId};
use thiserror::Error;

/// Storage engine errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    DocumentNotFound(DocId),

    #[error("Blob not found: {0}")]
    BlobNotFound(BlobDigest),

    #[error("Store is busy: {0}")]
    Busy(String),

    #[error("Transaction in progress: {0}")]
    TransactionInProgress(String),

    #[error("Storage connection is closed")]
    Closed,

    #[error("No transaction is open")]
    NoTransaction,

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Stable classification of a [`DbError`], for callers deciding whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    Forbidden,
    InvalidOperation,
    WrongFormat,
    Busy,
    TransactionInProgress,
    Storage,
    Config,
}

/// Errors surfaced to database callers
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Conflict saving document {doc_id}: {reason}")]
    Conflict { doc_id: DocId, reason: String },

    #[error("Document not found: {0}")]
    NotFound(DocId),

    #[error("Blob not found: {0}")]
    BlobNotFound(BlobDigest),

    #[error("Document {doc_id} belongs to database instance {owner}, not {instance}")]
    Forbidden {
        doc_id: DocId,
        owner: u64,
        instance: u64,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Wrong format: {0}")]
    WrongFormat(String),

    #[error("Database is busy: {0}")]
    Busy(String),

    #[error("Transaction in progress: {0}")]
    TransactionInProgress(String),

    #[error("Storage error: {0}")]
    StorageError(StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DbError {
    pub fn conflict(doc_id: &DocId, reason: impl Into<String>) -> Self {
        DbError::Conflict {
            doc_id: doc_id.clone(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Conflict { .. } => ErrorKind::Conflict,
            DbError::NotFound(_) | DbError::BlobNotFound(_) => ErrorKind::NotFound,
            DbError::Forbidden { .. } => ErrorKind::Forbidden,
            DbError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            DbError::WrongFormat(_) => ErrorKind::WrongFormat,
            DbError::Busy(_) => ErrorKind::Busy,
            DbError::TransactionInProgress(_) => ErrorKind::TransactionInProgress,
            DbError::StorageError(_) => ErrorKind::Storage,
            DbError::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// Document the failed operation was about, if any.
    pub fn doc_id(&self) -> Option<&DocId> {
        match self {
            DbError::Conflict { doc_id, .. } | DbError::Forbidden { doc_id, .. } => Some(doc_id),
            DbError::NotFound(doc_id) => Some(doc_id),
            _ => None,
        }
    }
}

impl From<StorageError> for DbError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DocumentNotFound(id) => DbError::NotFound(id),
            StorageError::BlobNotFound(digest) => DbError::BlobNotFound(digest),
            StorageError::Busy(msg) => DbError::Busy(msg),
            StorageError::TransactionInProgress(msg) => DbError::TransactionInProgress(msg),
            StorageError::Closed => {
                DbError::InvalidOperation("storage connection is closed".to_string())
            }
            StorageError::NoTransaction => {
                DbError::InvalidOperation("no transaction is open".to_string())
            }
            other => DbError::StorageError(other),
        }
    }
}

impl From<config::ConfigError> for DbError {
    fn from(err: config::ConfigError) -> Self {
        DbError::ConfigError(err.to_string())
    }
}
