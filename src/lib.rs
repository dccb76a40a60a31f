//! revdoc: revisioned document store with optimistic saves
//!
//! Documents are JSON-like property maps stored as a chain of revisions. A save puts a
//! new revision on top of the one the caller last saw; when someone else got there first
//! the conflict is resolved (by generation, or by a caller-supplied resolver) and the
//! save is retried once.

pub mod cli;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod document;
pub mod error;
pub mod logging;
pub mod resolver;
pub mod storage;
pub mod types;
pub mod value;

pub use coordinator::{SaveCoordinator, SaveOutcome};
pub use database::Database;
pub use document::{Document, MutableDocument};
pub use error::{DbError, ErrorKind, StorageError};
pub use resolver::{
    Conflict, ConflictOperation, ConflictResolver, LocalWins, RejectConflicts, RemoteWins,
    ThreeWayMerge,
};
pub use storage::{RevisionStore, StorageGateway};
pub use types::{BlobDigest, DocId, InstanceId, RevisionId};
pub use value::{BlobRef, Properties, Value};
