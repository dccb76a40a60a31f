//! Save Coordinator
//!
//! Runs the optimistic save protocol for one document handle:
//!
//! 1. Put a new revision whose parent is the handle's known revision.
//! 2. On success adopt the new revision.
//! 3. On conflict load the current revision and resolve (deletion loses, then the
//!    custom resolver, then the generation policy).
//! 4. If the resolution equals the stored revision, adopt it without writing.
//! 5. Otherwise put the resolution on top of the current revision, once. A second
//!    conflict is fatal.
//!
//! A handle whose revision the store no longer holds any record for (rolled back with
//! an aborted batch, or purged) is saved as a new document.
//!
//! All steps run inside one storage transaction. The caller holds the database's write
//! lock, so resolution and the retried put cannot interleave with another save through
//! the same instance.

use crate::codec;
use crate::document::{Document, MutableDocument};
use crate::error::DbError;
use crate::resolver::{resolve_by_generation, Conflict, ConflictOperation, ConflictResolver};
use crate::storage::{run_in_transaction, PutOutcome, PutRequest, StorageGateway};
use crate::types::{InstanceId, RevisionId};
use crate::value::Properties;
use tracing::{debug, info, warn};

/// How a save completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing to write; no revision was put.
    Unchanged,
    /// The first put succeeded.
    Committed { revision: RevisionId, sequence: u64 },
    /// A conflict resolved to the stored revision, which the handle adopted.
    Adopted { revision: RevisionId, sequence: u64 },
    /// A conflict was resolved and the resolution committed.
    Merged { revision: RevisionId, sequence: u64 },
}

impl SaveOutcome {
    pub fn revision(&self) -> Option<RevisionId> {
        match self {
            SaveOutcome::Unchanged => None,
            SaveOutcome::Committed { revision, .. }
            | SaveOutcome::Adopted { revision, .. }
            | SaveOutcome::Merged { revision, .. } => Some(*revision),
        }
    }

    /// Whether this save wrote a new revision.
    pub fn wrote(&self) -> bool {
        matches!(
            self,
            SaveOutcome::Committed { .. } | SaveOutcome::Merged { .. }
        )
    }
}

/// Save protocol bound to one storage connection and database instance
pub struct SaveCoordinator<'a> {
    gateway: &'a dyn StorageGateway,
    instance: InstanceId,
}

impl<'a> SaveCoordinator<'a> {
    pub fn new(gateway: &'a dyn StorageGateway, instance: InstanceId) -> Self {
        Self { gateway, instance }
    }

    /// Save `handle`, or commit a tombstone for it when `is_deletion` is set.
    ///
    /// On failure the handle is left exactly as it was before the call.
    pub fn save(
        &self,
        handle: &mut MutableDocument,
        resolver: Option<&dyn ConflictResolver>,
        is_deletion: bool,
    ) -> Result<SaveOutcome, DbError> {
        if is_deletion && handle.revision().is_none() {
            return Err(DbError::NotFound(handle.id().clone()));
        }
        if !handle.is_dirty() && !is_deletion && handle.revision().is_some() {
            if self.gateway.load(handle.id(), false)?.is_some() {
                debug!(doc_id = %handle.id(), "Save skipped: no changes");
                return Ok(SaveOutcome::Unchanged);
            }
            debug!(doc_id = %handle.id(), "Clean handle has no stored record; saving it again");
        }

        let original = handle.clone();
        let result = run_in_transaction(self.gateway, || {
            self.save_in_transaction(handle, resolver, is_deletion)
        });
        if result.is_err() {
            *handle = original;
        }
        result
    }

    fn save_in_transaction(
        &self,
        handle: &mut MutableDocument,
        resolver: Option<&dyn ConflictResolver>,
        is_deletion: bool,
    ) -> Result<SaveOutcome, DbError> {
        let doc_id = handle.id().clone();

        let parent = handle.revision().copied();
        if let PutOutcome::Committed(stored) = self.put(handle, parent, is_deletion)? {
            handle.adopt(&stored, self.instance)?;
            debug!(
                doc_id = %doc_id,
                revision = %stored.revision,
                sequence = stored.sequence,
                deleted = is_deletion,
                "Committed revision"
            );
            return Ok(SaveOutcome::Committed {
                revision: stored.revision,
                sequence: stored.sequence,
            });
        }

        let Some(current_stored) = self.gateway.load(&doc_id, false)? else {
            return self.save_orphan(handle, is_deletion);
        };
        let current = Document::from_stored(&current_stored, self.instance)?;
        debug!(
            doc_id = %doc_id,
            parent = ?parent.map(|r| r.to_string()),
            current = %current_stored.revision,
            "Save conflicted; resolving"
        );

        let resolved = self.merge(handle, &current, resolver, is_deletion)?;

        if resolved.content_eq(&current) {
            handle.adopt(&current_stored, self.instance)?;
            info!(
                doc_id = %doc_id,
                revision = %current_stored.revision,
                "Conflict resolved to the stored revision; nothing new to commit"
            );
            return Ok(SaveOutcome::Adopted {
                revision: current_stored.revision,
                sequence: current_stored.sequence,
            });
        }

        handle.overwrite_content(&resolved);
        match self.put(handle, Some(current_stored.revision), resolved.is_deleted())? {
            PutOutcome::Committed(stored) => {
                handle.adopt(&stored, self.instance)?;
                info!(
                    doc_id = %doc_id,
                    revision = %stored.revision,
                    sequence = stored.sequence,
                    "Committed conflict resolution"
                );
                Ok(SaveOutcome::Merged {
                    revision: stored.revision,
                    sequence: stored.sequence,
                })
            }
            PutOutcome::Conflict => {
                warn!(doc_id = %doc_id, "Conflict unresolved after one resolution attempt");
                Err(DbError::conflict(
                    &doc_id,
                    "conflict unresolved after one resolution attempt",
                ))
            }
        }
    }

    /// The handle's revision is not stored and neither is any other revision of the
    /// document: write it as a new document.
    fn save_orphan(
        &self,
        handle: &mut MutableDocument,
        is_deletion: bool,
    ) -> Result<SaveOutcome, DbError> {
        let doc_id = handle.id().clone();
        if is_deletion {
            return Err(DbError::NotFound(doc_id));
        }
        debug!(
            doc_id = %doc_id,
            revision = ?handle.revision().map(|r| r.to_string()),
            "Known revision is not stored; saving as a new document"
        );
        match self.put(handle, None, false)? {
            PutOutcome::Committed(stored) => {
                handle.adopt(&stored, self.instance)?;
                Ok(SaveOutcome::Committed {
                    revision: stored.revision,
                    sequence: stored.sequence,
                })
            }
            PutOutcome::Conflict => Err(DbError::conflict(
                &doc_id,
                "document was created concurrently",
            )),
        }
    }

    /// Pick the surviving content for a conflicted save.
    fn merge(
        &self,
        handle: &MutableDocument,
        current: &Document,
        resolver: Option<&dyn ConflictResolver>,
        is_deletion: bool,
    ) -> Result<Document, DbError> {
        // A deletion never overrides a concurrent write.
        if is_deletion {
            debug!(doc_id = %handle.id(), "Deletion lost to a concurrent write");
            return Ok(current.clone());
        }

        let mine = handle.snapshot();
        let Some(resolver) = resolver else {
            return Ok(resolve_by_generation(&mine, current).clone());
        };

        let conflict = Conflict {
            base: self.load_base(handle)?,
            mine,
            theirs: current.clone(),
            operation: ConflictOperation::DatabaseWrite,
        };
        let resolved = resolver
            .resolve(&conflict)
            .ok_or_else(|| DbError::conflict(handle.id(), "conflict resolver rejected the conflict"))?;

        if resolved.id() != handle.id() {
            return Err(DbError::InvalidOperation(format!(
                "conflict resolver returned document {} while resolving {}",
                resolved.id(),
                handle.id()
            )));
        }
        Ok(resolved)
    }

    fn load_base(&self, handle: &MutableDocument) -> Result<Option<Document>, DbError> {
        let Some(revision) = handle.revision() else {
            return Ok(None);
        };
        let base = self
            .gateway
            .load_revision(handle.id(), revision)?
            .map(|stored| Document::from_stored(&stored, self.instance))
            .transpose()?;
        Ok(base)
    }

    fn put(
        &self,
        handle: &MutableDocument,
        parent: Option<RevisionId>,
        deleted: bool,
    ) -> Result<PutOutcome, DbError> {
        let empty = Properties::new();
        // Tombstones carry no content.
        let properties = if deleted { &empty } else { handle.properties() };
        let request = PutRequest {
            doc_id: handle.id().clone(),
            parent,
            body: codec::encode_properties(properties)?,
            deleted,
            doc_type: codec::doc_type_of(properties),
            blobs: codec::blob_references(properties),
        };
        Ok(self.gateway.put(request)?)
    }
}
