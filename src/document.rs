//! Document handles
//!
//! [`Document`] is a read-only view of one revision of a document. [`MutableDocument`]
//! wraps the same representation and adds setters and dirty tracking. Both compare by
//! content (encoded properties plus the deletion flag), never by identity, so a handle
//! can be compared against a freshly loaded revision during conflict resolution.

use crate::codec;
use crate::error::StorageError;
use crate::storage::StoredRevision;
use crate::types::{DocId, InstanceId, RevisionId};
use crate::value::{Properties, Value};

/// Read-only document view
#[derive(Debug, Clone)]
pub struct Document {
    id: DocId,
    revision: Option<RevisionId>,
    sequence: u64,
    deleted: bool,
    properties: Properties,
    owner: Option<InstanceId>,
}

impl Document {
    /// A document snapshot that has never been stored.
    pub fn new(id: DocId, properties: Properties) -> Self {
        Self {
            id,
            revision: None,
            sequence: 0,
            deleted: false,
            properties,
            owner: None,
        }
    }

    pub(crate) fn from_stored(
        stored: &StoredRevision,
        owner: InstanceId,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            id: stored.doc_id.clone(),
            revision: Some(stored.revision),
            sequence: stored.sequence,
            deleted: stored.deleted,
            properties: codec::decode_properties(&stored.body)?,
            owner: Some(owner),
        })
    }

    pub fn id(&self) -> &DocId {
        &self.id
    }

    pub fn revision(&self) -> Option<&RevisionId> {
        self.revision.as_ref()
    }

    /// Generation of the known revision; 0 for a document never saved.
    pub fn generation(&self) -> u64 {
        self.revision.map_or(0, |r| r.generation())
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn to_mapping(&self) -> Properties {
        self.properties.clone()
    }

    pub(crate) fn owner(&self) -> Option<InstanceId> {
        self.owner
    }

    /// Same encoded properties and deletion state.
    pub fn content_eq(&self, other: &Document) -> bool {
        if self.deleted != other.deleted {
            return false;
        }
        match (
            codec::encode_properties(&self.properties),
            codec::encode_properties(&other.properties),
        ) {
            (Ok(mine), Ok(theirs)) => mine == theirs,
            _ => self.properties == other.properties,
        }
    }

    /// A copy of this document with different content, keeping identity and revision.
    ///
    /// Resolvers use this to build merged resolutions.
    pub fn with_properties(&self, properties: Properties) -> Document {
        Document {
            properties,
            deleted: false,
            ..self.clone()
        }
    }

    /// Writable handle over this revision, bound to the same database instance.
    pub fn to_mutable(&self) -> MutableDocument {
        MutableDocument {
            doc: self.clone(),
            dirty: false,
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.content_eq(other)
    }
}

/// Writable document handle
#[derive(Debug, Clone)]
pub struct MutableDocument {
    doc: Document,
    dirty: bool,
}

impl MutableDocument {
    /// New unsaved document with a generated ID
    pub fn new() -> Self {
        Self::from_id(DocId::generate(None))
    }

    /// New unsaved document with a caller-supplied ID
    pub fn with_id(id: &str) -> Result<Self, crate::error::DbError> {
        Ok(Self::from_id(DocId::new(id)?))
    }

    pub fn from_id(id: DocId) -> Self {
        Self {
            doc: Document::new(id, Properties::new()),
            dirty: false,
        }
    }

    pub fn id(&self) -> &DocId {
        self.doc.id()
    }

    pub fn revision(&self) -> Option<&RevisionId> {
        self.doc.revision()
    }

    pub fn generation(&self) -> u64 {
        self.doc.generation()
    }

    pub fn sequence(&self) -> u64 {
        self.doc.sequence()
    }

    pub fn is_deleted(&self) -> bool {
        self.doc.is_deleted()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    pub fn properties(&self) -> &Properties {
        self.doc.properties()
    }

    pub fn to_mapping(&self) -> Properties {
        self.doc.to_mapping()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.doc.properties.insert(key, value);
        self.dirty = true;
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.dirty = true;
        self.doc.properties.remove(key)
    }

    pub fn set_properties(&mut self, properties: Properties) -> &mut Self {
        self.doc.properties = properties;
        self.dirty = true;
        self
    }

    /// Read-only view of the handle's current in-memory state.
    pub fn snapshot(&self) -> Document {
        self.doc.clone()
    }

    pub fn as_document(&self) -> &Document {
        &self.doc
    }

    pub fn content_eq(&self, other: &Document) -> bool {
        self.doc.content_eq(other)
    }

    pub(crate) fn owner(&self) -> Option<InstanceId> {
        self.doc.owner
    }

    pub(crate) fn bind(&mut self, owner: InstanceId) {
        self.doc.owner = Some(owner);
    }

    /// Take on a committed revision: identity fields from the engine, content from the
    /// stored body.
    pub(crate) fn adopt(
        &mut self,
        stored: &StoredRevision,
        owner: InstanceId,
    ) -> Result<(), StorageError> {
        self.doc = Document::from_stored(stored, owner)?;
        self.dirty = false;
        Ok(())
    }

    /// Replace content with a resolution; the handle stays dirty until committed.
    pub(crate) fn overwrite_content(&mut self, resolved: &Document) {
        self.doc.properties = resolved.properties.clone();
        self.doc.deleted = resolved.deleted;
        self.dirty = true;
    }

    /// Forget the stored revision after a purge; the handle reads as a new document.
    pub(crate) fn detach(&mut self) {
        self.doc.revision = None;
        self.doc.sequence = 0;
        self.doc.deleted = false;
        self.dirty = true;
    }
}

impl Default for MutableDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for MutableDocument {
    fn eq(&self, other: &Self) -> bool {
        self.doc == other.doc
    }
}

impl PartialEq<Document> for MutableDocument {
    fn eq(&self, other: &Document) -> bool {
        self.doc == *other
    }
}
