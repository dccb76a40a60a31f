//! Identifier types shared across the crate.

use crate::error::DbError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

const MAX_DOC_ID_LEN: usize = 240;
const REVISION_DIGEST_LEN: usize = 16;
const BLOB_DIGEST_PREFIX: &str = "blake3-";

/// Document identifier
///
/// Immutable once created. Valid IDs are 1 to 240 bytes, do not start with `_`
/// and contain no control characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Result<Self, DbError> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_DOC_ID_LEN {
            return Err(DbError::WrongFormat(format!(
                "document ID must be 1 to {} bytes, got {}",
                MAX_DOC_ID_LEN,
                id.len()
            )));
        }
        if id.starts_with('_') {
            return Err(DbError::WrongFormat(format!(
                "document ID may not start with '_': {:?}",
                id
            )));
        }
        if id.chars().any(char::is_control) {
            return Err(DbError::WrongFormat(format!(
                "document ID contains control characters: {:?}",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random ID, optionally prefixed.
    pub fn generate(prefix: Option<&str>) -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        match prefix {
            Some(prefix) if !prefix.is_empty() => Self(format!("{}{}", prefix, random)),
            _ => Self(random),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocId {
    type Error = DbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DocId::new(value)
    }
}

impl From<DocId> for String {
    fn from(id: DocId) -> Self {
        id.0
    }
}

impl FromStr for DocId {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocId::new(s)
    }
}

/// Revision identifier assigned by the storage engine on commit
///
/// Ordering is by generation first, then digest, which gives a deterministic
/// tie-break between sibling revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId {
    generation: u64,
    digest: [u8; REVISION_DIGEST_LEN],
}

impl RevisionId {
    /// Derive the revision for a new commit.
    ///
    /// Only storage engines call this; handles never fabricate revisions.
    pub fn derive(parent: Option<&RevisionId>, deleted: bool, body: &[u8]) -> Self {
        let generation = parent.map_or(1, |p| p.generation + 1);

        let mut hasher = blake3::Hasher::new();
        hasher.update(b"parent:");
        if let Some(parent) = parent {
            hasher.update(&parent.generation.to_be_bytes());
            hasher.update(&parent.digest);
        }
        hasher.update(b"deleted:");
        hasher.update(&[deleted as u8]);
        hasher.update(b"body:");
        hasher.update(body);

        let mut digest = [0u8; REVISION_DIGEST_LEN];
        digest.copy_from_slice(&hasher.finalize().as_bytes()[..REVISION_DIGEST_LEN]);

        Self { generation, digest }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, hex::encode(self.digest))
    }
}

impl FromStr for RevisionId {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wrong = || DbError::WrongFormat(format!("malformed revision ID: {:?}", s));

        let (generation, digest_hex) = s.split_once('-').ok_or_else(wrong)?;
        let generation: u64 = generation.parse().map_err(|_| wrong())?;
        if generation == 0 {
            return Err(wrong());
        }
        let bytes = hex::decode(digest_hex).map_err(|_| wrong())?;
        let digest: [u8; REVISION_DIGEST_LEN] = bytes.try_into().map_err(|_| wrong())?;

        Ok(Self { generation, digest })
    }
}

/// Content digest of a staged blob: `blake3-<hex>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobDigest(String);

impl BlobDigest {
    pub fn of(content: &[u8]) -> Self {
        Self(format!(
            "{}{}",
            BLOB_DIGEST_PREFIX,
            blake3::hash(content).to_hex()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BlobDigest {
    type Error = DbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let valid = value
            .strip_prefix(BLOB_DIGEST_PREFIX)
            .map(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()))
            .unwrap_or(false);
        if valid {
            Ok(Self(value))
        } else {
            Err(DbError::WrongFormat(format!("malformed blob digest: {:?}", value)))
        }
    }
}

impl From<BlobDigest> for String {
    fn from(digest: BlobDigest) -> Self {
        digest.0
    }
}

/// Identity of one open database instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

impl InstanceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
