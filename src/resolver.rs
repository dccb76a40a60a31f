//! Conflict Resolution
//!
//! A conflict arises when a save's parent revision is no longer current. The
//! coordinator builds a [`Conflict`] describing both sides and asks a
//! [`ConflictResolver`] which content survives. Returning `None` rejects the conflict,
//! which fails the save.
//!
//! Without a custom resolver the coordinator falls back to [`resolve_by_generation`].

use crate::document::Document;
use crate::value::Properties;
use std::collections::BTreeSet;

/// What kind of write raised the conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConflictOperation {
    DatabaseWrite,
}

/// Both sides of a write-write conflict
#[derive(Debug, Clone)]
pub struct Conflict {
    /// The handle's state as the caller tried to save it.
    pub mine: Document,
    /// The revision currently stored.
    pub theirs: Document,
    /// The revision `mine` was loaded from, if still retained.
    pub base: Option<Document>,
    pub operation: ConflictOperation,
}

impl Conflict {
    pub fn doc_id(&self) -> &crate::types::DocId {
        self.mine.id()
    }
}

/// Pluggable conflict resolution policy
pub trait ConflictResolver: Send + Sync {
    /// Pick or build the surviving document, or `None` to reject the conflict.
    fn resolve(&self, conflict: &Conflict) -> Option<Document>;
}

impl<F> ConflictResolver for F
where
    F: Fn(&Conflict) -> Option<Document> + Send + Sync,
{
    fn resolve(&self, conflict: &Conflict) -> Option<Document> {
        self(conflict)
    }
}

/// Default policy: the side that is not behind wins.
///
/// The local side counts as one generation ahead of its known revision, since the
/// save would have produced that generation. Equal values favor the local writer.
pub fn resolve_by_generation<'a>(mine: &'a Document, theirs: &'a Document) -> &'a Document {
    let my_next_generation = mine.generation() + 1;
    if my_next_generation >= theirs.generation() {
        mine
    } else {
        theirs
    }
}

/// The local content always wins
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalWins;

impl ConflictResolver for LocalWins {
    fn resolve(&self, conflict: &Conflict) -> Option<Document> {
        Some(conflict.mine.clone())
    }
}

/// The stored content always wins
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteWins;

impl ConflictResolver for RemoteWins {
    fn resolve(&self, conflict: &Conflict) -> Option<Document> {
        Some(conflict.theirs.clone())
    }
}

/// Every conflict fails the save
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectConflicts;

impl ConflictResolver for RejectConflicts {
    fn resolve(&self, _conflict: &Conflict) -> Option<Document> {
        None
    }
}

/// Per-key three-way merge against the common ancestor
///
/// Keys whose local value differs from the base take the local value (including local
/// removals); every other key takes the stored value. With no base available, the
/// local value wins for every key present locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeWayMerge;

impl ConflictResolver for ThreeWayMerge {
    fn resolve(&self, conflict: &Conflict) -> Option<Document> {
        let mine = conflict.mine.properties();
        let theirs = conflict.theirs.properties();
        let empty = Properties::new();
        let base = conflict.base.as_ref().map(|b| b.properties());

        let keys: BTreeSet<&String> = mine
            .keys()
            .chain(theirs.keys())
            .chain(base.unwrap_or(&empty).keys())
            .collect();

        let mut merged = Properties::new();
        for key in keys {
            let local = mine.get(key);
            let changed_locally = match base {
                Some(base) => local != base.get(key),
                None => local.is_some(),
            };
            let winner = if changed_locally { local } else { theirs.get(key) };
            if let Some(value) = winner {
                merged.insert(key.clone(), value.clone());
            }
        }

        Some(conflict.theirs.with_properties(merged))
    }
}
