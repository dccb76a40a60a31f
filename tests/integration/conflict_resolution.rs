//! Conflict detection and resolution through the database surface.

use super::test_utils::{doc_with, open_memory_db, string_prop, RacingGateway};
use revdoc::{
    Conflict, ConflictOperation, Database, Document, ErrorKind, LocalWins, RejectConflicts,
    RevisionStore, SaveOutcome, ThreeWayMerge, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_two_new_handles_same_id_leave_one_document() {
    let db = open_memory_db();
    let mut first = doc_with("abc", &[("somekey", "someVar")]);
    let mut second = doc_with("abc", &[("somekey", "newVar")]);

    db.save_document(&mut first).unwrap();
    let outcome = db.save_document(&mut second).unwrap();

    // Generation 0 + 1 ties with the stored generation 1, so the later writer's content
    // is committed on top of the first revision.
    assert!(matches!(outcome, SaveOutcome::Merged { .. }));
    assert_eq!(db.document_count().unwrap(), 1);
    let stored = db.get_document("abc").unwrap().unwrap();
    assert_eq!(stored.generation(), 2);
    assert_eq!(stored.get("somekey"), Some(&Value::from("newVar")));
    assert_eq!(stored.revision(), second.revision());
}

#[test]
fn test_higher_generation_wins() {
    let db = open_memory_db();
    let mut doc = doc_with("abc", &[("v", "1")]);
    db.save_document(&mut doc).unwrap();
    let mut behind = doc.clone();
    for v in ["2", "3"] {
        doc.set("v", v);
        db.save_document(&mut doc).unwrap();
    }

    behind.set("v", "behind");
    let outcome = db.save_document(&mut behind).unwrap();
    assert!(matches!(outcome, SaveOutcome::Adopted { .. }));
    assert_eq!(behind.get("v"), Some(&Value::from("3")));
    assert_eq!(string_prop(&db, "abc", "v").as_deref(), Some("3"));
}

#[test]
fn test_deletion_loses_to_concurrent_content_save() {
    let db = open_memory_db();
    let mut writer = doc_with("abc", &[("v", "1")]);
    db.save_document(&mut writer).unwrap();
    let mut deleter = writer.clone();

    writer.set("v", "2");
    db.save_document(&mut writer).unwrap();

    db.delete_document(&mut deleter).unwrap();
    assert!(!deleter.is_deleted());
    assert!(db.contains_document("abc").unwrap());
    assert_eq!(string_prop(&db, "abc", "v").as_deref(), Some("2"));
}

#[test]
fn test_rejecting_resolver_leaves_stored_state_untouched() {
    let db = open_memory_db();
    let mut first = doc_with("abc", &[("v", "first")]);
    db.save_document(&mut first).unwrap();
    let before = db.get_document("abc").unwrap().unwrap();

    let mut second = doc_with("abc", &[("v", "second")]);
    let err = db
        .save_document_with_resolver(&mut second, &RejectConflicts)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.doc_id().map(|id| id.as_str()), Some("abc"));

    let after = db.get_document("abc").unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(after.revision(), before.revision());
    assert_eq!(db.last_sequence().unwrap(), 1);
}

#[test]
fn test_resolver_is_called_once_per_conflict() {
    let db = open_memory_db();
    let mut first = doc_with("abc", &[("v", "first")]);
    db.save_document(&mut first).unwrap();

    let calls = AtomicUsize::new(0);
    let counting = |c: &Conflict| {
        calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(c.operation, ConflictOperation::DatabaseWrite);
        assert!(c.base.is_none());
        Some(c.mine.clone())
    };

    let mut second = doc_with("abc", &[("v", "second")]);
    db.save_document_with_resolver(&mut second, &counting)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // No conflict, no call.
    second.set("v", "third");
    db.save_document_with_resolver(&mut second, &counting)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_local_wins_overrides_newer_stored_revision() {
    let db = open_memory_db();
    let mut doc = doc_with("abc", &[("v", "1")]);
    db.save_document(&mut doc).unwrap();
    let mut behind = doc.clone();
    for v in ["2", "3", "4"] {
        doc.set("v", v);
        db.save_document(&mut doc).unwrap();
    }

    behind.set("v", "mine");
    db.save_document_with_resolver(&mut behind, &LocalWins)
        .unwrap();
    assert_eq!(behind.generation(), 5);
    assert_eq!(string_prop(&db, "abc", "v").as_deref(), Some("mine"));
}

#[test]
fn test_three_way_merge_combines_disjoint_edits() {
    let db = open_memory_db();
    let mut doc = doc_with("abc", &[("title", "draft"), ("body", "text")]);
    db.save_document(&mut doc).unwrap();
    let mut other = doc.clone();

    doc.set("title", "final");
    db.save_document(&mut doc).unwrap();

    other.set("body", "edited text");
    let outcome = db
        .save_document_with_resolver(&mut other, &ThreeWayMerge)
        .unwrap();
    assert!(matches!(outcome, SaveOutcome::Merged { .. }));

    assert_eq!(string_prop(&db, "abc", "title").as_deref(), Some("final"));
    assert_eq!(string_prop(&db, "abc", "body").as_deref(), Some("edited text"));
}

#[test]
fn test_resolver_returning_foreign_document_is_invalid() {
    let db = open_memory_db();
    let mut first = doc_with("abc", &[("v", "first")]);
    db.save_document(&mut first).unwrap();

    let elsewhere = db.create_document().snapshot();
    let resolver = move |_: &Conflict| -> Option<Document> { Some(elsewhere.clone()) };

    let mut second = doc_with("abc", &[("v", "second")]);
    let err = db
        .save_document_with_resolver(&mut second, &resolver)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert!(second.revision().is_none());
}

#[test]
fn test_second_conflict_is_fatal_even_with_resolver() {
    let store = RevisionStore::in_memory();
    let (gateway, race) = RacingGateway::new(&store);
    let db = Database::with_gateway("db", Box::new(gateway)).unwrap();

    let mut first = doc_with("abc", &[("v", "first")]);
    db.save_document(&mut first).unwrap();

    let mut second = doc_with("abc", &[("v", "second")]);
    race.rival_before(2);
    let err = db
        .save_document_with_resolver(&mut second, &LocalWins)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("unresolved"));
    assert_eq!(string_prop(&db, "abc", "v").as_deref(), Some("first"));
}
