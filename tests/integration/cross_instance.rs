//! Several database instances sharing one store.

use super::test_utils::doc_with;
use revdoc::{Database, ErrorKind, RevisionStore, ThreeWayMerge, Value};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[test]
fn test_handles_are_bound_to_their_instance() {
    let store = RevisionStore::in_memory();
    let first = Database::open("db", &store).unwrap();
    let second = Database::open("db", &store).unwrap();

    let mut doc = doc_with("abc", &[("k", "v")]);
    first.save_document(&mut doc).unwrap();
    doc.set("k", "changed");

    for result in [
        second.save_document(&mut doc),
        second.delete_document(&mut doc),
    ] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Forbidden);
    }
    assert_eq!(
        second.purge_document(&mut doc).unwrap_err().kind(),
        ErrorKind::Forbidden
    );

    assert_eq!(first.document_count().unwrap(), 1);
    assert_eq!(second.document_count().unwrap(), 1);
    let stored = second.get_document("abc").unwrap().unwrap();
    assert_eq!(stored.get("k"), Some(&Value::from("v")));
}

#[test]
fn test_loaded_document_is_bound_to_loading_instance() {
    let store = RevisionStore::in_memory();
    let first = Database::open("db", &store).unwrap();
    let second = Database::open("db", &store).unwrap();

    let mut doc = doc_with("abc", &[("k", "v")]);
    first.save_document(&mut doc).unwrap();

    let mut through_second = second.get_document("abc").unwrap().unwrap().to_mutable();
    through_second.set("k", "second");
    second.save_document(&mut through_second).unwrap();
    assert_eq!(
        first.save_document(&mut through_second).unwrap_err().kind(),
        ErrorKind::Forbidden
    );
}

#[test]
fn test_instances_detect_each_others_commits() {
    let store = RevisionStore::in_memory();
    let first = Database::open("db", &store).unwrap();
    let second = Database::open("db", &store).unwrap();

    let mut mine = doc_with("abc", &[("k", "1")]);
    first.save_document(&mut mine).unwrap();

    let mut theirs = second.get_document("abc").unwrap().unwrap().to_mutable();
    theirs.set("k", "2");
    second.save_document(&mut theirs).unwrap();
    theirs.set("k", "3");
    second.save_document(&mut theirs).unwrap();

    mine.set("k", "stale");
    first.save_document(&mut mine).unwrap();
    assert_eq!(mine.get("k"), Some(&Value::from("3")));
    assert_eq!(mine.revision(), theirs.revision());
}

#[test]
fn test_concurrent_writers_converge_with_three_way_merge() {
    let store = RevisionStore::in_memory();
    let setup = Database::open("db", &store).unwrap();
    let mut shared = doc_with("shared", &[]);
    setup.save_document(&mut shared).unwrap();

    let workers: Vec<_> = (0..2)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let db = Database::open("db", &store).unwrap();
                for n in 0..10i64 {
                    let mut doc = db.get_document("shared").unwrap().unwrap().to_mutable();
                    doc.set(format!("w{}", worker), n);
                    db.save_document_with_resolver(&mut doc, &ThreeWayMerge)
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let doc = setup.get_document("shared").unwrap().unwrap();
    assert_eq!(doc.get("w0"), Some(&Value::Int(9)));
    assert_eq!(doc.get("w1"), Some(&Value::Int(9)));
    assert_eq!(setup.document_count().unwrap(), 1);
}

#[test]
fn test_deleted_database_rejects_further_use() {
    let store = RevisionStore::in_memory();
    let db = Database::open("db", &store).unwrap();
    let mut doc = doc_with("abc", &[("k", "v")]);
    db.save_document(&mut doc).unwrap();

    db.delete().unwrap();
    assert!(!db.is_open());
    doc.set("k", "after");
    assert_eq!(
        db.save_document(&mut doc).unwrap_err().kind(),
        ErrorKind::InvalidOperation
    );
    assert_eq!(
        db.purge_document_by_id("abc").unwrap_err().kind(),
        ErrorKind::InvalidOperation
    );
    assert_eq!(store.open_connections(), 0);
}

#[test]
fn test_reader_is_not_blocked_by_writer_waiting_for_batch() {
    let store = RevisionStore::in_memory();
    let first = Arc::new(Database::open("db", &store).unwrap());
    let second = Arc::new(Database::open("db", &store).unwrap());
    let mut seed = doc_with("x", &[("k", "v")]);
    first.save_document(&mut seed).unwrap();

    let (batch_open_tx, batch_open_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();

    // Holds the writer gate, then reads through the instance whose writer is queued.
    let batch = {
        let first = Arc::clone(&first);
        let second = Arc::clone(&second);
        let done_tx = done_tx.clone();
        thread::spawn(move || {
            let read = first.in_batch(|_| {
                batch_open_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(200));
                second.get_document("x")
            });
            done_tx.send(read.map(|doc| doc.is_some())).unwrap();
        })
    };

    let writer = {
        let second = Arc::clone(&second);
        thread::spawn(move || {
            batch_open_rx.recv().unwrap();
            let mut doc = second.get_document("x").unwrap().unwrap().to_mutable();
            doc.set("k", "w");
            let saved = second.save_document(&mut doc).map(|outcome| outcome.wrote());
            done_tx.send(saved).unwrap();
        })
    };

    for _ in 0..2 {
        let finished = done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("both threads finish");
        assert!(finished.unwrap());
    }
    batch.join().unwrap();
    writer.join().unwrap();

    let doc = first.get_document("x").unwrap().unwrap();
    assert_eq!(doc.get("k"), Some(&Value::from("w")));
}
