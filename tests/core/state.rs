use oaps::core::error::OapsError;
use oaps::core::state::{StateStore, StateValue};
use std::sync::{Arc, Barrier};
use tempfile::tempdir;

#[test]
fn writes_are_observed_by_subsequent_reads() {
    let tmp = tempdir().expect("tempdir");
    let store = StateStore::session(tmp.path().join("state.db"), "sess-1").expect("open");

    store
        .set("current.phase", StateValue::from("implementation"), Some("dev"))
        .expect("set");
    assert_eq!(
        store.get("current.phase").expect("get").as_text(),
        Some("implementation")
    );

    store
        .set("current.phase", StateValue::from("review"), Some("dev"))
        .expect("set");
    assert_eq!(
        store.get("current.phase").expect("get").as_text(),
        Some("review")
    );
}

#[test]
fn session_and_project_scopes_never_leak() {
    let tmp = tempdir().expect("tempdir");
    let db = tmp.path().join("state.db");
    let session_a = StateStore::session(&db, "session-a").expect("open");
    let session_b = StateStore::session(&db, "session-b").expect("open");
    let project = StateStore::project(&db).expect("open");

    session_a.set("k", StateValue::from(1), None).expect("set");
    session_b.set("k", StateValue::from(2), None).expect("set");
    project.set("k", StateValue::from(3), None).expect("set");

    assert_eq!(session_a.get("k").expect("get").as_int(), Some(1));
    assert_eq!(session_b.get("k").expect("get").as_int(), Some(2));
    assert_eq!(project.get("k").expect("get").as_int(), Some(3));

    assert_eq!(session_a.len().expect("len"), 1);
    assert_eq!(project.keys().expect("keys"), vec!["k"]);

    session_a.clear().expect("clear");
    assert!(matches!(session_a.get("k"), Err(OapsError::NotFound(_))));
    assert_eq!(session_b.get("k").expect("get").as_int(), Some(2));
    assert_eq!(project.get("k").expect("get").as_int(), Some(3));
}

#[test]
fn concurrent_atomic_increments_sum_exactly() {
    let tmp = tempdir().expect("tempdir");
    let db = tmp.path().join("state.db");
    // Create schema before the threads race.
    StateStore::session(&db, "sess-1").expect("open");

    const WRITERS: usize = 10;
    let barrier = Arc::new(Barrier::new(WRITERS));
    let mut handles = Vec::new();
    for _ in 0..WRITERS {
        let db = db.clone();
        let gate = Arc::clone(&barrier);
        handles.push(std::thread::spawn(move || {
            let store = StateStore::session(&db, "sess-1").expect("open");
            gate.wait();
            store.atomic_increment("ctr", 1, Some("writer")).expect("incr")
        }));
    }

    let mut observed: Vec<i64> = handles
        .into_iter()
        .map(|h| h.join().expect("thread joined"))
        .collect();
    observed.sort_unstable();

    // Linearizable: every writer sees a distinct intermediate value.
    assert_eq!(observed, (1..=WRITERS as i64).collect::<Vec<_>>());

    let store = StateStore::session(&db, "sess-1").expect("open");
    assert_eq!(store.get("ctr").expect("get").as_int(), Some(WRITERS as i64));
}

#[test]
fn increment_on_existing_numeric_adds() {
    let tmp = tempdir().expect("tempdir");
    let store = StateStore::project(tmp.path().join("state.db")).expect("open");
    store.set("ctr", StateValue::from(40), None).expect("set");
    assert_eq!(store.atomic_increment("ctr", 2, None).expect("incr"), 42);
}

#[test]
fn increment_on_non_numeric_starts_from_zero() {
    let tmp = tempdir().expect("tempdir");
    let store = StateStore::project(tmp.path().join("state.db")).expect("open");
    store
        .set("ctr", StateValue::from("definitely text"), None)
        .expect("set");
    assert_eq!(store.atomic_increment("ctr", 3, None).expect("incr"), 3);
}

#[test]
fn counter_metadata_spans_first_and_last_writer() {
    let tmp = tempdir().expect("tempdir");
    let store = StateStore::session(tmp.path().join("state.db"), "sess-1").expect("open");

    store
        .atomic_increment("ctr", 1, Some("first-writer"))
        .expect("incr");
    let after_first = store.get_entry("ctr").expect("entry").expect("present");

    store
        .atomic_increment("ctr", 1, Some("middle-writer"))
        .expect("incr");
    store
        .atomic_increment("ctr", 1, Some("last-writer"))
        .expect("incr");
    let after_last = store.get_entry("ctr").expect("entry").expect("present");

    assert_eq!(after_last.created_at, after_first.created_at);
    assert_eq!(after_last.created_by.as_deref(), Some("first-writer"));
    assert_eq!(after_last.updated_by.as_deref(), Some("last-writer"));
    assert_eq!(after_last.value, StateValue::Int(3));
}

#[test]
fn entry_metadata_shape() {
    let tmp = tempdir().expect("tempdir");
    let store = StateStore::session(tmp.path().join("state.db"), "sess-1").expect("open");
    store
        .set("key", StateValue::from("value"), Some("author"))
        .expect("set");

    let entry = store.get_entry("key").expect("entry").expect("present");
    assert_eq!(entry.session_id, "sess-1");
    assert_eq!(entry.key, "key");
    assert!(!entry.created_at.is_empty());
    assert_eq!(entry.created_at, entry.updated_at);

    assert!(store.get_entry("missing").expect("entry").is_none());
}

#[test]
fn null_values_are_storable() {
    let tmp = tempdir().expect("tempdir");
    let store = StateStore::project(tmp.path().join("state.db")).expect("open");
    store.set("nothing", StateValue::Null, None).expect("set");
    assert!(store.contains("nothing").expect("contains"));
    assert_eq!(store.get("nothing").expect("get"), StateValue::Null);
}
