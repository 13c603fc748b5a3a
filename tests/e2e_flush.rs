//! End-to-end tests for flush, staging and listener notification.

use std::sync::Arc;

use content_repo::{
    Error, MemoryStore, Path, PropertyType, Repository, RepositoryEvent, SessionMode,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

fn recording(repo: &Repository) -> Arc<Mutex<Vec<RepositoryEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    repo.register_listener(move |e: &RepositoryEvent| -> content_repo::Result<()> {
        sink.lock().push(e.clone());
        Ok(())
    });
    events
}

// ============================================================================
// 1. Events
// ============================================================================

#[test]
fn test_event_sequence() {
    let repo = Repository::open_memory().unwrap();
    let events = recording(&repo);

    let mut s = repo.create_admin_session().unwrap();
    let root = s.root().unwrap();
    let a = s.create_child(root, "a", "folder").unwrap();
    let title = s.create_property(a, "title", PropertyType::String).unwrap();
    s.set_value(title, "Hello").unwrap();
    s.flush().unwrap();
    s.close();

    let a_path = Path::parse("/a").unwrap();
    assert_eq!(
        *events.lock(),
        vec![
            RepositoryEvent::SessionStarted { mode: SessionMode::Admin },
            RepositoryEvent::NodeCreated { path: a_path.clone(), node_type: "folder".into() },
            RepositoryEvent::PropertyChanged { path: a_path.clone(), name: "title".into() },
            RepositoryEvent::PropertyChanged { path: a_path, name: "title".into() },
            RepositoryEvent::BeforeFlush { pending: 4 },
            RepositoryEvent::FlushSucceeded { applied: 4 },
            RepositoryEvent::SessionEnded { mode: SessionMode::Admin },
        ]
    );
}

#[test]
fn test_failing_listener_does_not_break_flush() {
    let repo = Repository::open_memory().unwrap();
    repo.register_listener(|_: &RepositoryEvent| -> content_repo::Result<()> {
        Err(Error::Repository("listener down".into()))
    });
    let events = recording(&repo);

    let mut s = repo.create_admin_session().unwrap();
    let root = s.root().unwrap();
    s.create_child(root, "a", "folder").unwrap();
    s.flush().unwrap();
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, RepositoryEvent::FlushSucceeded { applied: 2 })));
}

#[test]
fn test_unregistered_listener_hears_nothing() {
    let repo = Repository::open_memory().unwrap();
    let events = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&events);
    let id = repo.register_listener(move |_: &RepositoryEvent| -> content_repo::Result<()> {
        *sink.lock() += 1;
        Ok(())
    });
    assert!(repo.unregister_listener(id));
    let mut s = repo.create_admin_session().unwrap();
    s.close();
    assert_eq!(*events.lock(), 0);
}

// ============================================================================
// 2. Failure keeps staged work
// ============================================================================

#[test]
fn test_failed_flush_keeps_pending_items() {
    let store = MemoryStore::new();
    let repo = Repository::with_store(store.clone()).unwrap();
    let events = recording(&repo);

    let mut s = repo.create_admin_session().unwrap();
    let root = s.root().unwrap();
    let a = s.create_child(root, "a", "folder").unwrap();
    let p = s.create_property(a, "n", PropertyType::Long).unwrap();
    s.set_value(p, 5i64).unwrap();
    let pending = s.pending_count();
    assert_eq!(pending, 4);

    store.fail_next_commits(1);
    let err = s.flush().unwrap_err();
    assert!(matches!(&err, Error::Repository(m) if m.starts_with("flush failed")));
    assert!(s.has_pending_changes());
    assert_eq!(s.pending_count(), pending);
    assert_eq!(store.len_of("Node"), 0);
    assert!(s.record_id(content_repo::EntityHandle::Node(a)).is_none());
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, RepositoryEvent::FlushFailed { .. })));

    s.flush().unwrap();
    assert!(!s.has_pending_changes());
    assert_eq!(store.len_of("Node"), 2);

    let mut r = repo.create_read_only_session().unwrap();
    let a = r.node("/a").unwrap();
    let p = r.property(a, "n").unwrap();
    assert_eq!(r.get_long(p).unwrap(), Some(5));
}

// ============================================================================
// 3. Coalescing
// ============================================================================

#[test]
fn test_create_then_remove_writes_nothing() {
    let store = MemoryStore::new();
    let repo = Repository::with_store(store.clone()).unwrap();
    let mut s = repo.create_admin_session().unwrap();
    let root = s.root().unwrap();
    s.flush().unwrap();

    let a = s.create_child(root, "a", "folder").unwrap();
    let b = s.create_child(a, "b", "folder").unwrap();
    let p = s.create_property(b, "n", PropertyType::Long).unwrap();
    s.set_value(p, 1i64).unwrap();
    s.remove_node(a).unwrap();
    // Only the no-op removal of the transient node is left.
    assert_eq!(s.pending_count(), 1);
    s.flush().unwrap();

    assert_eq!(store.len_of("Node"), 1);
    assert_eq!(store.len_of("Property"), 0);
    assert_eq!(store.len_of("Value"), 0);
    assert_eq!(s.count_children(root).unwrap(), 0);
}

#[test]
fn test_empty_flush_succeeds() {
    let repo = Repository::open_memory().unwrap();
    let mut s = repo.create_read_only_session().unwrap();
    s.root().unwrap();
    assert!(!s.has_pending_changes());
    s.flush().unwrap();
}

#[test]
fn test_close_does_not_flush() {
    let store = MemoryStore::new();
    let repo = Repository::with_store(store.clone()).unwrap();
    let mut s = repo.create_admin_session().unwrap();
    let root = s.root().unwrap();
    s.create_child(root, "a", "folder").unwrap();
    s.close();
    assert!(s.is_closed());
    assert_eq!(store.len_of("Node"), 0);
    assert!(matches!(s.flush(), Err(Error::Repository(_))));
    assert!(matches!(
        s.create_child(root, "b", "folder"),
        Err(Error::ModificationNotAllowed(_))
    ));
}
