//! End-to-end tests for read-only sessions and the repository lifecycle.

use content_repo::{
    Error, LifecycleState, PropertyType, Repository, RepositoryConfig, SessionMode,
};

fn seeded() -> Repository {
    let repo = Repository::open_memory().unwrap();
    let mut s = repo.create_admin_session().unwrap();
    let root = s.root().unwrap();
    let a = s.create_child(root, "a", "folder").unwrap();
    s.create_child(root, "b", "folder").unwrap();
    let tags = s.create_multi_property(a, "tags", PropertyType::String).unwrap();
    s.set_values(tags, ["x", "y"]).unwrap();
    s.flush().unwrap();
    repo
}

fn not_allowed<T: std::fmt::Debug>(r: content_repo::Result<T>) -> bool {
    matches!(r, Err(Error::ModificationNotAllowed(_)))
}

#[test]
fn test_every_mutation_rejected() {
    let repo = seeded();
    let mut r = repo.create_read_only_session().unwrap();
    assert_eq!(r.mode(), SessionMode::ReadOnly);
    assert!(r.is_read_only());
    let root = r.root().unwrap();
    let a = r.child(root, "a").unwrap();
    let tags = r.property(a, "tags").unwrap();
    let first = r.value_handles(tags).unwrap()[0];

    assert!(not_allowed(r.create_child(root, "c", "folder")));
    assert!(not_allowed(r.create_property(a, "p", PropertyType::Long)));
    assert!(not_allowed(r.create_multi_property(a, "q", PropertyType::Long)));
    assert!(not_allowed(r.set_value(tags, "z")));
    assert!(not_allowed(r.set_value_at(tags, 0, "z")));
    assert!(not_allowed(r.set_values(tags, ["z"])));
    assert!(not_allowed(r.add_value(tags, "z")));
    assert!(not_allowed(r.remove_value(first)));
    assert!(not_allowed(r.remove_property(a, "tags")));
    assert!(not_allowed(r.remove_node(a)));
    assert!(not_allowed(r.move_to_index(a, 1)));

    assert!(!r.has_pending_changes());
    assert_eq!(r.get_strings(tags).unwrap(), vec!["x".to_string(), "y".to_string()]);
    let names: Vec<String> = r
        .children(root)
        .unwrap()
        .into_iter()
        .map(|c| r.node_name(c).to_string())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_read_only_root_of_empty_repository_is_not_staged() {
    let repo = Repository::open_memory().unwrap();
    let mut r = repo.create_read_only_session().unwrap();
    let root = r.root().unwrap();
    assert_eq!(r.node_type(root), "root");
    assert_eq!(r.count_children(root).unwrap(), 0);
    assert_eq!(r.pending_count(), 0);
}

#[test]
fn test_sessions_require_open_repository() {
    let repo = Repository::from_config(RepositoryConfig::default()).unwrap();
    assert_eq!(repo.state(), LifecycleState::Open);
    repo.close();
    assert!(matches!(repo.create_admin_session(), Err(Error::Repository(_))));
}

#[test]
fn test_custom_root_type() {
    let config = RepositoryConfig::from_json_str(r#"{"root_node_type": "site"}"#).unwrap();
    let repo = Repository::from_config(config).unwrap();
    let mut s = repo.create_admin_session().unwrap();
    let root = s.root().unwrap();
    assert_eq!(s.node_type(root), "site");
    s.flush().unwrap();

    let mut r = repo.create_read_only_session().unwrap();
    let root = r.root().unwrap();
    assert!(r.record_id(content_repo::EntityHandle::Node(root)).is_some());
}
