use oaps::core::error::OapsError;
use oaps::stores::spec::{
    CreateSpec, SpecFilter, SpecStatus, SpecStore, SpecType, UpdateSpec,
};
use tempfile::tempdir;

fn create(store: &SpecStore, slug: &str) -> oaps::stores::spec::Spec {
    store
        .create_spec(CreateSpec::new(slug, slug, SpecType::Feature, "test-user"))
        .expect("create spec")
}

#[test]
fn create_assigns_monotonic_ids() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());

    let first = create(&store, "spec-one");
    let second = create(&store, "spec-two");

    assert_eq!(first.id(), "SPEC-0001");
    assert_eq!(second.id(), "SPEC-0002");
    assert_eq!(first.metadata.status, SpecStatus::Draft);
}

#[test]
fn create_writes_directory_with_index() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let spec = create(&store, "layout-test");

    assert_eq!(spec.dir_path, tmp.path().join("SPEC-0001-layout-test"));
    assert!(spec.dir_path.join("spec.md").exists());
    assert!(spec.dir_path.join("index.json").exists());
}

#[test]
fn invalid_slug_rejected() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let result = store.create_spec(CreateSpec::new(
        "Invalid Slug!",
        "Bad",
        SpecType::Feature,
        "test-user",
    ));
    match result {
        Err(OapsError::Validation(message)) => assert!(message.contains("Invalid slug")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn duplicate_slug_rejected() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    create(&store, "taken");
    assert!(matches!(
        store.create_spec(CreateSpec::new("taken", "Again", SpecType::Feature, "test-user")),
        Err(OapsError::Duplicate(_))
    ));
}

#[test]
fn enhancement_requires_extends() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let result = store.create_spec(CreateSpec::new(
        "enhancement",
        "Enhancement",
        SpecType::Enhancement,
        "test-user",
    ));
    match result {
        Err(OapsError::Validation(message)) => assert!(message.contains("extends")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn integration_requires_two_integrates() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let base = create(&store, "base");

    let mut params = CreateSpec::new("integration", "Integration", SpecType::Integration, "test-user");
    params.integrates = vec![base.id().to_string()];
    match store.create_spec(params) {
        Err(OapsError::Validation(message)) => assert!(message.contains("at least")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn depends_on_unknown_spec_rejected() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let mut params = CreateSpec::new("dependent", "Dependent", SpecType::Feature, "test-user");
    params.depends_on = vec!["SPEC-9999".to_string()];
    assert!(matches!(
        store.create_spec(params),
        Err(OapsError::ReferentialIntegrity(_))
    ));
}

#[test]
fn circular_dependency_rejected() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let first = create(&store, "spec-a");

    let mut params = CreateSpec::new("spec-b", "Spec B", SpecType::Feature, "test-user");
    params.depends_on = vec![first.id().to_string()];
    let second = store.create_spec(params).expect("create");

    let result = store.update_spec(
        first.id(),
        UpdateSpec {
            depends_on: Some(vec![second.id().to_string()]),
            ..UpdateSpec::default()
        },
        "test-user",
    );
    match result {
        Err(OapsError::ReferentialIntegrity(message)) => {
            assert!(message.contains("circular"));
        }
        other => panic!("expected circular dependency error, got {other:?}"),
    }
}

#[test]
fn get_computes_dependents() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let base = create(&store, "base");

    let mut params = CreateSpec::new("dependent", "Dependent", SpecType::Feature, "test-user");
    params.depends_on = vec![base.id().to_string()];
    let dependent = store.create_spec(params).expect("create");

    let fetched = store.get_spec(base.id()).expect("get");
    assert_eq!(
        fetched.metadata.relationships.dependents,
        vec![dependent.id().to_string()]
    );

    // dependents is computed, never persisted
    let raw = std::fs::read_to_string(fetched.dir_path.join("spec.md")).expect("read");
    assert!(!raw.contains("dependents"));
}

#[test]
fn update_preserves_unmodified_fields() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let mut params = CreateSpec::new("keeper", "Original", SpecType::Feature, "test-user");
    params.summary = Some("A summary");
    let spec = store.create_spec(params).expect("create");

    let updated = store
        .update_spec(
            spec.id(),
            UpdateSpec {
                title: Some("Updated"),
                ..UpdateSpec::default()
            },
            "test-user",
        )
        .expect("update");

    assert_eq!(updated.metadata.title, "Updated");
    assert_eq!(updated.metadata.summary.as_deref(), Some("A summary"));
}

#[test]
fn rename_moves_directory() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let spec = create(&store, "old-slug");
    let old_dir = spec.dir_path.clone();

    let renamed = store
        .rename_spec(spec.id(), "new-slug", "test-user")
        .expect("rename");

    assert_eq!(renamed.metadata.slug, "new-slug");
    assert!(!old_dir.exists());
    assert!(tmp.path().join("SPEC-0001-new-slug").exists());
}

#[test]
fn rename_to_same_slug_is_noop() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let spec = create(&store, "same");
    let renamed = store
        .rename_spec(spec.id(), "same", "test-user")
        .expect("rename");
    assert_eq!(renamed.metadata.slug, "same");
}

#[test]
fn rename_to_existing_slug_fails() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    create(&store, "existing");
    let spec = create(&store, "to-rename");
    assert!(matches!(
        store.rename_spec(spec.id(), "existing", "test-user"),
        Err(OapsError::Duplicate(_))
    ));
}

#[test]
fn archive_excludes_from_default_listing() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let spec = create(&store, "short-lived");

    let archived = store.archive_spec(spec.id(), "test-user").expect("archive");
    assert_eq!(archived.metadata.status, SpecStatus::Deprecated);

    assert!(store.list_specs(&SpecFilter::default()).expect("list").is_empty());
    let all = store
        .list_specs(&SpecFilter {
            include_archived: true,
            ..Default::default()
        })
        .expect("list");
    assert_eq!(all.len(), 1);
}

#[test]
fn delete_blocked_by_dependents_unless_forced() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let base = create(&store, "base");
    let mut params = CreateSpec::new("dependent", "Dependent", SpecType::Feature, "test-user");
    params.depends_on = vec![base.id().to_string()];
    store.create_spec(params).expect("create");

    match store.delete_spec(base.id(), false, "test-user") {
        Err(OapsError::ReferentialIntegrity(message)) => {
            assert!(message.contains("depended on"));
        }
        other => panic!("expected referential integrity error, got {other:?}"),
    }

    store
        .delete_spec(base.id(), true, "test-user")
        .expect("force delete");
    assert!(!store.spec_exists(base.id()).expect("exists"));
}

#[test]
fn delete_removes_directory() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let spec = create(&store, "doomed");
    assert!(spec.dir_path.exists());

    store.delete_spec(spec.id(), false, "test-user").expect("delete");
    assert!(!spec.dir_path.exists());
}

#[test]
fn list_filters_by_status_type_and_tags() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let mut params = CreateSpec::new("tagged", "Tagged", SpecType::Feature, "test-user");
    params.tags = vec!["storage".to_string(), "core".to_string()];
    store.create_spec(params).expect("create");
    create(&store, "plain");

    let wanted = vec!["storage".to_string()];
    let by_tag = store
        .list_specs(&SpecFilter {
            tags: Some(wanted.as_slice()),
            ..Default::default()
        })
        .expect("list");
    assert_eq!(by_tag.len(), 1);
    assert_eq!(by_tag[0].slug, "tagged");

    store
        .update_spec(
            "SPEC-0002",
            UpdateSpec {
                status: Some(SpecStatus::Approved),
                ..UpdateSpec::default()
            },
            "test-user",
        )
        .expect("update");
    let approved = store
        .list_specs(&SpecFilter {
            status: Some(SpecStatus::Approved),
            ..Default::default()
        })
        .expect("list");
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].slug, "plain");
}

#[test]
fn validate_warns_on_missing_summary_and_authors() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let spec = create(&store, "bare");

    let issues = store.validate_spec(spec.id(), false).expect("validate");
    let warned_fields: Vec<_> = issues
        .iter()
        .filter_map(|i| i.field.as_deref())
        .collect();
    assert!(warned_fields.contains(&"summary"));
    assert!(warned_fields.contains(&"authors"));

    let strict = store.validate_spec(spec.id(), true).expect("validate strict");
    assert!(strict
        .iter()
        .all(|i| i.severity == oaps::stores::registry::Severity::Error));
}

#[test]
fn rebuild_index_recovers_from_missing_index() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    create(&store, "alpha");
    create(&store, "beta");

    std::fs::remove_file(store.index_path()).expect("remove index");

    let fresh = SpecStore::new(tmp.path());
    fresh.rebuild_index().expect("rebuild");
    let specs = fresh.list_specs(&SpecFilter::default()).expect("list");
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].id, "SPEC-0001");
    assert_eq!(specs[1].id, "SPEC-0002");
}

#[test]
fn mutations_append_history() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let spec = create(&store, "tracked");
    store
        .update_spec(
            spec.id(),
            UpdateSpec {
                title: Some("Renamed Title"),
                ..UpdateSpec::default()
            },
            "test-user",
        )
        .expect("update");

    let raw = std::fs::read_to_string(tmp.path().join("history.jsonl")).expect("history");
    let events: Vec<serde_json::Value> = raw
        .lines()
        .map(|line| serde_json::from_str(line).expect("event"))
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event"], "created");
    assert_eq!(events[1]["event"], "updated");
    assert_eq!(events[1]["actor"], "test-user");
}
