use oaps::core::error::OapsError;
use oaps::stores::artifact::{
    AddArtifact, ArtifactContent, ArtifactFilter, ArtifactStatus, ArtifactStore, NewContent,
    UpdateArtifact,
};
use oaps::stores::registry::Severity;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use tempfile::tempdir;

fn store_in(dir: &std::path::Path) -> ArtifactStore {
    let store = ArtifactStore::new(dir);
    store.initialize().expect("initialize");
    store
}

#[test]
fn create_then_get() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());

    let artifact = store
        .add_artifact(AddArtifact::new("DC", "Architecture Decision", "dev"))
        .expect("add");
    assert_eq!(artifact.id(), "DC-0001");

    let fetched = store.get_artifact("DC-0001").expect("get");
    assert_eq!(fetched.metadata.title, "Architecture Decision");
    assert_eq!(fetched.metadata.status, ArtifactStatus::Draft);
    assert_eq!(fetched.metadata.author, "dev");

    let listed = store
        .list_artifacts(&ArtifactFilter {
            type_filter: Some("DC"),
            ..Default::default()
        })
        .expect("list");
    assert_eq!(listed.len(), 1);
}

#[test]
fn numbering_is_monotonic_per_prefix() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());

    let first = store
        .add_artifact(AddArtifact::new("DC", "First", "dev"))
        .expect("add");
    let second = store
        .add_artifact(AddArtifact::new("DC", "Second", "dev"))
        .expect("add");
    let other_prefix = store
        .add_artifact(AddArtifact::new("AN", "Analysis", "dev"))
        .expect("add");

    assert_eq!(first.id(), "DC-0001");
    assert_eq!(second.id(), "DC-0002");
    assert_eq!(other_prefix.id(), "AN-0001");
}

#[test]
fn unknown_prefix_is_rejected() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());
    assert!(matches!(
        store.add_artifact(AddArtifact::new("QQ", "Nope", "dev")),
        Err(OapsError::TypeNotRegistered(_))
    ));
}

#[test]
fn text_artifact_written_with_frontmatter_and_body() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());

    let mut params = AddArtifact::new("AN", "Latency Study", "dev");
    params.content = Some(NewContent::Text("# Findings\n\nAll good."));
    let artifact = store.add_artifact(params).expect("add");

    let raw = fs::read_to_string(&artifact.file_path).expect("read file");
    assert!(raw.starts_with("---\n"));
    assert!(raw.contains("id: AN-0001"));
    assert!(raw.contains("# Findings"));

    match store.get_artifact_content("AN-0001").expect("content") {
        ArtifactContent::Text(text) => assert!(text.contains("All good.")),
        ArtifactContent::Bytes(_) => panic!("text artifact returned bytes"),
    }
}

#[test]
fn binary_artifact_gets_sidecar() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());

    let mut fields = BTreeMap::new();
    fields.insert("alt_text".to_string(), Value::from("store layout sketch"));
    let mut params = AddArtifact::new("IM", "Layout Sketch", "dev");
    params.content = Some(NewContent::Bytes(&[0x89, 0x50, 0x4e, 0x47]));
    params.type_fields = fields;

    let artifact = store.add_artifact(params).expect("add");
    assert!(artifact.is_binary());
    let sidecar = artifact.metadata_file_path.clone().expect("sidecar path");
    assert!(sidecar.exists());
    assert!(
        sidecar
            .file_name()
            .expect("name")
            .to_string_lossy()
            .ends_with(".metadata.yaml")
    );

    match store.get_artifact_content("IM-0001").expect("content") {
        ArtifactContent::Bytes(bytes) => assert_eq!(bytes, vec![0x89, 0x50, 0x4e, 0x47]),
        ArtifactContent::Text(_) => panic!("binary artifact returned text"),
    }
}

#[test]
fn binary_artifact_requires_declared_fields() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());

    // image requires alt_text
    let result = store.add_artifact(AddArtifact::new("IM", "No Alt", "dev"));
    assert!(matches!(result, Err(OapsError::Validation(_))));
}

#[test]
fn content_and_source_path_together_rejected() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());
    let source = tmp.path().join("source.png");
    fs::write(&source, [1, 2, 3]).expect("write source");

    let mut fields = BTreeMap::new();
    fields.insert("alt_text".to_string(), Value::from("x"));
    let mut params = AddArtifact::new("IM", "Conflicted", "dev");
    params.content = Some(NewContent::Bytes(&[9]));
    params.source_path = Some(&source);
    params.type_fields = fields;

    assert!(matches!(
        store.add_artifact(params),
        Err(OapsError::Validation(_))
    ));
}

#[test]
fn update_merges_type_fields_and_preserves_body() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());

    let mut fields = BTreeMap::new();
    fields.insert("impact".to_string(), Value::from("low"));
    let mut params = AddArtifact::new("DC", "Caching Strategy", "dev");
    params.content = Some(NewContent::Text("Original body."));
    params.type_fields = fields;
    store.add_artifact(params).expect("add");

    let mut extra = BTreeMap::new();
    extra.insert("supersedes_policy".to_string(), Value::from("none"));
    let updated = store
        .update_artifact(
            "DC-0001",
            UpdateArtifact {
                status: Some(ArtifactStatus::Review),
                type_fields: extra,
                ..UpdateArtifact::default()
            },
        )
        .expect("update");

    // Merge, not replace: both keys survive.
    assert_eq!(
        updated.metadata.type_fields.get("impact"),
        Some(&Value::from("low"))
    );
    assert_eq!(
        updated.metadata.type_fields.get("supersedes_policy"),
        Some(&Value::from("none"))
    );
    assert!(updated.metadata.updated.is_some());

    match store.get_artifact_content("DC-0001").expect("content") {
        ArtifactContent::Text(text) => assert!(text.contains("Original body.")),
        ArtifactContent::Bytes(_) => panic!("unexpected bytes"),
    }
}

#[test]
fn supersession_chain() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());

    store
        .add_artifact(AddArtifact::new("DC", "Old Decision", "dev"))
        .expect("add");
    store
        .add_artifact(AddArtifact::new("DC", "New Decision", "dev"))
        .expect("add");

    store
        .supersede_artifact("DC-0001", "DC-0002")
        .expect("supersede");

    let old = store.get_artifact("DC-0001").expect("get");
    let new = store.get_artifact("DC-0002").expect("get");
    assert_eq!(old.metadata.status, ArtifactStatus::Superseded);
    assert_eq!(old.metadata.superseded_by.as_deref(), Some("DC-0002"));
    assert_eq!(new.metadata.supersedes.as_deref(), Some("DC-0001"));

    store
        .add_artifact(AddArtifact::new("DC", "Even Newer", "dev"))
        .expect("add");
    let again = store.supersede_artifact("DC-0001", "DC-0003");
    match again {
        Err(OapsError::Supersession(message)) => {
            assert!(message.contains("already superseded"));
        }
        other => panic!("expected supersession error, got {other:?}"),
    }
}

#[test]
fn supersession_requires_same_type() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());
    store
        .add_artifact(AddArtifact::new("DC", "Decision", "dev"))
        .expect("add");
    store
        .add_artifact(AddArtifact::new("AN", "Analysis", "dev"))
        .expect("add");

    assert!(matches!(
        store.supersede_artifact("DC-0001", "AN-0001"),
        Err(OapsError::Supersession(_))
    ));
}

#[test]
fn self_supersession_rejected() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());
    store
        .add_artifact(AddArtifact::new("DC", "Lonely", "dev"))
        .expect("add");
    assert!(matches!(
        store.supersede_artifact("DC-0001", "DC-0001"),
        Err(OapsError::Supersession(_))
    ));
}

#[test]
fn delete_blocked_by_references_unless_forced() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());

    store
        .add_artifact(AddArtifact::new("DC", "Referenced", "dev"))
        .expect("add");
    let mut params = AddArtifact::new("AN", "Referrer", "dev");
    params.references = vec!["DC-0001".to_string()];
    store.add_artifact(params).expect("add");

    match store.delete_artifact("DC-0001", false) {
        Err(OapsError::ReferentialIntegrity(message)) => {
            assert!(message.contains("AN-0001"));
        }
        other => panic!("expected referential integrity error, got {other:?}"),
    }

    store.delete_artifact("DC-0001", true).expect("force delete");
    assert!(!store.artifact_exists("DC-0001").expect("exists"));
}

#[test]
fn required_type_field_enforced_on_add() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());

    // review_type is required for reviews
    assert!(matches!(
        store.add_artifact(AddArtifact::new("RV", "Bad Review", "dev")),
        Err(OapsError::Validation(_))
    ));

    let mut fields = BTreeMap::new();
    fields.insert("review_type".to_string(), Value::from("design"));
    let mut params = AddArtifact::new("RV", "Good Review", "dev");
    params.type_fields = fields;
    let artifact = store.add_artifact(params).expect("add");
    assert_eq!(artifact.id(), "RV-0001");
}

#[test]
fn retract_keeps_record_with_reason() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());
    store
        .add_artifact(AddArtifact::new("DC", "Retractable", "dev"))
        .expect("add");
    let retracted = store
        .retract_artifact("DC-0001", Some("superseded offline"))
        .expect("retract");
    assert_eq!(retracted.metadata.status, ArtifactStatus::Retracted);
    assert_eq!(
        retracted.metadata.type_fields.get("retraction_reason"),
        Some(&Value::from("superseded offline"))
    );
    assert!(store.artifact_exists("DC-0001").expect("exists"));
}

#[test]
fn rebuild_index_is_idempotent() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());
    store
        .add_artifact(AddArtifact::new("DC", "One", "dev"))
        .expect("add");
    store
        .add_artifact(AddArtifact::new("AN", "Two", "dev"))
        .expect("add");

    store.rebuild_index().expect("rebuild");
    let first: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(store.index_path()).expect("read index"),
    )
    .expect("parse");

    store.rebuild_index().expect("rebuild again");
    let second: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(store.index_path()).expect("read index"),
    )
    .expect("parse");

    assert_eq!(first["artifacts"], second["artifacts"]);
}

#[test]
fn rebuild_skips_unparseable_files() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());
    store
        .add_artifact(AddArtifact::new("DC", "Valid", "dev"))
        .expect("add");

    fs::write(
        store.artifacts_path().join("20250101000000-XX-9999-junk.md"),
        "---\n: [broken\n---\n",
    )
    .expect("write junk");
    fs::write(store.artifacts_path().join(".hidden.md"), "ignored").expect("write dotfile");

    store.rebuild_index().expect("rebuild");
    let listed = store
        .list_artifacts(&ArtifactFilter::default())
        .expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), "DC-0001");
}

#[test]
fn numbering_widens_past_four_digits() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());

    fs::write(
        store.artifacts_path().join("20250101000000-DC-9999-near-limit.md"),
        "---\nid: DC-9999\ntype: decision\ntitle: Near Limit\nstatus: draft\ncreated: 2025-01-01T00:00:00+00:00\nauthor: dev\n---\n",
    )
    .expect("write artifact");
    store.rebuild_index().expect("rebuild");

    let next = store
        .add_artifact(AddArtifact::new("DC", "Past Limit", "dev"))
        .expect("add");
    assert_eq!(next.id(), "DC-10000");
}

#[test]
fn strict_validation_warns_on_first_gap_per_prefix() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());
    store
        .add_artifact(AddArtifact::new("DC", "One", "dev"))
        .expect("add");
    store
        .add_artifact(AddArtifact::new("DC", "Two", "dev"))
        .expect("add");
    store
        .add_artifact(AddArtifact::new("DC", "Three", "dev"))
        .expect("add");

    store.delete_artifact("DC-0002", false).expect("delete");

    let relaxed = store.validate(false).expect("validate");
    assert!(relaxed.iter().all(|i| i.severity != Severity::Warning));

    let strict = store.validate(true).expect("validate strict");
    let warnings: Vec<_> = strict
        .iter()
        .filter(|i| i.severity == Severity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("DC-0002"));
}

#[test]
fn index_and_filesystem_stay_in_parity() {
    let tmp = tempdir().expect("tempdir");
    let store = store_in(tmp.path());
    store
        .add_artifact(AddArtifact::new("DC", "Tracked", "dev"))
        .expect("add");

    let artifact = store.get_artifact("DC-0001").expect("get");
    assert!(artifact.file_path.exists());

    store.delete_artifact("DC-0001", false).expect("delete");
    assert!(!artifact.file_path.exists());
    assert!(
        store
            .list_artifacts(&ArtifactFilter::default())
            .expect("list")
            .is_empty()
    );
}
