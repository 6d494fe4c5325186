use oaps::stores::artifact::AddArtifact;
use oaps::stores::query::{QueryEngine, RelationshipType};
use oaps::stores::requirement::{
    CreateRequirement, CreateTest, RequirementStatus, RequirementStore, RequirementType,
    TestMethod, TestResult, TestStore, UpdateRequirement, UpdateTest,
};
use oaps::stores::spec::{CreateSpec, SpecStore, SpecType};
use tempfile::tempdir;

fn create_spec(store: &SpecStore, slug: &str, depends_on: &[&str]) -> String {
    let mut params = CreateSpec::new(slug, slug, SpecType::Feature, "test-user");
    params.depends_on = depends_on.iter().map(|s| s.to_string()).collect();
    store.create_spec(params).expect("create spec").id().to_string()
}

fn add_requirement(
    store: &SpecStore,
    spec_id: &str,
    req_type: RequirementType,
    status: RequirementStatus,
) -> String {
    let spec = store.get_spec(spec_id).expect("get spec");
    let reqs = RequirementStore::new(&spec.dir_path);
    let req = reqs
        .create(CreateRequirement::new(req_type, "A requirement", "Desc", "dev"))
        .expect("create requirement");
    reqs.update(
        &req.id,
        UpdateRequirement {
            status: Some(status),
            ..UpdateRequirement::default()
        },
    )
    .expect("update requirement");
    req.id
}

fn add_test(
    store: &SpecStore,
    spec_id: &str,
    method: TestMethod,
    result: TestResult,
    requirements: &[&str],
    file: Option<&str>,
) -> String {
    let spec = store.get_spec(spec_id).expect("get spec");
    let tests = TestStore::new(&spec.dir_path);
    let mut params = CreateTest::new("A test", method);
    params.tests_requirements = requirements.iter().map(|s| s.to_string()).collect();
    params.file = file;
    params.function = file.map(|_| "test_fn");
    let test = tests.create(params).expect("create test");
    tests
        .update(
            &test.id,
            UpdateTest {
                last_result: Some(result),
                ..UpdateTest::default()
            },
        )
        .expect("update test");
    test.id
}

#[test]
fn progress_on_empty_spec_is_zero() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let spec_id = create_spec(&store, "empty", &[]);

    let engine = QueryEngine::new(&store);
    let report = engine.progress(&spec_id).expect("progress");
    assert_eq!(report.total_requirements, 0);
    assert_eq!(report.implemented_requirements, 0);
    assert_eq!(report.overall_percentage, 0.0);
    assert!(report.by_type.is_empty());

    let coverage = engine.coverage(&spec_id).expect("coverage");
    assert_eq!(coverage.overall_coverage, 0.0);
    assert!(coverage.requirement_to_tests.is_empty());

    let orphans = engine.orphans(&spec_id).expect("orphans");
    assert!(orphans.orphaned_tests.is_empty());
    assert!(orphans.tests_missing_file.is_empty());
}

#[test]
fn progress_counts_implemented_and_verified() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let spec_id = create_spec(&store, "progressing", &[]);

    add_requirement(&store, &spec_id, RequirementType::Functional, RequirementStatus::Proposed);
    add_requirement(&store, &spec_id, RequirementType::Functional, RequirementStatus::Implemented);
    add_requirement(&store, &spec_id, RequirementType::Quality, RequirementStatus::Verified);

    let engine = QueryEngine::new(&store);
    let report = engine.progress(&spec_id).expect("progress");
    assert_eq!(report.total_requirements, 3);
    assert_eq!(report.implemented_requirements, 2);
    assert_eq!(report.verified_requirements, 1);
    assert!((report.overall_percentage - 66.666).abs() < 0.01);

    let functional = report
        .by_type
        .iter()
        .find(|t| t.req_type == RequirementType::Functional)
        .expect("functional bucket");
    assert_eq!(functional.total, 2);
    assert_eq!(functional.implemented, 1);
    let quality = report
        .by_type
        .iter()
        .find(|t| t.req_type == RequirementType::Quality)
        .expect("quality bucket");
    assert_eq!(quality.verified, 1);
    assert_eq!(quality.percentage, 100.0);
}

#[test]
fn coverage_counts_only_passing_tests() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let spec_id = create_spec(&store, "covered", &[]);

    let req = add_requirement(
        &store,
        &spec_id,
        RequirementType::Functional,
        RequirementStatus::Implemented,
    );
    let passing = add_test(
        &store,
        &spec_id,
        TestMethod::Unit,
        TestResult::Pass,
        &[&req],
        Some("tests/unit.rs"),
    );
    add_test(
        &store,
        &spec_id,
        TestMethod::Unit,
        TestResult::Fail,
        &[&req],
        Some("tests/unit.rs"),
    );

    let engine = QueryEngine::new(&store);
    let report = engine.coverage(&spec_id).expect("coverage");
    assert_eq!(report.covered_requirements, 1);
    assert_eq!(report.overall_coverage, 100.0);
    assert_eq!(report.requirement_to_tests[&req], vec![passing]);

    let unit = report
        .by_method
        .iter()
        .find(|m| m.method == TestMethod::Unit)
        .expect("unit bucket");
    assert_eq!(unit.total_tests, 2);
    assert_eq!(unit.passing_tests, 1);
    assert_eq!(unit.requirements_covered, 1);

    assert!(engine.unverified(&spec_id).expect("unverified").is_empty());
}

#[test]
fn failed_only_coverage_leaves_requirement_unverified() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let spec_id = create_spec(&store, "uncovered", &[]);

    let req = add_requirement(
        &store,
        &spec_id,
        RequirementType::Functional,
        RequirementStatus::Implemented,
    );
    add_test(
        &store,
        &spec_id,
        TestMethod::Unit,
        TestResult::Fail,
        &[&req],
        Some("tests/unit.rs"),
    );

    let engine = QueryEngine::new(&store);
    let report = engine.coverage(&spec_id).expect("coverage");
    assert_eq!(report.covered_requirements, 0);
    assert_eq!(report.overall_coverage, 0.0);

    let unverified = engine.unverified(&spec_id).expect("unverified");
    assert_eq!(unverified.len(), 1);
    assert_eq!(unverified[0].id, req);
}

#[test]
fn orphan_detection() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let spec_id = create_spec(&store, "orphanage", &[]);

    let req = add_requirement(
        &store,
        &spec_id,
        RequirementType::Functional,
        RequirementStatus::Proposed,
    );

    // References only a nonexistent requirement: orphaned.
    let orphan = add_test(
        &store,
        &spec_id,
        TestMethod::Unit,
        TestResult::Pass,
        &["REQ-9999"],
        Some("tests/orphan.rs"),
    );
    // References one live requirement: not orphaned, but missing file.
    let incomplete = add_test(
        &store,
        &spec_id,
        TestMethod::Manual,
        TestResult::Unknown,
        &[&req],
        None,
    );

    // Artifact referencing nothing live is orphaned; one without
    // references is not.
    let spec = store.get_spec(&spec_id).expect("get spec");
    let artifacts = oaps::stores::artifact::ArtifactStore::new(&spec.dir_path);
    artifacts.initialize().expect("initialize");
    let mut params = AddArtifact::new("AN", "Dangling", "dev");
    params.references = vec!["REQ-8888".to_string()];
    artifacts.add_artifact(params).expect("add");
    artifacts
        .add_artifact(AddArtifact::new("NT", "Plain Note", "dev"))
        .expect("add");

    let engine = QueryEngine::with_artifacts(&store);
    let report = engine.orphans(&spec_id).expect("orphans");

    let orphan_ids: Vec<&str> = report.orphaned_tests.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(orphan_ids, vec![orphan.as_str()]);

    let missing_ids: Vec<&str> = report
        .tests_missing_file
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(missing_ids, vec![incomplete.as_str()]);

    assert_eq!(report.orphaned_artifacts, vec!["AN-0001".to_string()]);
}

#[test]
fn dependency_graph_shape() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let base = create_spec(&store, "base", &[]);
    let mid = create_spec(&store, "mid", &[&base]);
    let top = create_spec(&store, "top", &[&mid]);
    let lone = create_spec(&store, "lone", &[]);

    let engine = QueryEngine::new(&store);
    let graph = engine.dependency_graph(None).expect("graph");

    assert!(!graph.has_cycles);
    assert!(graph.cycle_path.is_empty());
    assert_eq!(graph.nodes.len(), 4);
    assert_eq!(graph.edges.len(), 2);
    assert!(graph.edges.contains(&(mid.clone(), base.clone())));
    assert!(graph.edges.contains(&(top.clone(), mid.clone())));

    // Roots: nothing depends on them. Leaves: no dependencies.
    assert!(graph.roots.contains(&base));
    assert!(graph.roots.contains(&lone));
    assert!(graph.leaves.contains(&base));
    assert!(graph.leaves.contains(&lone));
    assert!(!graph.leaves.contains(&top));

    // Topological order is a permutation of the nodes when acyclic.
    assert_eq!(graph.topological_order.len(), graph.nodes.len());
    let pos = |id: &str| {
        graph
            .topological_order
            .iter()
            .position(|node| node == id)
            .expect("in order")
    };
    assert!(pos(&top) < pos(&mid));
    assert!(pos(&mid) < pos(&base));

    // Depths from the roots, dependents below.
    let depth = |id: &str| {
        graph
            .nodes
            .iter()
            .find(|n| n.spec_id == id)
            .expect("node")
            .depth
    };
    assert_eq!(depth(&base), 0);
    assert_eq!(depth(&mid), 1);
    assert_eq!(depth(&top), 2);
}

#[test]
fn dependency_graph_restricted_to_one_spec() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let base = create_spec(&store, "base", &[]);
    let mid = create_spec(&store, "mid", &[&base]);
    let _unrelated = create_spec(&store, "unrelated", &[]);

    let engine = QueryEngine::new(&store);
    let graph = engine.dependency_graph(Some(&mid)).expect("graph");

    let ids: Vec<&str> = graph.nodes.iter().map(|n| n.spec_id.as_str()).collect();
    assert!(ids.contains(&base.as_str()));
    assert!(ids.contains(&mid.as_str()));
    assert!(!ids.contains(&"SPEC-0003"));
}

#[test]
fn dependency_graph_unknown_spec_errors() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    create_spec(&store, "only", &[]);

    let engine = QueryEngine::new(&store);
    assert!(engine.dependency_graph(Some("SPEC-9999")).is_err());
}

#[test]
fn relationship_graph_labels_and_filters() {
    let tmp = tempdir().expect("tempdir");
    let store = SpecStore::new(tmp.path());
    let base = create_spec(&store, "base", &[]);
    let second = create_spec(&store, "second", &[&base]);

    let mut params = CreateSpec::new("extension", "Extension", SpecType::Enhancement, "test-user");
    params.extends = Some(base.clone());
    let extension = store.create_spec(params).expect("create").id().to_string();

    let mut params = CreateSpec::new("bridge", "Bridge", SpecType::Integration, "test-user");
    params.integrates = vec![base.clone(), second.clone()];
    store.create_spec(params).expect("create");

    let engine = QueryEngine::new(&store);
    let graph = engine.relationship_graph(None, None).expect("graph");
    assert_eq!(graph.nodes.len(), 4);

    let kinds: Vec<RelationshipType> = graph
        .edges
        .iter()
        .map(|e| e.relationship_type)
        .collect();
    assert!(kinds.contains(&RelationshipType::DependsOn));
    assert!(kinds.contains(&RelationshipType::Extends));
    assert!(kinds.contains(&RelationshipType::Integrates));

    let only_extends = engine
        .relationship_graph(None, Some(&[RelationshipType::Extends]))
        .expect("graph");
    assert_eq!(only_extends.edges.len(), 1);
    assert_eq!(only_extends.edges[0].from_spec_id, extension);
    assert_eq!(only_extends.edges[0].to_spec_id, base);

    assert!(graph.node_index.contains_key(&base));
}
