//! Read-only query layer over the spec, requirement, test, and artifact
//! stores.
//!
//! All computations return frozen value objects. Coverage counts a
//! requirement as covered only by tests that reference it and whose last
//! result is `pass`. Graph queries run over the whole store (archived
//! specs included) and can be restricted to the ancestors, descendants,
//! and self of one spec. Where several nodes rank equally, store
//! insertion order is preserved.

use crate::core::error::OapsError;
use crate::stores::artifact::ArtifactFilter;
use crate::stores::requirement::{
    Requirement, RequirementStatus, RequirementStore, RequirementType, TestMethod, TestRecord,
    TestResult, TestStore,
};
use crate::stores::spec::{SpecStatus, SpecStore, SpecSummary, SpecType};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// Relationship kinds carried on relationship-graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    DependsOn,
    Extends,
    Supersedes,
    Integrates,
}

/// Progress breakdown for one requirement type.
#[derive(Debug, Clone, Serialize)]
pub struct TypeProgress {
    pub req_type: RequirementType,
    pub total: usize,
    pub implemented: usize,
    pub verified: usize,
    pub percentage: f64,
}

/// Implementation progress of a spec.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub spec_id: String,
    pub total_requirements: usize,
    pub implemented_requirements: usize,
    pub verified_requirements: usize,
    pub overall_percentage: f64,
    pub by_type: Vec<TypeProgress>,
}

/// Coverage breakdown for one test method.
#[derive(Debug, Clone, Serialize)]
pub struct MethodCoverage {
    pub method: TestMethod,
    pub total_tests: usize,
    pub passing_tests: usize,
    pub requirements_covered: usize,
}

/// Coverage breakdown for one requirement type.
#[derive(Debug, Clone, Serialize)]
pub struct TypeCoverage {
    pub req_type: RequirementType,
    pub total_requirements: usize,
    pub covered_requirements: usize,
    pub coverage_percentage: f64,
}

/// Test coverage of a spec.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub spec_id: String,
    pub total_requirements: usize,
    pub covered_requirements: usize,
    pub overall_coverage: f64,
    pub by_method: Vec<MethodCoverage>,
    pub by_type: Vec<TypeCoverage>,
    /// Requirement id → ids of passing tests covering it. Read-only
    /// snapshot.
    pub requirement_to_tests: BTreeMap<String, Vec<String>>,
}

/// Orphaned records of a spec.
#[derive(Debug, Clone, Serialize)]
pub struct OrphanReport {
    pub spec_id: String,
    /// Tests none of whose referenced requirements exist in the spec.
    pub orphaned_tests: Vec<TestRecord>,
    /// Artifacts whose references name no live requirement.
    pub orphaned_artifacts: Vec<String>,
    /// Tests missing a file or function pointer.
    pub tests_missing_file: Vec<TestRecord>,
}

/// One node of the dependency graph.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyNode {
    pub spec_id: String,
    pub title: String,
    pub status: SpecStatus,
    /// BFS distance from the roots, maximized on ties.
    pub depth: usize,
}

/// The spec dependency graph: edge `A -> B` means A depends on B.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyGraph {
    pub nodes: Vec<DependencyNode>,
    pub edges: Vec<(String, String)>,
    /// Specs nothing depends on.
    pub roots: Vec<String>,
    /// Specs with no dependencies.
    pub leaves: Vec<String>,
    /// Empty when the graph has cycles.
    pub topological_order: Vec<String>,
    pub has_cycles: bool,
    /// A closed walk when a cycle exists (first id repeated last).
    pub cycle_path: Vec<String>,
}

/// One node of the relationship graph.
#[derive(Debug, Clone, Serialize)]
pub struct SpecNode {
    pub spec_id: String,
    pub title: String,
    pub spec_type: SpecType,
    pub status: SpecStatus,
}

/// One labelled edge of the relationship graph.
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipEdge {
    pub from_spec_id: String,
    pub to_spec_id: String,
    pub relationship_type: RelationshipType,
}

/// The labelled relationship graph over specs.
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipGraph {
    pub nodes: Vec<SpecNode>,
    pub edges: Vec<RelationshipEdge>,
    pub node_index: BTreeMap<String, SpecNode>,
}

/// Read-only query engine over one spec store.
pub struct QueryEngine<'a> {
    specs: &'a SpecStore,
    include_artifacts: bool,
}

impl<'a> QueryEngine<'a> {
    pub fn new(specs: &'a SpecStore) -> Self {
        Self {
            specs,
            include_artifacts: false,
        }
    }

    /// Also scan each spec's nested artifact substore in `orphans`.
    pub fn with_artifacts(specs: &'a SpecStore) -> Self {
        Self {
            specs,
            include_artifacts: true,
        }
    }

    fn requirements_of(&self, spec_id: &str) -> Result<Vec<Requirement>, OapsError> {
        let spec = self.specs.get_spec(spec_id)?;
        RequirementStore::new(&spec.dir_path).list()
    }

    fn tests_of(&self, spec_id: &str) -> Result<Vec<TestRecord>, OapsError> {
        let spec = self.specs.get_spec(spec_id)?;
        TestStore::new(&spec.dir_path).list()
    }

    /// Implementation progress for a spec. A spec with zero requirements
    /// reports 0%.
    pub fn progress(&self, spec_id: &str) -> Result<ProgressReport, OapsError> {
        let requirements = self.requirements_of(spec_id)?;

        let total = requirements.len();
        let implemented = requirements
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    RequirementStatus::Implemented | RequirementStatus::Verified
                )
            })
            .count();
        let verified = requirements
            .iter()
            .filter(|r| r.status == RequirementStatus::Verified)
            .count();

        let mut by_type = Vec::new();
        for (req_type, reqs) in group_by_type(&requirements) {
            let type_total = reqs.len();
            let type_implemented = reqs
                .iter()
                .filter(|r| {
                    matches!(
                        r.status,
                        RequirementStatus::Implemented | RequirementStatus::Verified
                    )
                })
                .count();
            let type_verified = reqs
                .iter()
                .filter(|r| r.status == RequirementStatus::Verified)
                .count();
            by_type.push(TypeProgress {
                req_type,
                total: type_total,
                implemented: type_implemented,
                verified: type_verified,
                percentage: percentage(type_implemented, type_total),
            });
        }

        Ok(ProgressReport {
            spec_id: spec_id.to_string(),
            total_requirements: total,
            implemented_requirements: implemented,
            verified_requirements: verified,
            overall_percentage: percentage(implemented, total),
            by_type,
        })
    }

    /// Test coverage for a spec. Only passing tests cover.
    pub fn coverage(&self, spec_id: &str) -> Result<CoverageReport, OapsError> {
        let requirements = self.requirements_of(spec_id)?;
        let tests = self.tests_of(spec_id)?;

        let mut passing_by_req: FxHashMap<&str, Vec<String>> = FxHashMap::default();
        for test in &tests {
            if test.last_result == TestResult::Pass {
                for req_id in &test.tests_requirements {
                    passing_by_req
                        .entry(req_id.as_str())
                        .or_default()
                        .push(test.id.clone());
                }
            }
        }

        let valid_req_ids: FxHashSet<&str> =
            requirements.iter().map(|r| r.id.as_str()).collect();

        let covered = requirements
            .iter()
            .filter(|r| passing_by_req.contains_key(r.id.as_str()))
            .count();

        let requirement_to_tests: BTreeMap<String, Vec<String>> = requirements
            .iter()
            .filter_map(|r| {
                passing_by_req
                    .get(r.id.as_str())
                    .map(|tests| (r.id.clone(), tests.clone()))
            })
            .collect();

        let mut by_method = Vec::new();
        for (method, method_tests) in group_by_method(&tests) {
            let passing = method_tests
                .iter()
                .filter(|t| t.last_result == TestResult::Pass)
                .count();
            let mut covered_reqs: FxHashSet<&str> = FxHashSet::default();
            for test in &method_tests {
                if test.last_result == TestResult::Pass {
                    covered_reqs.extend(
                        test.tests_requirements
                            .iter()
                            .map(String::as_str)
                            .filter(|id| valid_req_ids.contains(id)),
                    );
                }
            }
            by_method.push(MethodCoverage {
                method,
                total_tests: method_tests.len(),
                passing_tests: passing,
                requirements_covered: covered_reqs.len(),
            });
        }

        let mut by_type = Vec::new();
        for (req_type, reqs) in group_by_type(&requirements) {
            let type_covered = reqs
                .iter()
                .filter(|r| passing_by_req.contains_key(r.id.as_str()))
                .count();
            by_type.push(TypeCoverage {
                req_type,
                total_requirements: reqs.len(),
                covered_requirements: type_covered,
                coverage_percentage: percentage(type_covered, reqs.len()),
            });
        }

        Ok(CoverageReport {
            spec_id: spec_id.to_string(),
            total_requirements: requirements.len(),
            covered_requirements: covered,
            overall_coverage: percentage(covered, requirements.len()),
            by_method,
            by_type,
            requirement_to_tests,
        })
    }

    /// Requirements with no passing test.
    pub fn unverified(&self, spec_id: &str) -> Result<Vec<Requirement>, OapsError> {
        let requirements = self.requirements_of(spec_id)?;
        let tests = self.tests_of(spec_id)?;

        let mut covered: FxHashSet<&str> = FxHashSet::default();
        for test in &tests {
            if test.last_result == TestResult::Pass {
                covered.extend(test.tests_requirements.iter().map(String::as_str));
            }
        }

        Ok(requirements
            .into_iter()
            .filter(|r| !covered.contains(r.id.as_str()))
            .collect())
    }

    /// Orphaned tests and artifacts of a spec.
    pub fn orphans(&self, spec_id: &str) -> Result<OrphanReport, OapsError> {
        let requirements = self.requirements_of(spec_id)?;
        let tests = self.tests_of(spec_id)?;

        let valid_req_ids: FxHashSet<&str> =
            requirements.iter().map(|r| r.id.as_str()).collect();

        let orphaned_tests: Vec<TestRecord> = tests
            .iter()
            .filter(|t| {
                !t.tests_requirements
                    .iter()
                    .any(|id| valid_req_ids.contains(id.as_str()))
            })
            .cloned()
            .collect();

        let tests_missing_file: Vec<TestRecord> = tests
            .iter()
            .filter(|t| t.file.is_none() || t.function.is_none())
            .cloned()
            .collect();

        let mut orphaned_artifacts = Vec::new();
        if self.include_artifacts {
            let artifacts = self
                .specs
                .artifact_store(spec_id)?
                .list_artifacts(&ArtifactFilter::default())?;
            for artifact in artifacts {
                let references = &artifact.metadata.references;
                if !references.is_empty()
                    && !references.iter().any(|r| valid_req_ids.contains(r.as_str()))
                {
                    orphaned_artifacts.push(artifact.metadata.id);
                }
            }
        }

        Ok(OrphanReport {
            spec_id: spec_id.to_string(),
            orphaned_tests,
            orphaned_artifacts,
            tests_missing_file,
        })
    }

    /// The dependency graph, optionally restricted to the union of one
    /// spec's ancestors, descendants, and itself.
    pub fn dependency_graph(&self, spec_id: Option<&str>) -> Result<DependencyGraph, OapsError> {
        if let Some(spec_id) = spec_id {
            self.specs.get_spec(spec_id)?;
        }

        let specs = self.specs.list_specs(&crate::stores::spec::SpecFilter {
            include_archived: true,
            ..Default::default()
        })?;

        let (graph, indices) = build_dependency_graph(&specs);

        let included: Vec<String> = match spec_id {
            Some(spec_id) if indices.contains_key(spec_id) => {
                let wanted = reachable_set(&graph, indices[spec_id]);
                specs
                    .iter()
                    .map(|s| s.id.clone())
                    .filter(|id| wanted.contains(&indices[id].index()))
                    .collect()
            }
            _ => specs.iter().map(|s| s.id.clone()).collect(),
        };
        let included_set: FxHashSet<&str> = included.iter().map(String::as_str).collect();

        let cycle_path = find_cycle(&graph);
        let has_cycles = !cycle_path.is_empty();

        let mut roots = Vec::new();
        let mut leaves = Vec::new();
        for id in &included {
            let idx = indices[id];
            if graph.neighbors_directed(idx, Direction::Incoming).count() == 0 {
                roots.push(id.clone());
            }
            if graph.neighbors_directed(idx, Direction::Outgoing).count() == 0 {
                leaves.push(id.clone());
            }
        }

        let topological_order = if has_cycles {
            Vec::new()
        } else {
            petgraph::algo::toposort(&graph, None)
                .map(|order| {
                    order
                        .into_iter()
                        .map(|idx| graph[idx].clone())
                        .filter(|id| included_set.contains(id.as_str()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let depths = compute_depths(&graph, &indices, &roots);

        let spec_data: FxHashMap<&str, (&str, SpecStatus)> = specs
            .iter()
            .map(|s| (s.id.as_str(), (s.title.as_str(), s.status)))
            .collect();

        let nodes = included
            .iter()
            .filter_map(|id| {
                spec_data.get(id.as_str()).map(|(title, status)| DependencyNode {
                    spec_id: id.clone(),
                    title: (*title).to_string(),
                    status: *status,
                    depth: depths.get(id.as_str()).copied().unwrap_or(0),
                })
            })
            .collect();

        let mut edges = Vec::new();
        for spec in &specs {
            if !included_set.contains(spec.id.as_str()) {
                continue;
            }
            for dep in &spec.depends_on {
                if included_set.contains(dep.as_str()) && indices.contains_key(dep) {
                    edges.push((spec.id.clone(), dep.clone()));
                }
            }
        }

        Ok(DependencyGraph {
            nodes,
            edges,
            roots,
            leaves,
            topological_order,
            has_cycles,
            cycle_path,
        })
    }

    /// The labelled relationship graph, optionally restricted around one
    /// spec and to a set of relationship types.
    pub fn relationship_graph(
        &self,
        spec_id: Option<&str>,
        types: Option<&[RelationshipType]>,
    ) -> Result<RelationshipGraph, OapsError> {
        if let Some(spec_id) = spec_id {
            self.specs.get_spec(spec_id)?;
        }

        let specs = self.specs.list_specs(&crate::stores::spec::SpecFilter {
            include_archived: true,
            ..Default::default()
        })?;
        let valid_ids: FxHashSet<&str> = specs.iter().map(|s| s.id.as_str()).collect();

        let include = |t: RelationshipType| types.is_none_or(|ts| ts.contains(&t));

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for summary in &specs {
            nodes.push(SpecNode {
                spec_id: summary.id.clone(),
                title: summary.title.clone(),
                spec_type: summary.spec_type,
                status: summary.status,
            });

            let Ok(spec) = self.specs.get_spec(&summary.id) else {
                continue;
            };
            let rel = &spec.metadata.relationships;

            if include(RelationshipType::DependsOn) {
                for dep in &rel.depends_on {
                    if valid_ids.contains(dep.as_str()) {
                        edges.push(RelationshipEdge {
                            from_spec_id: summary.id.clone(),
                            to_spec_id: dep.clone(),
                            relationship_type: RelationshipType::DependsOn,
                        });
                    }
                }
            }
            if include(RelationshipType::Extends)
                && let Some(extends) = &rel.extends
                && valid_ids.contains(extends.as_str())
            {
                edges.push(RelationshipEdge {
                    from_spec_id: summary.id.clone(),
                    to_spec_id: extends.clone(),
                    relationship_type: RelationshipType::Extends,
                });
            }
            if include(RelationshipType::Supersedes)
                && let Some(supersedes) = &rel.supersedes
                && valid_ids.contains(supersedes.as_str())
            {
                edges.push(RelationshipEdge {
                    from_spec_id: summary.id.clone(),
                    to_spec_id: supersedes.clone(),
                    relationship_type: RelationshipType::Supersedes,
                });
            }
            if include(RelationshipType::Integrates) {
                for target in &rel.integrates {
                    if valid_ids.contains(target.as_str()) {
                        edges.push(RelationshipEdge {
                            from_spec_id: summary.id.clone(),
                            to_spec_id: target.clone(),
                            relationship_type: RelationshipType::Integrates,
                        });
                    }
                }
            }
        }

        if let Some(spec_id) = spec_id {
            let mut graph: DiGraph<String, RelationshipType> = DiGraph::new();
            let mut indices = FxHashMap::default();
            for summary in &specs {
                indices.insert(summary.id.clone(), graph.add_node(summary.id.clone()));
            }
            for edge in &edges {
                if let (Some(&from), Some(&to)) =
                    (indices.get(&edge.from_spec_id), indices.get(&edge.to_spec_id))
                {
                    graph.add_edge(from, to, edge.relationship_type);
                }
            }
            if let Some(&start) = indices.get(spec_id) {
                let wanted = reachable_set(&graph, start);
                nodes.retain(|n| wanted.contains(&indices[&n.spec_id].index()));
                edges.retain(|e| {
                    wanted.contains(&indices[&e.from_spec_id].index())
                        && wanted.contains(&indices[&e.to_spec_id].index())
                });
            }
        }

        let node_index = nodes
            .iter()
            .map(|n| (n.spec_id.clone(), n.clone()))
            .collect();

        Ok(RelationshipGraph {
            nodes,
            edges,
            node_index,
        })
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Group requirements by type, preserving first-seen order.
fn group_by_type(requirements: &[Requirement]) -> Vec<(RequirementType, Vec<&Requirement>)> {
    let mut groups: Vec<(RequirementType, Vec<&Requirement>)> = Vec::new();
    for req in requirements {
        match groups.iter_mut().find(|(t, _)| *t == req.req_type) {
            Some((_, members)) => members.push(req),
            None => groups.push((req.req_type, vec![req])),
        }
    }
    groups
}

/// Group tests by method, preserving first-seen order.
fn group_by_method(tests: &[TestRecord]) -> Vec<(TestMethod, Vec<&TestRecord>)> {
    let mut groups: Vec<(TestMethod, Vec<&TestRecord>)> = Vec::new();
    for test in tests {
        match groups.iter_mut().find(|(m, _)| *m == test.method) {
            Some((_, members)) => members.push(test),
            None => groups.push((test.method, vec![test])),
        }
    }
    groups
}

fn build_dependency_graph(
    specs: &[SpecSummary],
) -> (DiGraph<String, ()>, FxHashMap<String, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut indices = FxHashMap::default();
    for spec in specs {
        indices.insert(spec.id.clone(), graph.add_node(spec.id.clone()));
    }
    for spec in specs {
        for dep in &spec.depends_on {
            if let Some(&to) = indices.get(dep) {
                graph.add_edge(indices[&spec.id], to, ());
            }
        }
    }
    (graph, indices)
}

/// Node indices of ancestors ∪ descendants ∪ {start}.
fn reachable_set<E>(graph: &DiGraph<String, E>, start: NodeIndex) -> FxHashSet<usize> {
    let mut wanted = FxHashSet::default();
    wanted.insert(start.index());

    let mut bfs = Bfs::new(graph, start);
    while let Some(idx) = bfs.next(graph) {
        wanted.insert(idx.index());
    }

    let reversed = petgraph::visit::Reversed(graph);
    let mut bfs = Bfs::new(&reversed, start);
    while let Some(idx) = bfs.next(&reversed) {
        wanted.insert(idx.index());
    }

    wanted
}

/// Find one cycle and return it as a closed walk (first node repeated at
/// the end). Empty when the graph is acyclic.
fn find_cycle(graph: &DiGraph<String, ()>) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut colors = vec![Color::White; graph.node_count()];
    let mut stack: Vec<NodeIndex> = Vec::new();

    fn dfs(
        graph: &DiGraph<String, ()>,
        node: NodeIndex,
        colors: &mut Vec<Color>,
        stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors[node.index()] = Color::Gray;
        stack.push(node);
        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            match colors[next.index()] {
                Color::Gray => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle: Vec<NodeIndex> = stack[start..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = dfs(graph, next, colors, stack) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }
        stack.pop();
        colors[node.index()] = Color::Black;
        None
    }

    for node in graph.node_indices() {
        if colors[node.index()] == Color::White
            && let Some(cycle) = dfs(graph, node, &mut colors, &mut stack)
        {
            return cycle.into_iter().map(|idx| graph[idx].clone()).collect();
        }
    }
    Vec::new()
}

/// BFS depths from the roots, walking against the dependency edges so
/// dependents sit below what they depend on. Ties take the greater depth.
fn compute_depths(
    graph: &DiGraph<String, ()>,
    indices: &FxHashMap<String, NodeIndex>,
    roots: &[String],
) -> FxHashMap<String, usize> {
    let mut depths: FxHashMap<String, usize> = FxHashMap::default();
    for root in roots {
        depths.entry(root.clone()).or_insert(0);
        let mut queue = VecDeque::new();
        queue.push_back(root.clone());
        while let Some(current) = queue.pop_front() {
            let current_depth = depths[&current];
            let Some(&idx) = indices.get(&current) else {
                continue;
            };
            for pred in graph.neighbors_directed(idx, Direction::Incoming) {
                let pred_id = graph[pred].clone();
                let new_depth = current_depth + 1;
                if depths.get(&pred_id).is_none_or(|&d| d < new_depth) {
                    depths.insert(pred_id.clone(), new_depth);
                    queue.push_back(pred_id);
                }
            }
        }
    }
    depths
}
