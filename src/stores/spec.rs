//! Specification store.
//!
//! Each specification owns a subdirectory `SPEC-NNNN-<slug>/` under the
//! specs root, holding `spec.md` (front-matter metadata plus a markdown
//! body), a per-spec `index.json`, `requirements.jsonl`, `tests.jsonl`,
//! and a nested artifact substore. The root `index.json` summarizes all
//! specs and backs listing, slug-uniqueness, and dependency queries.
//!
//! Relationship discipline is enforced on every mutating operation:
//! slugs match `^[a-z0-9]+(-[a-z0-9]+)*$`, enhancement specs must extend
//! something, integration specs must integrate at least two specs, and
//! `depends_on` edges must stay acyclic across the whole store.

use crate::core::error::OapsError;
use crate::core::events::HistoryLog;
use crate::core::frontmatter;
use crate::core::fsio;
use crate::core::repo::CheckpointRepo;
use crate::core::time;
use crate::stores::artifact::ArtifactStore;
use crate::stores::registry::{Severity, ValidationIssue};
use chrono::{DateTime, Utc};
use petgraph::graph::DiGraph;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Kind of specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecType {
    Feature,
    Enhancement,
    Integration,
    Architecture,
    Process,
}

impl SpecType {
    pub fn as_str(self) -> &'static str {
        match self {
            SpecType::Feature => "feature",
            SpecType::Enhancement => "enhancement",
            SpecType::Integration => "integration",
            SpecType::Architecture => "architecture",
            SpecType::Process => "process",
        }
    }
}

/// Lifecycle status of a specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecStatus {
    Draft,
    Review,
    Approved,
    Implemented,
    Deprecated,
}

impl SpecStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SpecStatus::Draft => "draft",
            SpecStatus::Review => "review",
            SpecStatus::Approved => "approved",
            SpecStatus::Implemented => "implemented",
            SpecStatus::Deprecated => "deprecated",
        }
    }
}

/// Relationship block of a spec. `dependents` is computed on read and
/// never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Relationships {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integrates: Vec<String>,
    #[serde(skip)]
    pub dependents: Vec<String>,
}

/// Serializable spec metadata (the front-matter of `spec.md`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecMetadata {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub spec_type: SpecType,
    pub status: SpecStatus,
    #[serde(with = "time::iso")]
    pub created: DateTime<Utc>,
    #[serde(with = "time::iso")]
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub version: String,
    #[serde(default)]
    pub relationships: Relationships,
}

/// A spec with its directory location.
#[derive(Debug, Clone, PartialEq)]
pub struct Spec {
    pub metadata: SpecMetadata,
    pub dir_path: PathBuf,
}

impl Spec {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn slug(&self) -> &str {
        &self.metadata.slug
    }
}

/// Root-index summary of one spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecSummary {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub spec_type: SpecType,
    pub status: SpecStatus,
    #[serde(with = "time::iso")]
    pub created: DateTime<Utc>,
    #[serde(with = "time::iso")]
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub dir_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RootIndex {
    updated: String,
    specs: Vec<SpecSummary>,
}

/// Per-spec `index.json`: summaries of the spec's requirements, tests,
/// and nested artifacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecIndex {
    #[serde(default)]
    pub updated: String,
    #[serde(default)]
    pub requirements: Vec<serde_json::Value>,
    #[serde(default)]
    pub tests: Vec<serde_json::Value>,
    #[serde(default)]
    pub artifacts: Vec<serde_json::Value>,
}

/// Parameters for `create_spec`.
#[derive(Debug, Clone)]
pub struct CreateSpec<'a> {
    pub slug: &'a str,
    pub title: &'a str,
    pub spec_type: SpecType,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub summary: Option<&'a str>,
    pub body: Option<&'a str>,
    pub depends_on: Vec<String>,
    pub extends: Option<String>,
    pub supersedes: Option<String>,
    pub integrates: Vec<String>,
    pub actor: &'a str,
}

impl<'a> CreateSpec<'a> {
    pub fn new(slug: &'a str, title: &'a str, spec_type: SpecType, actor: &'a str) -> Self {
        Self {
            slug,
            title,
            spec_type,
            authors: Vec::new(),
            tags: Vec::new(),
            summary: None,
            body: None,
            depends_on: Vec::new(),
            extends: None,
            supersedes: None,
            integrates: Vec::new(),
            actor,
        }
    }
}

/// Field patch for `update_spec`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateSpec<'a> {
    pub title: Option<&'a str>,
    pub status: Option<SpecStatus>,
    pub summary: Option<&'a str>,
    pub authors: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub depends_on: Option<Vec<String>>,
    pub extends: Option<Option<String>>,
    pub supersedes: Option<Option<String>>,
    pub integrates: Option<Vec<String>>,
    pub version: Option<&'a str>,
}

/// Optional filters for `list_specs`.
#[derive(Debug, Clone, Default)]
pub struct SpecFilter<'a> {
    pub status: Option<SpecStatus>,
    pub spec_type: Option<SpecType>,
    /// Specs must carry every listed tag.
    pub tags: Option<&'a [String]>,
    pub include_archived: bool,
}

fn slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap())
}

/// Validate a slug against the store grammar.
pub fn validate_slug(slug: &str) -> Result<(), OapsError> {
    if slug_re().is_match(slug) {
        Ok(())
    } else {
        Err(OapsError::Validation(format!(
            "Invalid slug format: {slug:?} (expected lowercase-kebab)"
        )))
    }
}

/// Store of specifications rooted at a specs directory.
pub struct SpecStore {
    specs_dir: PathBuf,
    repo: Option<CheckpointRepo>,
    index_cache: Mutex<Option<Vec<SpecSummary>>>,
}

impl SpecStore {
    pub fn new(specs_dir: impl Into<PathBuf>) -> Self {
        Self {
            specs_dir: specs_dir.into(),
            repo: None,
            index_cache: Mutex::new(None),
        }
    }

    /// Attach a checkpoint repository; every mutation is committed.
    pub fn with_repo(specs_dir: impl Into<PathBuf>, repo: CheckpointRepo) -> Self {
        Self {
            specs_dir: specs_dir.into(),
            repo: Some(repo),
            index_cache: Mutex::new(None),
        }
    }

    pub fn specs_dir(&self) -> &Path {
        &self.specs_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.specs_dir.join("index.json")
    }

    fn history(&self) -> HistoryLog {
        HistoryLog::new(self.specs_dir.join("history.jsonl"))
    }

    /// Directory of one spec.
    pub fn spec_dir(&self, spec_id: &str, slug: &str) -> PathBuf {
        self.specs_dir.join(format!("{spec_id}-{slug}"))
    }

    /// The nested artifact substore of a spec.
    pub fn artifact_store(&self, spec_id: &str) -> Result<ArtifactStore, OapsError> {
        let spec = self.get_spec(spec_id)?;
        Ok(ArtifactStore::new(spec.dir_path))
    }

    // --- Index I/O ---

    fn load_index(&self) -> Result<Vec<SpecSummary>, OapsError> {
        let mut cache = self.index_cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entries) = cache.as_ref() {
            return Ok(entries.clone());
        }
        let path = self.index_path();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let index: RootIndex = serde_json::from_str(&raw)
                .map_err(|e| OapsError::Format(format!("malformed spec index: {e}")))?;
            index.specs
        } else {
            Vec::new()
        };
        *cache = Some(entries.clone());
        Ok(entries)
    }

    fn write_index(&self, specs: Vec<SpecSummary>) -> Result<(), OapsError> {
        let index = RootIndex {
            updated: time::now_iso(),
            specs,
        };
        fsio::write_atomic(&self.index_path(), &serde_json::to_string_pretty(&index)?)?;
        let mut cache = self.index_cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache = None;
        Ok(())
    }

    fn summary_of(&self, metadata: &SpecMetadata, dir_path: &Path) -> SpecSummary {
        SpecSummary {
            id: metadata.id.clone(),
            slug: metadata.slug.clone(),
            title: metadata.title.clone(),
            spec_type: metadata.spec_type,
            status: metadata.status,
            created: metadata.created,
            updated: metadata.updated,
            tags: metadata.tags.clone(),
            depends_on: metadata.relationships.depends_on.clone(),
            dir_path: dir_path
                .strip_prefix(&self.specs_dir)
                .unwrap_or(dir_path)
                .to_string_lossy()
                .into_owned(),
        }
    }

    fn next_number(&self) -> Result<u64, OapsError> {
        let specs = self.load_index()?;
        let max = specs
            .iter()
            .filter_map(|s| s.id.rsplit('-').next())
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    // --- Spec file I/O ---

    fn spec_file(dir: &Path) -> PathBuf {
        dir.join("spec.md")
    }

    fn read_spec(&self, dir: &Path) -> Result<SpecMetadata, OapsError> {
        let raw = fs::read_to_string(Self::spec_file(dir))?;
        let (mapping, _) = frontmatter::parse_markdown(&raw)?;
        let mapping = mapping.ok_or_else(|| {
            OapsError::Format(format!("spec file in {} has no front-matter", dir.display()))
        })?;
        serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
            .map_err(|e| OapsError::Format(format!("invalid spec metadata: {e}")))
    }

    fn write_spec(&self, dir: &Path, metadata: &SpecMetadata, body: &str) -> Result<(), OapsError> {
        fs::create_dir_all(dir)?;
        fs::write(
            Self::spec_file(dir),
            frontmatter::serialize_markdown(metadata, body)?,
        )?;
        Ok(())
    }

    fn read_body(&self, dir: &Path) -> Result<String, OapsError> {
        let raw = fs::read_to_string(Self::spec_file(dir))?;
        Ok(frontmatter::parse_markdown(&raw)?.1)
    }

    fn checkpoint(&self, action: &str) -> Result<(), OapsError> {
        if let Some(repo) = &self.repo {
            repo.commit_pending(&format!("spec: {action}"))?;
        }
        Ok(())
    }

    // --- Relationship discipline ---

    fn check_type_rules(
        spec_type: SpecType,
        relationships: &Relationships,
    ) -> Result<(), OapsError> {
        if spec_type == SpecType::Enhancement && relationships.extends.is_none() {
            return Err(OapsError::Validation(
                "ENHANCEMENT specs must set extends".to_string(),
            ));
        }
        if spec_type == SpecType::Integration && relationships.integrates.len() < 2 {
            return Err(OapsError::Validation(
                "INTEGRATION specs must integrate at least 2 specs".to_string(),
            ));
        }
        Ok(())
    }

    fn check_dependencies_exist(&self, depends_on: &[String]) -> Result<(), OapsError> {
        let known: Vec<String> = self.load_index()?.iter().map(|s| s.id.clone()).collect();
        for dep in depends_on {
            if !known.contains(dep) {
                return Err(OapsError::ReferentialIntegrity(format!(
                    "depends_on names unknown spec {dep:?}"
                )));
            }
        }
        Ok(())
    }

    /// Re-validate the whole dependency DAG with one spec's edges replaced.
    fn check_dag(&self, changed_id: &str, new_depends_on: &[String]) -> Result<(), OapsError> {
        let specs = self.load_index()?;
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut indices = FxHashMap::default();

        for spec in &specs {
            let idx = graph.add_node(spec.id.clone());
            indices.insert(spec.id.clone(), idx);
        }
        if !indices.contains_key(changed_id) {
            let idx = graph.add_node(changed_id.to_string());
            indices.insert(changed_id.to_string(), idx);
        }

        let mut saw_changed = false;
        for spec in &specs {
            let deps: &[String] = if spec.id == changed_id {
                saw_changed = true;
                new_depends_on
            } else {
                &spec.depends_on
            };
            for dep in deps {
                if let Some(&to) = indices.get(dep) {
                    graph.add_edge(indices[&spec.id], to, ());
                }
            }
        }
        if !saw_changed {
            // The changed spec is being created and is absent from the index.
            for dep in new_depends_on {
                if let Some(&to) = indices.get(dep) {
                    graph.add_edge(indices[changed_id], to, ());
                }
            }
        }

        if petgraph::algo::is_cyclic_directed(&graph) {
            return Err(OapsError::ReferentialIntegrity(format!(
                "circular dependency introduced by {changed_id}"
            )));
        }
        Ok(())
    }

    // --- CRUD ---

    /// Create a new specification.
    pub fn create_spec(&self, params: CreateSpec<'_>) -> Result<Spec, OapsError> {
        validate_slug(params.slug)?;
        if params.title.trim().is_empty() {
            return Err(OapsError::Validation("title cannot be empty".to_string()));
        }

        let specs = self.load_index()?;
        if specs.iter().any(|s| s.slug == params.slug) {
            return Err(OapsError::Duplicate(format!(
                "spec slug {:?} already exists",
                params.slug
            )));
        }

        let relationships = Relationships {
            depends_on: params.depends_on.clone(),
            extends: params.extends.clone(),
            supersedes: params.supersedes.clone(),
            integrates: params.integrates.clone(),
            dependents: Vec::new(),
        };
        Self::check_type_rules(params.spec_type, &relationships)?;
        self.check_dependencies_exist(&relationships.depends_on)?;

        let number = self.next_number()?;
        let spec_id = format!("SPEC-{number:04}");
        self.check_dag(&spec_id, &relationships.depends_on)?;

        let now = time::now_utc();
        let metadata = SpecMetadata {
            id: spec_id.clone(),
            slug: params.slug.to_string(),
            title: params.title.to_string(),
            spec_type: params.spec_type,
            status: SpecStatus::Draft,
            created: now,
            updated: now,
            authors: params.authors.clone(),
            tags: params.tags.clone(),
            summary: params.summary.map(str::to_string),
            version: "0.1.0".to_string(),
            relationships,
        };

        let dir = self.spec_dir(&spec_id, params.slug);
        self.write_spec(&dir, &metadata, params.body.unwrap_or(""))?;
        self.write_spec_index(&dir, SpecIndex::default())?;

        let mut specs = self.load_index()?;
        specs.push(self.summary_of(&metadata, &dir));
        self.write_index(specs)?;

        self.history()
            .record("created", params.actor, &spec_id, None, None)?;
        self.checkpoint(&format!("create {spec_id}"))?;

        Ok(Spec {
            metadata,
            dir_path: dir,
        })
    }

    /// Get a spec, with `relationships.dependents` computed from the root
    /// index.
    pub fn get_spec(&self, spec_id: &str) -> Result<Spec, OapsError> {
        let specs = self.load_index()?;
        let summary = specs
            .iter()
            .find(|s| s.id == spec_id)
            .ok_or_else(|| OapsError::not_found("spec", spec_id))?;
        let dir = self.specs_dir.join(&summary.dir_path);
        let mut metadata = self.read_spec(&dir)?;
        metadata.relationships.dependents = specs
            .iter()
            .filter(|s| s.depends_on.iter().any(|d| d == spec_id))
            .map(|s| s.id.clone())
            .collect();
        Ok(Spec {
            metadata,
            dir_path: dir,
        })
    }

    pub fn spec_exists(&self, spec_id: &str) -> Result<bool, OapsError> {
        Ok(self.load_index()?.iter().any(|s| s.id == spec_id))
    }

    /// List specs. Deprecated specs are excluded unless
    /// `include_archived` is set.
    pub fn list_specs(&self, filter: &SpecFilter<'_>) -> Result<Vec<SpecSummary>, OapsError> {
        let specs = self.load_index()?;
        let mut results = Vec::new();
        for spec in specs {
            if let Some(status) = filter.status
                && spec.status != status
            {
                continue;
            }
            if let Some(spec_type) = filter.spec_type
                && spec.spec_type != spec_type
            {
                continue;
            }
            if let Some(tags) = filter.tags
                && !tags.iter().all(|t| spec.tags.contains(t))
            {
                continue;
            }
            if !filter.include_archived && spec.status == SpecStatus::Deprecated {
                continue;
            }
            results.push(spec);
        }
        Ok(results)
    }

    /// Update a spec. Any relationship change re-validates the full DAG.
    pub fn update_spec(
        &self,
        spec_id: &str,
        patch: UpdateSpec<'_>,
        actor: &str,
    ) -> Result<Spec, OapsError> {
        let spec = self.get_spec(spec_id)?;
        let mut metadata = spec.metadata.clone();
        let body = self.read_body(&spec.dir_path)?;

        if let Some(title) = patch.title {
            if title.trim().is_empty() {
                return Err(OapsError::Validation("title cannot be empty".to_string()));
            }
            metadata.title = title.to_string();
        }
        if let Some(status) = patch.status {
            metadata.status = status;
        }
        if let Some(summary) = patch.summary {
            metadata.summary = Some(summary.to_string());
        }
        if let Some(authors) = patch.authors {
            metadata.authors = authors;
        }
        if let Some(tags) = patch.tags {
            metadata.tags = tags;
        }
        if let Some(version) = patch.version {
            metadata.version = version.to_string();
        }

        let relationships_changed = patch.depends_on.is_some()
            || patch.extends.is_some()
            || patch.supersedes.is_some()
            || patch.integrates.is_some();
        if let Some(depends_on) = patch.depends_on {
            metadata.relationships.depends_on = depends_on;
        }
        if let Some(extends) = patch.extends {
            metadata.relationships.extends = extends;
        }
        if let Some(supersedes) = patch.supersedes {
            metadata.relationships.supersedes = supersedes;
        }
        if let Some(integrates) = patch.integrates {
            metadata.relationships.integrates = integrates;
        }

        if relationships_changed {
            Self::check_type_rules(metadata.spec_type, &metadata.relationships)?;
            self.check_dependencies_exist(&metadata.relationships.depends_on)?;
            self.check_dag(spec_id, &metadata.relationships.depends_on)?;
        }

        metadata.updated = time::now_utc();
        metadata.relationships.dependents = Vec::new();
        self.write_spec(&spec.dir_path, &metadata, &body)?;

        let specs = self
            .load_index()?
            .into_iter()
            .map(|s| {
                if s.id == spec_id {
                    self.summary_of(&metadata, &spec.dir_path)
                } else {
                    s
                }
            })
            .collect();
        self.write_index(specs)?;

        self.history().record("updated", actor, spec_id, None, None)?;
        self.checkpoint(&format!("update {spec_id}"))?;

        self.get_spec(spec_id)
    }

    /// Rename a spec's slug and move its directory. Renaming to the same
    /// slug is a no-op; renaming to an existing slug fails.
    pub fn rename_spec(&self, spec_id: &str, new_slug: &str, actor: &str) -> Result<Spec, OapsError> {
        let spec = self.get_spec(spec_id)?;
        if spec.metadata.slug == new_slug {
            return Ok(spec);
        }
        validate_slug(new_slug)?;
        if self.load_index()?.iter().any(|s| s.slug == new_slug) {
            return Err(OapsError::Duplicate(format!(
                "spec slug {new_slug:?} already exists"
            )));
        }

        let old_slug = spec.metadata.slug.clone();
        let body = self.read_body(&spec.dir_path)?;
        let new_dir = self.spec_dir(spec_id, new_slug);
        fs::rename(&spec.dir_path, &new_dir)?;

        let mut metadata = spec.metadata.clone();
        metadata.slug = new_slug.to_string();
        metadata.updated = time::now_utc();
        metadata.relationships.dependents = Vec::new();
        self.write_spec(&new_dir, &metadata, &body)?;

        let specs = self
            .load_index()?
            .into_iter()
            .map(|s| {
                if s.id == spec_id {
                    self.summary_of(&metadata, &new_dir)
                } else {
                    s
                }
            })
            .collect();
        self.write_index(specs)?;

        self.history()
            .record("renamed", actor, spec_id, Some(&old_slug), Some(new_slug))?;
        self.checkpoint(&format!("rename {spec_id} to {new_slug}"))?;

        self.get_spec(spec_id)
    }

    /// Delete a spec and its directory. Blocked while other specs list it
    /// in `depends_on`, unless `force` is set.
    pub fn delete_spec(&self, spec_id: &str, force: bool, actor: &str) -> Result<(), OapsError> {
        let spec = self.get_spec(spec_id)?;

        if !force {
            let dependents = &spec.metadata.relationships.dependents;
            if !dependents.is_empty() {
                return Err(OapsError::ReferentialIntegrity(format!(
                    "cannot delete {spec_id}: depended on by {}",
                    dependents.join(", ")
                )));
            }
        }

        fs::remove_dir_all(&spec.dir_path)?;

        let specs = self
            .load_index()?
            .into_iter()
            .filter(|s| s.id != spec_id)
            .collect();
        self.write_index(specs)?;

        self.history().record("deleted", actor, spec_id, None, None)?;
        self.checkpoint(&format!("delete {spec_id}"))?;
        Ok(())
    }

    /// Archive a spec: status becomes `deprecated`.
    pub fn archive_spec(&self, spec_id: &str, actor: &str) -> Result<Spec, OapsError> {
        self.update_spec(
            spec_id,
            UpdateSpec {
                status: Some(SpecStatus::Deprecated),
                ..UpdateSpec::default()
            },
            actor,
        )
    }

    // --- Validation ---

    /// Validate one spec. Warnings cover a missing summary and empty
    /// authors; `strict` escalates warnings to errors.
    pub fn validate_spec(
        &self,
        spec_id: &str,
        strict: bool,
    ) -> Result<Vec<ValidationIssue>, OapsError> {
        let spec = self.get_spec(spec_id)?;
        let mut issues = Vec::new();

        if let Err(e) = validate_slug(&spec.metadata.slug) {
            issues.push(ValidationIssue::error(e.to_string()).for_record(spec_id));
        }
        if let Err(e) = Self::check_type_rules(spec.metadata.spec_type, &spec.metadata.relationships)
        {
            issues.push(ValidationIssue::error(e.to_string()).for_record(spec_id));
        }
        if spec.metadata.summary.is_none() {
            issues.push(
                ValidationIssue::warning("spec has no summary")
                    .for_record(spec_id)
                    .for_field("summary"),
            );
        }
        if spec.metadata.authors.is_empty() {
            issues.push(
                ValidationIssue::warning("spec has no authors")
                    .for_record(spec_id)
                    .for_field("authors"),
            );
        }

        if strict {
            for issue in &mut issues {
                issue.severity = Severity::Error;
            }
        }
        Ok(issues)
    }

    // --- Index maintenance ---

    /// Rebuild the root index by scanning spec directories.
    pub fn rebuild_index(&self) -> Result<(), OapsError> {
        if !self.specs_dir.exists() {
            return self.write_index(Vec::new());
        }

        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.specs_dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with("SPEC-"))
                    .unwrap_or(false)
            })
            .collect();
        dirs.sort();

        let mut specs: Vec<SpecSummary> = Vec::new();
        for dir in dirs {
            match self.read_spec(&dir) {
                Ok(metadata) => {
                    if specs.iter().any(|s| s.id == metadata.id) {
                        return Err(OapsError::Duplicate(format!(
                            "spec id {} appears in more than one directory",
                            metadata.id
                        )));
                    }
                    specs.push(self.summary_of(&metadata, &dir));
                }
                Err(_) => continue,
            }
        }
        self.write_index(specs)
    }

    /// Read a spec's per-spec `index.json`.
    pub fn read_spec_index(&self, dir: &Path) -> Result<SpecIndex, OapsError> {
        let path = dir.join("index.json");
        if !path.exists() {
            return Ok(SpecIndex::default());
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map_err(|e| OapsError::Format(format!("malformed spec index: {e}")))
    }

    /// Overwrite a spec's per-spec `index.json`.
    pub fn write_spec_index(&self, dir: &Path, mut index: SpecIndex) -> Result<(), OapsError> {
        index.updated = time::now_iso();
        fsio::write_atomic(
            &dir.join("index.json"),
            &serde_json::to_string_pretty(&index)?,
        )
    }
}
