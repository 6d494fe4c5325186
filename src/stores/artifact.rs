//! Artifact store: CRUD and lifecycle for a flat folder of artifacts.
//!
//! Artifacts live under `<base>/artifacts/` as either markdown files with
//! YAML front-matter (text types) or content files with a
//! `*.metadata.yaml` sidecar (binary types). A JSON index at
//! `<base>/artifacts.json` summarizes the folder and is maintained on
//! every mutation; `rebuild_index` reconstructs it from the filesystem.
//!
//! Identifiers are `PP-NNNN`: a registered two-letter prefix plus a
//! zero-padded number assigned monotonically per prefix. Gaps left by
//! deletions are never reused and surface as warnings in strict
//! validation.

use crate::core::error::OapsError;
use crate::core::frontmatter;
use crate::core::fsio;
use crate::core::time;
use crate::stores::registry::{
    ArtifactRegistry, Severity, TypeCategory, TypeDefinition, ValidationIssue,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Lifecycle status of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Draft,
    Review,
    Complete,
    Superseded,
    Retracted,
}

impl ArtifactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactStatus::Draft => "draft",
            ArtifactStatus::Review => "review",
            ArtifactStatus::Complete => "complete",
            ArtifactStatus::Superseded => "superseded",
            ArtifactStatus::Retracted => "retracted",
        }
    }

    pub fn parse(value: &str) -> Result<Self, OapsError> {
        match value {
            "draft" => Ok(ArtifactStatus::Draft),
            "review" => Ok(ArtifactStatus::Review),
            "complete" => Ok(ArtifactStatus::Complete),
            "superseded" => Ok(ArtifactStatus::Superseded),
            "retracted" => Ok(ArtifactStatus::Retracted),
            other => Err(OapsError::Validation(format!(
                "invalid artifact status {other:?}"
            ))),
        }
    }
}

/// Serializable metadata of an artifact: the front-matter of a text
/// artifact, or the full sidecar of a binary one. Unknown keys round-trip
/// through `type_fields`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactMetadata {
    pub id: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub title: String,
    pub status: ArtifactStatus,
    #[serde(with = "time::iso")]
    pub created: DateTime<Utc>,
    #[serde(
        default,
        with = "time::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated: Option<DateTime<Utc>>,
    pub author: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reviewers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(flatten)]
    pub type_fields: BTreeMap<String, Value>,
}

impl ArtifactMetadata {
    /// Two-letter type prefix extracted from the id.
    pub fn prefix(&self) -> &str {
        self.id.split('-').next().unwrap_or(&self.id)
    }
}

/// An artifact together with its authoritative on-disk location.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub metadata: ArtifactMetadata,
    /// Absolute path of the content file.
    pub file_path: PathBuf,
    /// Absolute path of the sidecar, for binary artifacts only.
    pub metadata_file_path: Option<PathBuf>,
}

impl Artifact {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn prefix(&self) -> &str {
        self.metadata.prefix()
    }

    pub fn is_binary(&self) -> bool {
        self.metadata_file_path.is_some()
    }
}

/// Artifact content as read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactContent {
    Text(String),
    Bytes(Vec<u8>),
}

/// Content supplied when creating or updating an artifact.
#[derive(Debug, Clone, Copy)]
pub enum NewContent<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
}

/// Parameters for `add_artifact`.
#[derive(Debug, Clone)]
pub struct AddArtifact<'a> {
    pub type_prefix: &'a str,
    pub title: &'a str,
    pub author: &'a str,
    pub content: Option<NewContent<'a>>,
    pub subtype: Option<&'a str>,
    /// Custom slug; generated from the title when absent.
    pub slug: Option<&'a str>,
    pub references: Vec<String>,
    pub tags: Vec<String>,
    pub summary: Option<&'a str>,
    pub type_fields: BTreeMap<String, Value>,
    /// Existing file to import, as an alternative to inline content.
    pub source_path: Option<&'a Path>,
}

impl<'a> AddArtifact<'a> {
    pub fn new(type_prefix: &'a str, title: &'a str, author: &'a str) -> Self {
        Self {
            type_prefix,
            title,
            author,
            content: None,
            subtype: None,
            slug: None,
            references: Vec::new(),
            tags: Vec::new(),
            summary: None,
            type_fields: BTreeMap::new(),
            source_path: None,
        }
    }
}

/// Field patch for `update_artifact`. `None` leaves a field untouched;
/// `type_fields` merges per key instead of replacing the bag.
#[derive(Debug, Clone, Default)]
pub struct UpdateArtifact<'a> {
    pub title: Option<&'a str>,
    pub content: Option<NewContent<'a>>,
    pub subtype: Option<&'a str>,
    pub status: Option<ArtifactStatus>,
    pub references: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub summary: Option<&'a str>,
    pub type_fields: BTreeMap<String, Value>,
}

/// Optional filters for `list_artifacts`.
#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter<'a> {
    /// Type prefix or registry name.
    pub type_filter: Option<&'a str>,
    pub status_filter: Option<ArtifactStatus>,
    pub tag_filter: Option<&'a str>,
}

/// One entry in `artifacts.json`. Paths are store-relative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_file_path: Option<String>,
    #[serde(flatten)]
    pub metadata: ArtifactMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    updated: String,
    artifacts: Vec<IndexEntry>,
}

/// Format an artifact id from prefix and number. The width grows past
/// four digits instead of wrapping.
pub fn format_artifact_id(prefix: &str, number: u64) -> String {
    format!("{prefix}-{number:04}")
}

/// Slugify a title: lowercase, ASCII alphanumerics kept, whitespace and
/// punctuation collapsed to single dashes.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Build the canonical `YYYYMMDDHHMMSS-PP-NNNN-slug.ext` filename.
pub fn generate_filename(
    prefix: &str,
    number: u64,
    slug: &str,
    extension: &str,
    ts: &DateTime<Utc>,
) -> String {
    format!(
        "{}-{}-{slug}.{extension}",
        time::filename_stamp(ts),
        format_artifact_id(prefix, number)
    )
}

/// Store for managing artifacts in a directory.
pub struct ArtifactStore {
    base_path: PathBuf,
    registry: ArtifactRegistry,
    auto_index: bool,
    index_cache: Mutex<Option<Vec<IndexEntry>>>,
}

impl ArtifactStore {
    /// Open a store rooted at `base_path`, using the shared type registry.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self::with_registry(base_path, ArtifactRegistry::shared().clone())
    }

    /// Open a store with an explicit registry (used by tests and callers
    /// that register custom types).
    pub fn with_registry(base_path: impl Into<PathBuf>, registry: ArtifactRegistry) -> Self {
        Self {
            base_path: base_path.into(),
            registry,
            auto_index: true,
            index_cache: Mutex::new(None),
        }
    }

    /// Disable (or re-enable) index maintenance on mutation. With the
    /// index off, callers batch mutations and run `rebuild_index` once.
    pub fn auto_index(mut self, enabled: bool) -> Self {
        self.auto_index = enabled;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path to the `artifacts/` subdirectory.
    pub fn artifacts_path(&self) -> PathBuf {
        self.base_path.join("artifacts")
    }

    /// Path to the `artifacts.json` index.
    pub fn index_path(&self) -> PathBuf {
        self.base_path.join("artifacts.json")
    }

    /// Create the directory structure and an empty index if needed.
    pub fn initialize(&self) -> Result<(), OapsError> {
        fs::create_dir_all(self.artifacts_path())?;
        if !self.index_path().exists() {
            self.write_index(Vec::new())?;
        }
        Ok(())
    }

    // --- Index I/O ---

    fn load_index(&self) -> Result<Vec<IndexEntry>, OapsError> {
        let mut cache = self.index_cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entries) = cache.as_ref() {
            return Ok(entries.clone());
        }
        let path = self.index_path();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let index: IndexFile = serde_json::from_str(&raw)
                .map_err(|e| OapsError::Format(format!("malformed artifact index: {e}")))?;
            index.artifacts
        } else {
            Vec::new()
        };
        *cache = Some(entries.clone());
        Ok(entries)
    }

    fn write_index(&self, entries: Vec<IndexEntry>) -> Result<(), OapsError> {
        let index = IndexFile {
            updated: time::now_iso(),
            artifacts: entries,
        };
        fsio::write_atomic(&self.index_path(), &serde_json::to_string_pretty(&index)?)?;
        let mut cache = self.index_cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache = None;
        Ok(())
    }

    fn entry_to_artifact(&self, entry: &IndexEntry) -> Artifact {
        Artifact {
            metadata: entry.metadata.clone(),
            file_path: self.base_path.join(&entry.file_path),
            metadata_file_path: entry
                .metadata_file_path
                .as_ref()
                .map(|p| self.base_path.join(p)),
        }
    }

    fn artifact_to_entry(&self, artifact: &Artifact) -> IndexEntry {
        IndexEntry {
            file_path: relative_to(&artifact.file_path, &self.base_path),
            metadata_file_path: artifact
                .metadata_file_path
                .as_ref()
                .map(|p| relative_to(p, &self.base_path)),
            metadata: artifact.metadata.clone(),
        }
    }

    /// Next number for a prefix: strictly greater than the maximum live
    /// number, regardless of gaps.
    fn next_number(&self, prefix: &str) -> Result<u64, OapsError> {
        let entries = self.load_index()?;
        let max = entries
            .iter()
            .filter(|e| e.metadata.prefix() == prefix)
            .filter_map(|e| e.metadata.id.rsplit('-').next())
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    // --- Query operations ---

    /// List artifacts with optional type/status/tag filters.
    pub fn list_artifacts(&self, filter: &ArtifactFilter<'_>) -> Result<Vec<Artifact>, OapsError> {
        let entries = self.load_index()?;
        let mut results = Vec::new();
        for entry in &entries {
            if let Some(type_filter) = filter.type_filter
                && entry.metadata.prefix() != type_filter
                && entry.metadata.artifact_type != type_filter
            {
                continue;
            }
            if let Some(status) = filter.status_filter
                && entry.metadata.status != status
            {
                continue;
            }
            if let Some(tag) = filter.tag_filter
                && !entry.metadata.tags.iter().any(|t| t == tag)
            {
                continue;
            }
            results.push(self.entry_to_artifact(entry));
        }
        Ok(results)
    }

    /// Get an artifact by id.
    pub fn get_artifact(&self, artifact_id: &str) -> Result<Artifact, OapsError> {
        let entries = self.load_index()?;
        entries
            .iter()
            .find(|e| e.metadata.id == artifact_id)
            .map(|e| self.entry_to_artifact(e))
            .ok_or_else(|| OapsError::not_found("artifact", artifact_id))
    }

    pub fn artifact_exists(&self, artifact_id: &str) -> Result<bool, OapsError> {
        let entries = self.load_index()?;
        Ok(entries.iter().any(|e| e.metadata.id == artifact_id))
    }

    /// Read the content file: UTF-8 text for text artifacts, raw bytes for
    /// binary ones.
    pub fn get_artifact_content(&self, artifact_id: &str) -> Result<ArtifactContent, OapsError> {
        let artifact = self.get_artifact(artifact_id)?;
        if artifact.is_binary() {
            Ok(ArtifactContent::Bytes(fs::read(&artifact.file_path)?))
        } else {
            Ok(ArtifactContent::Text(fs::read_to_string(
                &artifact.file_path,
            )?))
        }
    }

    // --- CRUD operations ---

    /// Add a new artifact.
    pub fn add_artifact(&self, params: AddArtifact<'_>) -> Result<Artifact, OapsError> {
        let type_def = self
            .registry
            .get_by_prefix(params.type_prefix)
            .cloned()
            .ok_or_else(|| OapsError::TypeNotRegistered(params.type_prefix.to_string()))?;

        if params.content.is_some() && params.source_path.is_some() {
            return Err(OapsError::Validation(
                "supply either inline content or a source path, not both".to_string(),
            ));
        }
        if params.title.trim().is_empty() {
            return Err(OapsError::Validation("title cannot be empty".to_string()));
        }

        let number = self.next_number(params.type_prefix)?;
        let artifact_id = format_artifact_id(params.type_prefix, number);
        let slug = match params.slug {
            Some(slug) => slug.to_string(),
            None => generate_slug(params.title),
        };

        let extension = match type_def.category {
            TypeCategory::Binary => match params.source_path {
                Some(path) => path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "bin".to_string()),
                None => type_def
                    .formats
                    .first()
                    .map(|f| (*f).to_string())
                    .unwrap_or_else(|| "bin".to_string()),
            },
            TypeCategory::Text => "md".to_string(),
        };

        let now = time::now_utc();
        let filename = generate_filename(params.type_prefix, number, &slug, &extension, &now);
        let artifact_path = self.artifacts_path().join(&filename);

        let metadata = ArtifactMetadata {
            id: artifact_id.clone(),
            artifact_type: type_def.name.to_string(),
            subtype: params.subtype.map(str::to_string),
            title: params.title.to_string(),
            status: ArtifactStatus::Draft,
            created: now,
            updated: None,
            author: params.author.to_string(),
            reviewers: Vec::new(),
            references: params.references.clone(),
            supersedes: None,
            superseded_by: None,
            tags: params.tags.clone(),
            summary: params.summary.map(str::to_string),
            type_fields: params.type_fields.clone(),
        };

        self.check_metadata(&type_def, &metadata)?;

        fs::create_dir_all(self.artifacts_path())?;

        let metadata_path = match type_def.category {
            TypeCategory::Binary => {
                match (params.source_path, params.content) {
                    (Some(source), _) => {
                        fs::copy(source, &artifact_path)?;
                    }
                    (None, Some(NewContent::Bytes(bytes))) => {
                        fs::write(&artifact_path, bytes)?;
                    }
                    (None, Some(NewContent::Text(text))) => {
                        fs::write(&artifact_path, text.as_bytes())?;
                    }
                    (None, None) => {
                        fs::write(&artifact_path, b"")?;
                    }
                }
                let sidecar = sidecar_path(&artifact_path);
                fs::write(&sidecar, frontmatter::serialize_sidecar(&metadata)?)?;
                Some(sidecar)
            }
            TypeCategory::Text => {
                let body = match params.content {
                    Some(NewContent::Text(text)) => text,
                    Some(NewContent::Bytes(_)) => {
                        return Err(OapsError::Validation(
                            "text artifacts take string content".to_string(),
                        ));
                    }
                    None => "",
                };
                fs::write(
                    &artifact_path,
                    frontmatter::serialize_markdown(&metadata, body)?,
                )?;
                None
            }
        };

        let artifact = Artifact {
            metadata,
            file_path: artifact_path,
            metadata_file_path: metadata_path,
        };

        if self.auto_index {
            let mut entries = self.load_index()?;
            entries.push(self.artifact_to_entry(&artifact));
            self.write_index(entries)?;
        }

        Ok(artifact)
    }

    /// Update an existing artifact. Reads current metadata from the file,
    /// merges the patch, re-validates, and rewrites metadata while
    /// preserving the body verbatim.
    pub fn update_artifact(
        &self,
        artifact_id: &str,
        patch: UpdateArtifact<'_>,
    ) -> Result<Artifact, OapsError> {
        let artifact = self.get_artifact(artifact_id)?;
        let current = self.read_metadata(&artifact)?;

        let mut type_fields = current.type_fields.clone();
        for (key, value) in &patch.type_fields {
            type_fields.insert(key.clone(), value.clone());
        }

        let updated = ArtifactMetadata {
            id: current.id.clone(),
            artifact_type: current.artifact_type.clone(),
            subtype: patch
                .subtype
                .map(str::to_string)
                .or_else(|| current.subtype.clone()),
            title: patch
                .title
                .map(str::to_string)
                .unwrap_or_else(|| current.title.clone()),
            status: patch.status.unwrap_or(current.status),
            created: current.created,
            updated: Some(time::now_utc()),
            author: current.author.clone(),
            reviewers: current.reviewers.clone(),
            references: patch.references.unwrap_or_else(|| current.references.clone()),
            supersedes: current.supersedes.clone(),
            superseded_by: current.superseded_by.clone(),
            tags: patch.tags.unwrap_or_else(|| current.tags.clone()),
            summary: patch
                .summary
                .map(str::to_string)
                .or_else(|| current.summary.clone()),
            type_fields,
        };

        let type_def = self
            .registry
            .get_by_name(&updated.artifact_type)
            .cloned()
            .ok_or_else(|| OapsError::TypeNotRegistered(updated.artifact_type.clone()))?;
        self.check_metadata(&type_def, &updated)?;

        if artifact.is_binary() {
            if let Some(sidecar) = &artifact.metadata_file_path {
                fs::write(sidecar, frontmatter::serialize_sidecar(&updated)?)?;
            }
            match patch.content {
                Some(NewContent::Bytes(bytes)) => fs::write(&artifact.file_path, bytes)?,
                Some(NewContent::Text(text)) => fs::write(&artifact.file_path, text.as_bytes())?,
                None => {}
            }
        } else {
            let body = match patch.content {
                Some(NewContent::Text(text)) => text.to_string(),
                Some(NewContent::Bytes(_)) => {
                    return Err(OapsError::Validation(
                        "text artifacts take string content".to_string(),
                    ));
                }
                None => {
                    let raw = fs::read_to_string(&artifact.file_path)?;
                    frontmatter::parse_markdown(&raw)?.1
                }
            };
            fs::write(
                &artifact.file_path,
                frontmatter::serialize_markdown(&updated, &body)?,
            )?;
        }

        let updated_artifact = Artifact {
            metadata: updated,
            file_path: artifact.file_path.clone(),
            metadata_file_path: artifact.metadata_file_path.clone(),
        };

        if self.auto_index {
            let mut entries = self.load_index()?;
            for entry in &mut entries {
                if entry.metadata.id == artifact_id {
                    *entry = self.artifact_to_entry(&updated_artifact);
                }
            }
            self.write_index(entries)?;
        }

        Ok(updated_artifact)
    }

    /// Delete an artifact. Fails when other artifacts reference it unless
    /// `force` is set.
    pub fn delete_artifact(&self, artifact_id: &str, force: bool) -> Result<(), OapsError> {
        let artifact = self.get_artifact(artifact_id)?;

        if !force {
            let entries = self.load_index()?;
            let referrers: Vec<String> = entries
                .iter()
                .filter(|e| {
                    e.metadata.id != artifact_id
                        && e.metadata.references.iter().any(|r| r == artifact_id)
                })
                .map(|e| e.metadata.id.clone())
                .collect();
            if !referrers.is_empty() {
                return Err(OapsError::ReferentialIntegrity(format!(
                    "cannot delete artifact {:?}: referenced by {}",
                    artifact_id,
                    referrers.join(", ")
                )));
            }
        }

        if artifact.file_path.exists() {
            fs::remove_file(&artifact.file_path)?;
        }
        if let Some(sidecar) = &artifact.metadata_file_path
            && sidecar.exists()
        {
            fs::remove_file(sidecar)?;
        }

        if self.auto_index {
            let entries = self
                .load_index()?
                .into_iter()
                .filter(|e| e.metadata.id != artifact_id)
                .collect();
            self.write_index(entries)?;
        }

        Ok(())
    }

    // --- Lifecycle operations ---

    /// Mark `new_artifact_id` as superseding `old_artifact_id`.
    ///
    /// Both records are rewritten (old gets `status=superseded` and
    /// `superseded_by`; new gets `supersedes`), then the index is rebuilt
    /// so both entries reflect the new state.
    pub fn supersede_artifact(
        &self,
        old_artifact_id: &str,
        new_artifact_id: &str,
    ) -> Result<(Artifact, Artifact), OapsError> {
        if old_artifact_id == new_artifact_id {
            return Err(OapsError::Supersession(format!(
                "artifact {old_artifact_id:?} cannot supersede itself"
            )));
        }

        let old = self.get_artifact(old_artifact_id)?;
        let new = self.get_artifact(new_artifact_id)?;

        if old.metadata.artifact_type != new.metadata.artifact_type {
            return Err(OapsError::Supersession(format!(
                "types don't match ({} vs {})",
                old.metadata.artifact_type, new.metadata.artifact_type
            )));
        }
        if new.metadata.supersedes.as_deref() == Some(old_artifact_id) {
            return Err(OapsError::Supersession(format!(
                "circular supersession between {old_artifact_id} and {new_artifact_id}"
            )));
        }
        if let Some(existing) = &old.metadata.superseded_by {
            return Err(OapsError::Supersession(format!(
                "artifact {old_artifact_id} is already superseded by {existing}"
            )));
        }

        let now = time::now_utc();

        let mut old_meta = self.read_metadata(&old)?;
        old_meta.status = ArtifactStatus::Superseded;
        old_meta.superseded_by = Some(new_artifact_id.to_string());
        old_meta.updated = Some(now);
        self.write_metadata(&old, &old_meta)?;

        let mut new_meta = self.read_metadata(&new)?;
        new_meta.supersedes = Some(old_artifact_id.to_string());
        new_meta.updated = Some(now);
        self.write_metadata(&new, &new_meta)?;

        if self.auto_index {
            self.rebuild_index()?;
        }

        Ok((
            self.get_artifact(old_artifact_id)?,
            self.get_artifact(new_artifact_id)?,
        ))
    }

    /// Retract an artifact. The record stays in the store with
    /// `status=retracted`; the reason lands in the type-field bag.
    pub fn retract_artifact(
        &self,
        artifact_id: &str,
        reason: Option<&str>,
    ) -> Result<Artifact, OapsError> {
        let mut type_fields = BTreeMap::new();
        if let Some(reason) = reason {
            type_fields.insert("retraction_reason".to_string(), Value::from(reason));
        }
        self.update_artifact(
            artifact_id,
            UpdateArtifact {
                status: Some(ArtifactStatus::Retracted),
                type_fields,
                ..UpdateArtifact::default()
            },
        )
    }

    // --- Metadata I/O ---

    fn read_metadata(&self, artifact: &Artifact) -> Result<ArtifactMetadata, OapsError> {
        if let Some(sidecar) = &artifact.metadata_file_path {
            let raw = fs::read_to_string(sidecar)?;
            let mapping = frontmatter::parse_sidecar_str(&raw)?;
            return mapping_to_metadata(mapping);
        }
        let raw = fs::read_to_string(&artifact.file_path)?;
        let (mapping, _) = frontmatter::parse_markdown(&raw)?;
        let mapping = mapping.ok_or_else(|| {
            OapsError::Format(format!(
                "artifact file {} has no front-matter",
                artifact.file_path.display()
            ))
        })?;
        mapping_to_metadata(mapping)
    }

    fn write_metadata(
        &self,
        artifact: &Artifact,
        metadata: &ArtifactMetadata,
    ) -> Result<(), OapsError> {
        if let Some(sidecar) = &artifact.metadata_file_path {
            fs::write(sidecar, frontmatter::serialize_sidecar(metadata)?)?;
        } else {
            let raw = fs::read_to_string(&artifact.file_path)?;
            let (_, body) = frontmatter::parse_markdown(&raw)?;
            fs::write(
                &artifact.file_path,
                frontmatter::serialize_markdown(metadata, &body)?,
            )?;
        }
        Ok(())
    }

    // --- Index maintenance ---

    /// Rebuild `artifacts.json` from the filesystem.
    ///
    /// Walks `artifacts/` in name order, skipping dotfiles and sidecars.
    /// `.md` files are parsed as text artifacts; other extensions pair
    /// with their sidecar when present. Files that fail to parse are
    /// skipped silently.
    pub fn rebuild_index(&self) -> Result<(), OapsError> {
        let dir = self.artifacts_path();
        if !dir.exists() {
            return self.write_index(Vec::new());
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .collect();
        paths.sort();

        let mut entries: Vec<IndexEntry> = Vec::new();
        for path in paths {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if name.starts_with('.') || name.ends_with(".metadata.yaml") {
                continue;
            }
            if let Some(artifact) = self.load_artifact_from_file(&path) {
                if entries.iter().any(|e| e.metadata.id == artifact.metadata.id) {
                    return Err(OapsError::Duplicate(format!(
                        "artifact id {} appears in more than one file",
                        artifact.metadata.id
                    )));
                }
                entries.push(self.artifact_to_entry(&artifact));
            }
        }

        self.write_index(entries)
    }

    fn load_artifact_from_file(&self, path: &Path) -> Option<Artifact> {
        let sidecar = sidecar_path(path);
        if sidecar.exists() {
            let raw = fs::read_to_string(&sidecar).ok()?;
            let mapping = frontmatter::parse_sidecar_str(&raw).ok()?;
            let metadata = mapping_to_metadata(mapping).ok()?;
            return Some(Artifact {
                metadata,
                file_path: path.to_path_buf(),
                metadata_file_path: Some(sidecar),
            });
        }

        if path.extension().is_some_and(|e| e == "md") {
            let raw = fs::read_to_string(path).ok()?;
            let (mapping, _) = frontmatter::parse_markdown(&raw).ok()?;
            let metadata = mapping_to_metadata(mapping?).ok()?;
            return Some(Artifact {
                metadata,
                file_path: path.to_path_buf(),
                metadata_file_path: None,
            });
        }

        None
    }

    // --- Validation ---

    fn check_metadata(
        &self,
        type_def: &TypeDefinition,
        metadata: &ArtifactMetadata,
    ) -> Result<(), OapsError> {
        let issues = self.registry.validate_fields(
            type_def,
            metadata.subtype.as_deref(),
            &metadata.type_fields,
        );
        let errors: Vec<&ValidationIssue> = issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .collect();
        if errors.is_empty() {
            return Ok(());
        }
        let joined = errors
            .iter()
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Err(OapsError::Validation(format!(
            "artifact {} invalid: {joined}",
            metadata.id
        )))
    }

    /// Validate every artifact in the store. With `strict`, a warning is
    /// added for the first numbering gap in each prefix.
    pub fn validate(&self, strict: bool) -> Result<Vec<ValidationIssue>, OapsError> {
        let mut issues = Vec::new();

        for artifact in self.list_artifacts(&ArtifactFilter::default())? {
            match self.read_metadata(&artifact) {
                Ok(metadata) => {
                    issues.extend(self.validate_metadata(&metadata));
                }
                Err(e) => {
                    issues.push(
                        ValidationIssue::error(format!("failed to read metadata: {e}"))
                            .for_record(artifact.id()),
                    );
                }
            }
        }

        if strict {
            let entries = self.load_index()?;
            let mut prefixes: Vec<&str> = entries.iter().map(|e| e.metadata.prefix()).collect();
            prefixes.sort_unstable();
            prefixes.dedup();
            for prefix in prefixes {
                let mut numbers: Vec<u64> = entries
                    .iter()
                    .filter(|e| e.metadata.prefix() == prefix)
                    .filter_map(|e| e.metadata.id.rsplit('-').next())
                    .filter_map(|n| n.parse().ok())
                    .collect();
                numbers.sort_unstable();
                for (i, number) in numbers.iter().enumerate() {
                    let expected = (i + 1) as u64;
                    if *number != expected {
                        issues.push(ValidationIssue::warning(format!(
                            "number gap in {prefix} artifacts: missing {}",
                            format_artifact_id(prefix, expected)
                        )));
                        break;
                    }
                }
            }
        }

        Ok(issues)
    }

    /// Validate one artifact by id.
    pub fn validate_artifact(&self, artifact_id: &str) -> Result<Vec<ValidationIssue>, OapsError> {
        let artifact = self.get_artifact(artifact_id)?;
        let metadata = self.read_metadata(&artifact)?;
        Ok(self.validate_metadata(&metadata))
    }

    fn validate_metadata(&self, metadata: &ArtifactMetadata) -> Vec<ValidationIssue> {
        match self.registry.get_by_name(&metadata.artifact_type) {
            Some(type_def) => self
                .registry
                .validate_fields(type_def, metadata.subtype.as_deref(), &metadata.type_fields)
                .into_iter()
                .map(|i| i.for_record(&metadata.id))
                .collect(),
            None => vec![
                ValidationIssue::error(format!(
                    "unknown artifact type {:?}",
                    metadata.artifact_type
                ))
                .for_record(&metadata.id),
            ],
        }
    }
}

fn sidecar_path(content_path: &Path) -> PathBuf {
    let mut name = content_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".metadata.yaml");
    content_path.with_file_name(name)
}

fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn mapping_to_metadata(mapping: serde_yaml::Mapping) -> Result<ArtifactMetadata, OapsError> {
    serde_yaml::from_value(Value::Mapping(mapping))
        .map_err(|e| OapsError::Format(format!("invalid artifact metadata: {e}")))
}
