//! Idea store: a flat collection of free-form exploration documents.
//!
//! Ideas live under `docs/ideas/` as markdown files named by their id,
//! with an `index.json` for fast listing and a `history.jsonl` audit log
//! appended on every mutation. Ids are slugified titles, suffixed with a
//! number on collision.

use crate::core::error::OapsError;
use crate::core::events::HistoryLog;
use crate::core::frontmatter;
use crate::core::fsio;
use crate::core::repo::CheckpointRepo;
use crate::core::time;
use crate::stores::artifact::generate_slug;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Lifecycle status of an idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    Seed,
    Explored,
    Promoted,
    Archived,
}

impl IdeaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IdeaStatus::Seed => "seed",
            IdeaStatus::Explored => "explored",
            IdeaStatus::Promoted => "promoted",
            IdeaStatus::Archived => "archived",
        }
    }
}

/// Kind of idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaType {
    Concept,
    Improvement,
    Experiment,
    Question,
}

impl IdeaType {
    pub fn as_str(self) -> &'static str {
        match self {
            IdeaType::Concept => "concept",
            IdeaType::Improvement => "improvement",
            IdeaType::Experiment => "experiment",
            IdeaType::Question => "question",
        }
    }
}

/// External reference attached to an idea.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdeaReference {
    pub url: String,
    pub title: String,
}

/// Front-matter of an idea document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdeaMetadata {
    pub id: String,
    pub title: String,
    pub status: IdeaStatus,
    #[serde(rename = "type")]
    pub idea_type: IdeaType,
    #[serde(with = "time::iso")]
    pub created: DateTime<Utc>,
    #[serde(with = "time::iso")]
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_ideas: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<IdeaReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
}

/// A full idea: metadata plus markdown body.
#[derive(Debug, Clone, PartialEq)]
pub struct Idea {
    pub metadata: IdeaMetadata,
    pub body: String,
    pub file_path: PathBuf,
}

impl Idea {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }
}

/// Index entry for one idea.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdeaSummary {
    pub id: String,
    pub title: String,
    pub status: IdeaStatus,
    #[serde(rename = "type")]
    pub idea_type: IdeaType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub file_path: String,
    #[serde(with = "time::iso")]
    pub created: DateTime<Utc>,
    #[serde(with = "time::iso")]
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdeaIndex {
    updated: String,
    ideas: Vec<IdeaSummary>,
}

/// Optional filters for `list`.
#[derive(Debug, Clone, Default)]
pub struct IdeaFilter<'a> {
    pub status: Option<IdeaStatus>,
    pub idea_type: Option<IdeaType>,
    /// Ideas must carry every listed tag.
    pub tags: Option<&'a [String]>,
    pub include_archived: bool,
}

/// Searchable fields for `search`.
pub const DEFAULT_SEARCH_FIELDS: &[&str] = &["title", "body", "tags"];

fn idea_filename(idea_id: &str) -> String {
    format!("{idea_id}.md")
}

/// Store of ideas rooted at an ideas directory.
pub struct IdeaStore {
    ideas_dir: PathBuf,
    repo: Option<CheckpointRepo>,
    index_cache: Mutex<Option<Vec<IdeaSummary>>>,
}

impl IdeaStore {
    pub fn new(ideas_dir: impl Into<PathBuf>) -> Self {
        Self {
            ideas_dir: ideas_dir.into(),
            repo: None,
            index_cache: Mutex::new(None),
        }
    }

    /// Attach a checkpoint repository; every mutation is committed.
    pub fn with_repo(ideas_dir: impl Into<PathBuf>, repo: CheckpointRepo) -> Self {
        Self {
            ideas_dir: ideas_dir.into(),
            repo: Some(repo),
            index_cache: Mutex::new(None),
        }
    }

    pub fn ideas_dir(&self) -> &Path {
        &self.ideas_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.ideas_dir.join("index.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.ideas_dir.join("history.jsonl")
    }

    fn history(&self) -> HistoryLog {
        HistoryLog::new(self.history_path())
    }

    fn idea_path(&self, idea_id: &str) -> PathBuf {
        self.ideas_dir.join(idea_filename(idea_id))
    }

    fn checkpoint(&self, action: &str) -> Result<(), OapsError> {
        if let Some(repo) = &self.repo {
            repo.commit_pending(&format!("idea: {action}"))?;
        }
        Ok(())
    }

    // --- Index I/O ---

    fn load_index(&self) -> Result<Vec<IdeaSummary>, OapsError> {
        let mut cache = self.index_cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entries) = cache.as_ref() {
            return Ok(entries.clone());
        }
        let path = self.index_path();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let index: IdeaIndex = serde_json::from_str(&raw)
                .map_err(|e| OapsError::Format(format!("malformed idea index: {e}")))?;
            index.ideas
        } else {
            Vec::new()
        };
        *cache = Some(entries.clone());
        Ok(entries)
    }

    fn write_index(&self, ideas: Vec<IdeaSummary>) -> Result<(), OapsError> {
        let index = IdeaIndex {
            updated: time::now_iso(),
            ideas,
        };
        fsio::write_atomic(&self.index_path(), &serde_json::to_string_pretty(&index)?)?;
        let mut cache = self.index_cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache = None;
        Ok(())
    }

    fn summary_of(&self, idea: &Idea) -> IdeaSummary {
        IdeaSummary {
            id: idea.metadata.id.clone(),
            title: idea.metadata.title.clone(),
            status: idea.metadata.status,
            idea_type: idea.metadata.idea_type,
            tags: idea.metadata.tags.clone(),
            file_path: idea_filename(&idea.metadata.id),
            created: idea.metadata.created,
            updated: idea.metadata.updated,
            author: idea.metadata.author.clone(),
        }
    }

    fn upsert_index_entry(&self, idea: &Idea) -> Result<(), OapsError> {
        let mut entries = self.load_index()?;
        let summary = self.summary_of(idea);
        match entries.iter_mut().find(|e| e.id == idea.metadata.id) {
            Some(entry) => *entry = summary,
            None => entries.push(summary),
        }
        self.write_index(entries)
    }

    // --- Idea I/O ---

    fn load_idea(&self, idea_id: &str) -> Result<Idea, OapsError> {
        let path = self.idea_path(idea_id);
        if !path.exists() {
            return Err(OapsError::not_found("idea", idea_id));
        }
        let raw = fs::read_to_string(&path)?;
        let (mapping, body) = frontmatter::parse_markdown(&raw)?;
        let mapping =
            mapping.ok_or_else(|| OapsError::Format(format!("idea {idea_id} has no front-matter")))?;
        let metadata: IdeaMetadata =
            serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
                .map_err(|e| OapsError::Format(format!("invalid idea metadata: {e}")))?;
        Ok(Idea {
            metadata,
            body,
            file_path: path,
        })
    }

    fn save_idea(&self, idea: &Idea) -> Result<(), OapsError> {
        fs::create_dir_all(&self.ideas_dir)?;
        fs::write(
            &idea.file_path,
            frontmatter::serialize_markdown(&idea.metadata, &idea.body)?,
        )?;
        Ok(())
    }

    /// Generate a unique id from a title: the slug, suffixed `-2`, `-3`, …
    /// until free.
    fn generate_idea_id(&self, title: &str) -> Result<String, OapsError> {
        let slug = generate_slug(title);
        if !self.exists(&slug)? {
            return Ok(slug);
        }
        let mut n = 2u64;
        loop {
            let candidate = format!("{slug}-{n}");
            if !self.exists(&candidate)? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    // --- Query methods ---

    pub fn exists(&self, idea_id: &str) -> Result<bool, OapsError> {
        Ok(self.load_index()?.iter().any(|e| e.id == idea_id))
    }

    pub fn get(&self, idea_id: &str) -> Result<Idea, OapsError> {
        self.load_idea(idea_id)
    }

    /// List ideas. Archived ideas are excluded unless `include_archived`.
    pub fn list(&self, filter: &IdeaFilter<'_>) -> Result<Vec<IdeaSummary>, OapsError> {
        let entries = self.load_index()?;
        let mut results = Vec::new();
        for entry in entries {
            if let Some(status) = filter.status
                && entry.status != status
            {
                continue;
            }
            if let Some(idea_type) = filter.idea_type
                && entry.idea_type != idea_type
            {
                continue;
            }
            if let Some(tags) = filter.tags
                && !tags.iter().all(|t| entry.tags.contains(t))
            {
                continue;
            }
            if !filter.include_archived && entry.status == IdeaStatus::Archived {
                continue;
            }
            results.push(entry);
        }
        Ok(results)
    }

    /// Case-insensitive substring search.
    ///
    /// Index fields (title, tags, id, author) are consulted first; the
    /// body is loaded only when nothing in the index matched and "body"
    /// is among the requested fields.
    pub fn search(&self, query: &str, fields: &[&str]) -> Result<Vec<IdeaSummary>, OapsError> {
        let query = query.to_lowercase();
        let entries = self.load_index()?;
        let mut results = Vec::new();

        for entry in entries {
            let mut matched = false;

            if fields.contains(&"title") && entry.title.to_lowercase().contains(&query) {
                matched = true;
            }
            if !matched
                && fields.contains(&"tags")
                && entry.tags.iter().any(|t| t.to_lowercase().contains(&query))
            {
                matched = true;
            }
            if !matched && fields.contains(&"id") && entry.id.to_lowercase().contains(&query) {
                matched = true;
            }
            if !matched
                && fields.contains(&"author")
                && entry
                    .author
                    .as_deref()
                    .unwrap_or("")
                    .to_lowercase()
                    .contains(&query)
            {
                matched = true;
            }
            if !matched && fields.contains(&"body") {
                match self.load_idea(&entry.id) {
                    Ok(idea) => {
                        if idea.body.to_lowercase().contains(&query) {
                            matched = true;
                        }
                    }
                    Err(OapsError::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            }

            if matched {
                results.push(entry);
            }
        }
        Ok(results)
    }

    // --- Mutation methods ---

    /// Create a new idea with status `seed`.
    pub fn create(
        &self,
        title: &str,
        idea_type: IdeaType,
        tags: Vec<String>,
        body: &str,
        author: Option<&str>,
    ) -> Result<Idea, OapsError> {
        if title.trim().is_empty() {
            return Err(OapsError::Validation("idea title cannot be empty".to_string()));
        }

        let idea_id = self.generate_idea_id(title)?;
        let now = time::now_utc();
        let idea = Idea {
            metadata: IdeaMetadata {
                id: idea_id.clone(),
                title: title.to_string(),
                status: IdeaStatus::Seed,
                idea_type,
                created: now,
                updated: now,
                author: author.map(str::to_string),
                tags,
                related_ideas: Vec::new(),
                references: Vec::new(),
                workflow: None,
            },
            body: body.to_string(),
            file_path: self.idea_path(&idea_id),
        };

        self.save_idea(&idea)?;
        self.upsert_index_entry(&idea)?;
        self.history()
            .record("created", author.unwrap_or("unknown"), &idea_id, None, None)?;
        self.checkpoint(&format!("create {idea_id}"))?;
        Ok(idea)
    }

    /// Update an idea's status.
    pub fn update_status(
        &self,
        idea_id: &str,
        status: IdeaStatus,
        actor: Option<&str>,
    ) -> Result<Idea, OapsError> {
        let mut idea = self.load_idea(idea_id)?;
        let old_status = idea.metadata.status;
        idea.metadata.status = status;
        idea.metadata.updated = time::now_utc();

        self.save_idea(&idea)?;
        self.upsert_index_entry(&idea)?;
        self.history().record(
            "status_updated",
            actor.unwrap_or("unknown"),
            idea_id,
            Some(old_status.as_str()),
            Some(status.as_str()),
        )?;
        self.checkpoint(&format!("update {idea_id} status to {}", status.as_str()))?;
        Ok(idea)
    }

    /// Replace an idea's body, and optionally its title.
    pub fn update_content(
        &self,
        idea_id: &str,
        body: &str,
        title: Option<&str>,
        actor: Option<&str>,
    ) -> Result<Idea, OapsError> {
        let mut idea = self.load_idea(idea_id)?;

        if let Some(title) = title {
            if title.trim().is_empty() {
                return Err(OapsError::Validation("idea title cannot be empty".to_string()));
            }
            idea.metadata.title = title.to_string();
        }
        idea.body = body.to_string();
        idea.metadata.updated = time::now_utc();

        self.save_idea(&idea)?;
        if title.is_some() {
            self.upsert_index_entry(&idea)?;
        }
        self.history()
            .record("content_updated", actor.unwrap_or("unknown"), idea_id, None, None)?;
        self.checkpoint(&format!("update {idea_id} content"))?;
        Ok(idea)
    }

    /// Append an external reference.
    pub fn add_reference(
        &self,
        idea_id: &str,
        url: &str,
        title: &str,
        actor: Option<&str>,
    ) -> Result<Idea, OapsError> {
        if url.trim().is_empty() {
            return Err(OapsError::Validation("reference URL cannot be empty".to_string()));
        }
        if title.trim().is_empty() {
            return Err(OapsError::Validation(
                "reference title cannot be empty".to_string(),
            ));
        }

        let mut idea = self.load_idea(idea_id)?;
        idea.metadata.references.push(IdeaReference {
            url: url.to_string(),
            title: title.to_string(),
        });
        idea.metadata.updated = time::now_utc();

        self.save_idea(&idea)?;
        self.history().record(
            "reference_added",
            actor.unwrap_or("unknown"),
            idea_id,
            None,
            Some(url),
        )?;
        self.checkpoint(&format!("add reference to {idea_id}"))?;
        Ok(idea)
    }

    /// Merge tags into an idea, deduplicated and sorted.
    pub fn add_tags(
        &self,
        idea_id: &str,
        tags: &[String],
        actor: Option<&str>,
    ) -> Result<Idea, OapsError> {
        let mut idea = self.load_idea(idea_id)?;

        let mut merged: BTreeSet<String> = idea.metadata.tags.iter().cloned().collect();
        merged.extend(tags.iter().cloned());
        idea.metadata.tags = merged.into_iter().collect();
        idea.metadata.updated = time::now_utc();

        self.save_idea(&idea)?;
        self.upsert_index_entry(&idea)?;
        self.history().record(
            "tags_added",
            actor.unwrap_or("unknown"),
            idea_id,
            None,
            Some(&tags.join(", ")),
        )?;
        self.checkpoint(&format!("add tags to {idea_id}"))?;
        Ok(idea)
    }

    /// Link related ideas. Every target must exist; self-references are
    /// dropped and the final set is sorted.
    pub fn link_ideas(
        &self,
        idea_id: &str,
        related_ids: &[String],
        actor: Option<&str>,
    ) -> Result<Idea, OapsError> {
        let mut idea = self.load_idea(idea_id)?;

        for related in related_ids {
            if !self.exists(related)? {
                return Err(OapsError::not_found("idea", related));
            }
        }

        let mut merged: BTreeSet<String> = idea.metadata.related_ideas.iter().cloned().collect();
        merged.extend(related_ids.iter().cloned());
        merged.remove(idea_id);
        idea.metadata.related_ideas = merged.into_iter().collect();
        idea.metadata.updated = time::now_utc();

        self.save_idea(&idea)?;
        self.history().record(
            "ideas_linked",
            actor.unwrap_or("unknown"),
            idea_id,
            None,
            Some(&related_ids.join(", ")),
        )?;
        self.checkpoint(&format!("link {idea_id} to related"))?;
        Ok(idea)
    }

    /// Archive an idea (status becomes `archived`).
    pub fn archive(&self, idea_id: &str, actor: Option<&str>) -> Result<Idea, OapsError> {
        self.update_status(idea_id, IdeaStatus::Archived, actor)
    }

    // --- Index maintenance ---

    /// Rebuild the index from the markdown files on disk. Returns the
    /// number of ideas indexed.
    pub fn rebuild_index(&self) -> Result<usize, OapsError> {
        if !self.ideas_dir.exists() {
            self.write_index(Vec::new())?;
            return Ok(0);
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.ideas_dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "md"))
            .collect();
        paths.sort();

        let mut entries = Vec::new();
        for path in paths {
            let Ok(raw) = fs::read_to_string(&path) else {
                continue;
            };
            let Ok((Some(mapping), body)) = frontmatter::parse_markdown(&raw) else {
                continue;
            };
            let Ok(metadata) = serde_yaml::from_value::<IdeaMetadata>(
                serde_yaml::Value::Mapping(mapping),
            ) else {
                continue;
            };
            let idea = Idea {
                file_path: path,
                metadata,
                body,
            };
            entries.push(self.summary_of(&idea));
        }

        let count = entries.len();
        self.write_index(entries)?;
        Ok(count)
    }
}
