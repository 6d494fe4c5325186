//! CLI struct definitions and dispatch for the `oaps` command-line
//! interface.
//!
//! Every command group is a thin wrapper over the library stores: the
//! CLI resolves the store, calls one store operation, prints the result
//! in text or JSON, and (where configured) checkpoints the mutation.

use crate::core::config::StoreConfig;
use crate::core::error::OapsError;
use crate::core::paths::{self, StoreLayout};
use crate::core::repo::CheckpointRepo;
use crate::core::state::{StateStore, StateValue};
use crate::stores::artifact::{
    AddArtifact, ArtifactFilter, ArtifactStatus, ArtifactStore, NewContent, UpdateArtifact,
};
use crate::stores::idea::{IdeaFilter, IdeaStatus, IdeaStore, IdeaType, DEFAULT_SEARCH_FIELDS};
use crate::stores::query::{QueryEngine, RelationshipType};
use crate::stores::registry::Severity;
use crate::stores::spec::{CreateSpec, SpecFilter, SpecStatus, SpecStore, SpecType, UpdateSpec};
use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(
    name = "oaps",
    version = env!("CARGO_PKG_VERSION"),
    about = "Local, file-backed knowledge store for engineering artifacts: specs, requirements, tests, and ideas, checkpointed in an inner git repository."
)]
pub struct Cli {
    /// Store base directory (defaults to the nearest `.oaps` above cwd).
    #[clap(long, global = true)]
    store: Option<PathBuf>,
    /// Output format.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a store in the current directory (or --dir).
    Init {
        #[clap(long)]
        dir: Option<PathBuf>,
    },
    /// Manage artifacts.
    Artifact {
        #[clap(subcommand)]
        command: ArtifactCommand,
    },
    /// Manage specifications.
    Spec {
        #[clap(subcommand)]
        command: SpecCommand,
    },
    /// Manage ideas.
    Idea {
        #[clap(subcommand)]
        command: IdeaCommand,
    },
    /// Session/project key-value state.
    State {
        #[clap(subcommand)]
        command: StateCommand,
    },
    /// Inner checkpoint repository.
    Repo {
        #[clap(subcommand)]
        command: RepoCommand,
    },
    /// Read-only queries over the spec store.
    Query {
        #[clap(subcommand)]
        command: QueryCommand,
    },
    /// Validate the whole store.
    Validate {
        /// Escalate warnings (numbering gaps, missing summaries).
        #[clap(long)]
        strict: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ArtifactCommand {
    /// Add a new artifact.
    Add {
        /// Two-letter type prefix (e.g. DC, RV).
        #[clap(value_name = "PREFIX")]
        prefix: String,
        #[clap(value_name = "TITLE")]
        title: String,
        #[clap(long, default_value = "oaps")]
        author: String,
        #[clap(long)]
        content: Option<String>,
        #[clap(long)]
        subtype: Option<String>,
        #[clap(long)]
        slug: Option<String>,
        #[clap(long = "reference")]
        references: Vec<String>,
        #[clap(long = "tag")]
        tags: Vec<String>,
        #[clap(long)]
        summary: Option<String>,
        /// Type-specific field as key=value (repeatable).
        #[clap(long = "field")]
        fields: Vec<String>,
        /// Import an existing file instead of inline content.
        #[clap(long)]
        source: Option<PathBuf>,
    },
    /// List artifacts.
    List {
        #[clap(long, value_name = "PREFIX_OR_NAME")]
        r#type: Option<String>,
        #[clap(long)]
        status: Option<String>,
        #[clap(long)]
        tag: Option<String>,
    },
    /// Show one artifact.
    Get {
        #[clap(value_name = "ID")]
        id: String,
    },
    /// Print an artifact's content.
    Content {
        #[clap(value_name = "ID")]
        id: String,
    },
    /// Update artifact metadata.
    Update {
        #[clap(value_name = "ID")]
        id: String,
        #[clap(long)]
        title: Option<String>,
        #[clap(long)]
        status: Option<String>,
        #[clap(long = "tag")]
        tags: Vec<String>,
        #[clap(long)]
        summary: Option<String>,
        #[clap(long = "field")]
        fields: Vec<String>,
    },
    /// Delete an artifact.
    Delete {
        #[clap(value_name = "ID")]
        id: String,
        /// Delete even when other artifacts reference it.
        #[clap(long)]
        force: bool,
    },
    /// Mark one artifact as superseding another.
    Supersede {
        #[clap(value_name = "OLD_ID")]
        old_id: String,
        #[clap(value_name = "NEW_ID")]
        new_id: String,
    },
    /// Retract an artifact.
    Retract {
        #[clap(value_name = "ID")]
        id: String,
        #[clap(long)]
        reason: Option<String>,
    },
    /// Rebuild the artifact index from the filesystem.
    Reindex,
}

#[derive(Subcommand, Debug)]
enum SpecCommand {
    /// Create a specification.
    Create {
        #[clap(value_name = "SLUG")]
        slug: String,
        #[clap(value_name = "TITLE")]
        title: String,
        #[clap(long, value_name = "TYPE", default_value = "feature")]
        r#type: String,
        #[clap(long = "author")]
        authors: Vec<String>,
        #[clap(long = "tag")]
        tags: Vec<String>,
        #[clap(long)]
        summary: Option<String>,
        #[clap(long = "depends-on")]
        depends_on: Vec<String>,
        #[clap(long)]
        extends: Option<String>,
        #[clap(long = "integrates")]
        integrates: Vec<String>,
        #[clap(long, default_value = "oaps")]
        actor: String,
    },
    /// List specifications.
    List {
        #[clap(long)]
        status: Option<String>,
        #[clap(long, value_name = "TYPE")]
        r#type: Option<String>,
        #[clap(long = "tag")]
        tags: Vec<String>,
        #[clap(long)]
        include_archived: bool,
    },
    /// Show one specification.
    Get {
        #[clap(value_name = "ID")]
        id: String,
    },
    /// Update specification metadata.
    Update {
        #[clap(value_name = "ID")]
        id: String,
        #[clap(long)]
        title: Option<String>,
        #[clap(long)]
        status: Option<String>,
        #[clap(long)]
        summary: Option<String>,
        #[clap(long = "depends-on")]
        depends_on: Vec<String>,
        #[clap(long, default_value = "oaps")]
        actor: String,
    },
    /// Rename a specification's slug.
    Rename {
        #[clap(value_name = "ID")]
        id: String,
        #[clap(value_name = "NEW_SLUG")]
        new_slug: String,
        #[clap(long, default_value = "oaps")]
        actor: String,
    },
    /// Archive a specification (status becomes deprecated).
    Archive {
        #[clap(value_name = "ID")]
        id: String,
        #[clap(long, default_value = "oaps")]
        actor: String,
    },
    /// Delete a specification and its directory.
    Delete {
        #[clap(value_name = "ID")]
        id: String,
        #[clap(long)]
        force: bool,
        #[clap(long, default_value = "oaps")]
        actor: String,
    },
    /// Rebuild the spec index from the filesystem.
    Reindex,
}

#[derive(Subcommand, Debug)]
enum IdeaCommand {
    /// Create an idea.
    Create {
        #[clap(value_name = "TITLE")]
        title: String,
        #[clap(long, value_name = "TYPE", default_value = "concept")]
        r#type: String,
        #[clap(long = "tag")]
        tags: Vec<String>,
        #[clap(long, default_value = "")]
        body: String,
        #[clap(long)]
        author: Option<String>,
    },
    /// List ideas.
    List {
        #[clap(long)]
        status: Option<String>,
        #[clap(long, value_name = "TYPE")]
        r#type: Option<String>,
        #[clap(long = "tag")]
        tags: Vec<String>,
        #[clap(long)]
        include_archived: bool,
    },
    /// Show one idea.
    Get {
        #[clap(value_name = "ID")]
        id: String,
    },
    /// Search ideas by substring.
    Search {
        #[clap(value_name = "QUERY")]
        query: String,
        /// Fields to search (title, body, tags, id, author).
        #[clap(long = "field")]
        fields: Vec<String>,
    },
    /// Update an idea's status.
    Status {
        #[clap(value_name = "ID")]
        id: String,
        #[clap(value_name = "STATUS")]
        status: String,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Add tags to an idea.
    Tag {
        #[clap(value_name = "ID")]
        id: String,
        #[clap(value_name = "TAGS", required = true)]
        tags: Vec<String>,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Link related ideas.
    Link {
        #[clap(value_name = "ID")]
        id: String,
        #[clap(value_name = "RELATED", required = true)]
        related: Vec<String>,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Archive an idea.
    Archive {
        #[clap(value_name = "ID")]
        id: String,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Rebuild the idea index from the filesystem.
    Reindex,
}

#[derive(Subcommand, Debug)]
enum StateCommand {
    /// Read a key.
    Get {
        #[clap(value_name = "KEY")]
        key: String,
        #[clap(long)]
        session: Option<String>,
    },
    /// Write a key (value parsed as int, float, then string).
    Set {
        #[clap(value_name = "KEY")]
        key: String,
        #[clap(value_name = "VALUE")]
        value: String,
        #[clap(long)]
        session: Option<String>,
        #[clap(long)]
        author: Option<String>,
    },
    /// Delete a key.
    Delete {
        #[clap(value_name = "KEY")]
        key: String,
        #[clap(long)]
        session: Option<String>,
    },
    /// List keys in scope.
    List {
        #[clap(long)]
        session: Option<String>,
    },
    /// Atomically increment a counter.
    Incr {
        #[clap(value_name = "KEY")]
        key: String,
        #[clap(long, default_value_t = 1)]
        amount: i64,
        #[clap(long)]
        session: Option<String>,
        #[clap(long)]
        author: Option<String>,
    },
    /// Remove every key in scope.
    Clear {
        #[clap(long)]
        session: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum RepoCommand {
    /// Show staged, modified, and untracked files.
    Status,
    /// Show the last commits.
    Log {
        #[clap(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// Stage everything pending and commit.
    Commit {
        #[clap(short = 'm', long)]
        message: String,
        #[clap(long)]
        session: Option<String>,
    },
    /// Discard uncommitted changes for tracked files.
    Discard {
        /// Restrict to specific paths.
        paths: Vec<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum QueryCommand {
    /// Implementation progress of a spec.
    Progress {
        #[clap(value_name = "SPEC_ID")]
        spec_id: String,
    },
    /// Test coverage of a spec.
    Coverage {
        #[clap(value_name = "SPEC_ID")]
        spec_id: String,
    },
    /// Requirements without passing tests.
    Unverified {
        #[clap(value_name = "SPEC_ID")]
        spec_id: String,
    },
    /// Orphaned tests and artifacts.
    Orphans {
        #[clap(value_name = "SPEC_ID")]
        spec_id: String,
    },
    /// The spec dependency graph.
    Graph {
        #[clap(long)]
        spec: Option<String>,
    },
    /// The labelled relationship graph.
    Relationships {
        #[clap(long)]
        spec: Option<String>,
        /// Restrict to relationship types (depends_on, extends,
        /// supersedes, integrates).
        #[clap(long = "type")]
        types: Vec<String>,
    },
}

/// Parse CLI arguments and dispatch.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dispatch(cli)
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Init { dir } => cmd_init(dir, cli.store),
        command => {
            let layout = resolve_store(cli.store)?;
            match command {
                Command::Init { .. } => unreachable!("handled above"),
                Command::Artifact { command } => cmd_artifact(&layout, command, format),
                Command::Spec { command } => cmd_spec(&layout, command, format),
                Command::Idea { command } => cmd_idea(&layout, command, format),
                Command::State { command } => cmd_state(&layout, command, format),
                Command::Repo { command } => cmd_repo(&layout, command, format),
                Command::Query { command } => cmd_query(&layout, command, format),
                Command::Validate { strict } => cmd_validate(&layout, strict, format),
            }
        }
    }
}

fn resolve_store(explicit: Option<PathBuf>) -> anyhow::Result<StoreLayout> {
    match explicit {
        Some(base) => Ok(StoreLayout::new(base)),
        None => {
            let cwd = std::env::current_dir()?;
            let base = paths::discover_store(&cwd).context("no OAPS store found; run `oaps init`")?;
            Ok(StoreLayout::new(base))
        }
    }
}

fn open_repo(layout: &StoreLayout) -> anyhow::Result<Option<CheckpointRepo>> {
    let config = StoreConfig::load(layout.base())?;
    if !config.store.auto_checkpoint || !layout.git_dir().exists() {
        return Ok(None);
    }
    let mut repo = CheckpointRepo::open_store(layout.base())?;
    if let (Some(name), Some(email)) = (&config.author.name, &config.author.email) {
        repo = repo.with_author(name, email);
    }
    Ok(Some(repo))
}

fn checkpoint(layout: &StoreLayout, message: &str) -> anyhow::Result<()> {
    if let Some(repo) = open_repo(layout)? {
        repo.commit_pending(message)?;
    }
    Ok(())
}

fn cmd_init(dir: Option<PathBuf>, store: Option<PathBuf>) -> anyhow::Result<()> {
    let base = match store {
        Some(base) => base,
        None => {
            let root = match dir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            root.join(paths::STORE_DIR_NAME)
        }
    };
    let layout = StoreLayout::new(&base);

    std::fs::create_dir_all(layout.specs_dir())?;
    std::fs::create_dir_all(layout.ideas_dir())?;
    ArtifactStore::new(layout.base()).initialize()?;
    StateStore::project(layout.state_db())?;
    // Scratch state never belongs in checkpoints.
    std::fs::write(layout.base().join(".gitignore"), "state.db*\n")?;
    let repo = CheckpointRepo::init(layout.base())?;
    repo.commit_pending("initialize store")?;

    println!("{} {}", "initialized store at".green(), base.display());
    Ok(())
}

fn parse_fields(fields: &[String]) -> anyhow::Result<BTreeMap<String, serde_yaml::Value>> {
    let mut parsed = BTreeMap::new();
    for field in fields {
        let Some((key, value)) = field.split_once('=') else {
            bail!("--field expects key=value, got {field:?}");
        };
        parsed.insert(key.to_string(), serde_yaml::Value::from(value));
    }
    Ok(parsed)
}

fn parse_artifact_status(value: &str) -> anyhow::Result<ArtifactStatus> {
    Ok(ArtifactStatus::parse(value)?)
}

fn parse_spec_type(value: &str) -> anyhow::Result<SpecType> {
    match value {
        "feature" => Ok(SpecType::Feature),
        "enhancement" => Ok(SpecType::Enhancement),
        "integration" => Ok(SpecType::Integration),
        "architecture" => Ok(SpecType::Architecture),
        "process" => Ok(SpecType::Process),
        other => bail!("invalid spec type {other:?}"),
    }
}

fn parse_spec_status(value: &str) -> anyhow::Result<SpecStatus> {
    match value {
        "draft" => Ok(SpecStatus::Draft),
        "review" => Ok(SpecStatus::Review),
        "approved" => Ok(SpecStatus::Approved),
        "implemented" => Ok(SpecStatus::Implemented),
        "deprecated" => Ok(SpecStatus::Deprecated),
        other => bail!("invalid spec status {other:?}"),
    }
}

fn parse_idea_status(value: &str) -> anyhow::Result<IdeaStatus> {
    match value {
        "seed" => Ok(IdeaStatus::Seed),
        "explored" => Ok(IdeaStatus::Explored),
        "promoted" => Ok(IdeaStatus::Promoted),
        "archived" => Ok(IdeaStatus::Archived),
        other => bail!("invalid idea status {other:?}"),
    }
}

fn parse_idea_type(value: &str) -> anyhow::Result<IdeaType> {
    match value {
        "concept" => Ok(IdeaType::Concept),
        "improvement" => Ok(IdeaType::Improvement),
        "experiment" => Ok(IdeaType::Experiment),
        "question" => Ok(IdeaType::Question),
        other => bail!("invalid idea type {other:?}"),
    }
}

fn parse_relationship_type(value: &str) -> anyhow::Result<RelationshipType> {
    match value {
        "depends_on" => Ok(RelationshipType::DependsOn),
        "extends" => Ok(RelationshipType::Extends),
        "supersedes" => Ok(RelationshipType::Supersedes),
        "integrates" => Ok(RelationshipType::Integrates),
        other => bail!("invalid relationship type {other:?}"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_artifact(
    layout: &StoreLayout,
    command: ArtifactCommand,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = StoreConfig::load(layout.base())?;
    let store = ArtifactStore::new(layout.base()).auto_index(config.store.auto_index);
    match command {
        ArtifactCommand::Add {
            prefix,
            title,
            author,
            content,
            subtype,
            slug,
            references,
            tags,
            summary,
            fields,
            source,
        } => {
            let mut params = AddArtifact::new(&prefix, &title, &author);
            params.content = content.as_deref().map(NewContent::Text);
            params.subtype = subtype.as_deref();
            params.slug = slug.as_deref();
            params.references = references;
            params.tags = tags;
            params.summary = summary.as_deref();
            params.type_fields = parse_fields(&fields)?;
            params.source_path = source.as_deref();
            let artifact = store.add_artifact(params)?;
            checkpoint(layout, &format!("artifact: add {}", artifact.id()))?;
            match format {
                OutputFormat::Json => print_json(&json!({
                    "id": artifact.id(),
                    "file_path": artifact.file_path,
                })),
                OutputFormat::Text => {
                    println!("{} {}", artifact.id().green(), artifact.metadata.title);
                    Ok(())
                }
            }
        }
        ArtifactCommand::List { r#type, status, tag } => {
            let status = status.as_deref().map(parse_artifact_status).transpose()?;
            let filter = ArtifactFilter {
                type_filter: r#type.as_deref(),
                status_filter: status,
                tag_filter: tag.as_deref(),
            };
            let artifacts = store.list_artifacts(&filter)?;
            match format {
                OutputFormat::Json => {
                    let rows: Vec<_> = artifacts.iter().map(|a| &a.metadata).collect();
                    print_json(&rows)
                }
                OutputFormat::Text => {
                    for artifact in &artifacts {
                        println!(
                            "{}  {:<10}  {}",
                            artifact.id().bold(),
                            artifact.metadata.status.as_str(),
                            artifact.metadata.title
                        );
                    }
                    Ok(())
                }
            }
        }
        ArtifactCommand::Get { id } => {
            let artifact = store.get_artifact(&id)?;
            match format {
                OutputFormat::Json => print_json(&artifact.metadata),
                OutputFormat::Text => {
                    println!("{}  {}", artifact.id().bold(), artifact.metadata.title);
                    println!("type: {}", artifact.metadata.artifact_type);
                    println!("status: {}", artifact.metadata.status.as_str());
                    println!("file: {}", artifact.file_path.display());
                    Ok(())
                }
            }
        }
        ArtifactCommand::Content { id } => {
            match store.get_artifact_content(&id)? {
                crate::stores::artifact::ArtifactContent::Text(text) => print!("{text}"),
                crate::stores::artifact::ArtifactContent::Bytes(bytes) => {
                    use std::io::Write;
                    std::io::stdout().write_all(&bytes)?;
                }
            }
            Ok(())
        }
        ArtifactCommand::Update {
            id,
            title,
            status,
            tags,
            summary,
            fields,
        } => {
            let status = status.as_deref().map(parse_artifact_status).transpose()?;
            let patch = UpdateArtifact {
                title: title.as_deref(),
                status,
                tags: if tags.is_empty() { None } else { Some(tags) },
                summary: summary.as_deref(),
                type_fields: parse_fields(&fields)?,
                ..UpdateArtifact::default()
            };
            let artifact = store.update_artifact(&id, patch)?;
            checkpoint(layout, &format!("artifact: update {id}"))?;
            match format {
                OutputFormat::Json => print_json(&artifact.metadata),
                OutputFormat::Text => {
                    println!("{} updated", artifact.id().green());
                    Ok(())
                }
            }
        }
        ArtifactCommand::Delete { id, force } => {
            store.delete_artifact(&id, force)?;
            checkpoint(layout, &format!("artifact: delete {id}"))?;
            println!("{} deleted", id.red());
            Ok(())
        }
        ArtifactCommand::Supersede { old_id, new_id } => {
            let (old, new) = store.supersede_artifact(&old_id, &new_id)?;
            checkpoint(layout, &format!("artifact: supersede {old_id} with {new_id}"))?;
            match format {
                OutputFormat::Json => print_json(&json!({
                    "old": old.metadata,
                    "new": new.metadata,
                })),
                OutputFormat::Text => {
                    println!("{} superseded by {}", old.id().yellow(), new.id().green());
                    Ok(())
                }
            }
        }
        ArtifactCommand::Retract { id, reason } => {
            let artifact = store.retract_artifact(&id, reason.as_deref())?;
            checkpoint(layout, &format!("artifact: retract {id}"))?;
            println!("{} retracted", artifact.id().yellow());
            Ok(())
        }
        ArtifactCommand::Reindex => {
            store.rebuild_index()?;
            println!("artifact index rebuilt");
            Ok(())
        }
    }
}

fn cmd_spec(layout: &StoreLayout, command: SpecCommand, format: OutputFormat) -> anyhow::Result<()> {
    let store = match open_repo(layout)? {
        Some(repo) => SpecStore::with_repo(layout.specs_dir(), repo),
        None => SpecStore::new(layout.specs_dir()),
    };
    match command {
        SpecCommand::Create {
            slug,
            title,
            r#type,
            authors,
            tags,
            summary,
            depends_on,
            extends,
            integrates,
            actor,
        } => {
            let mut params = CreateSpec::new(&slug, &title, parse_spec_type(&r#type)?, &actor);
            params.authors = authors;
            params.tags = tags;
            params.summary = summary.as_deref();
            params.depends_on = depends_on;
            params.extends = extends;
            params.integrates = integrates;
            let spec = store.create_spec(params)?;
            match format {
                OutputFormat::Json => print_json(&spec.metadata),
                OutputFormat::Text => {
                    println!("{} {}", spec.id().green(), spec.metadata.title);
                    Ok(())
                }
            }
        }
        SpecCommand::List {
            status,
            r#type,
            tags,
            include_archived,
        } => {
            let filter = SpecFilter {
                status: status.as_deref().map(parse_spec_status).transpose()?,
                spec_type: r#type.as_deref().map(parse_spec_type).transpose()?,
                tags: if tags.is_empty() { None } else { Some(tags.as_slice()) },
                include_archived,
            };
            let specs = store.list_specs(&filter)?;
            match format {
                OutputFormat::Json => print_json(&specs),
                OutputFormat::Text => {
                    for spec in &specs {
                        println!(
                            "{}  {:<12}  {}",
                            spec.id.bold(),
                            spec.status.as_str(),
                            spec.title
                        );
                    }
                    Ok(())
                }
            }
        }
        SpecCommand::Get { id } => {
            let spec = store.get_spec(&id)?;
            match format {
                OutputFormat::Json => print_json(&spec.metadata),
                OutputFormat::Text => {
                    println!("{}  {}", spec.id().bold(), spec.metadata.title);
                    println!("slug: {}", spec.metadata.slug);
                    println!("type: {}", spec.metadata.spec_type.as_str());
                    println!("status: {}", spec.metadata.status.as_str());
                    if !spec.metadata.relationships.depends_on.is_empty() {
                        println!(
                            "depends on: {}",
                            spec.metadata.relationships.depends_on.join(", ")
                        );
                    }
                    if !spec.metadata.relationships.dependents.is_empty() {
                        println!(
                            "dependents: {}",
                            spec.metadata.relationships.dependents.join(", ")
                        );
                    }
                    Ok(())
                }
            }
        }
        SpecCommand::Update {
            id,
            title,
            status,
            summary,
            depends_on,
            actor,
        } => {
            let patch = UpdateSpec {
                title: title.as_deref(),
                status: status.as_deref().map(parse_spec_status).transpose()?,
                summary: summary.as_deref(),
                depends_on: if depends_on.is_empty() {
                    None
                } else {
                    Some(depends_on)
                },
                ..UpdateSpec::default()
            };
            let spec = store.update_spec(&id, patch, &actor)?;
            match format {
                OutputFormat::Json => print_json(&spec.metadata),
                OutputFormat::Text => {
                    println!("{} updated", spec.id().green());
                    Ok(())
                }
            }
        }
        SpecCommand::Rename { id, new_slug, actor } => {
            let spec = store.rename_spec(&id, &new_slug, &actor)?;
            println!("{} renamed to {}", spec.id().green(), spec.metadata.slug);
            Ok(())
        }
        SpecCommand::Archive { id, actor } => {
            let spec = store.archive_spec(&id, &actor)?;
            println!("{} archived", spec.id().yellow());
            Ok(())
        }
        SpecCommand::Delete { id, force, actor } => {
            store.delete_spec(&id, force, &actor)?;
            println!("{} deleted", id.red());
            Ok(())
        }
        SpecCommand::Reindex => {
            store.rebuild_index()?;
            println!("spec index rebuilt");
            Ok(())
        }
    }
}

fn cmd_idea(layout: &StoreLayout, command: IdeaCommand, format: OutputFormat) -> anyhow::Result<()> {
    let store = match open_repo(layout)? {
        Some(repo) => IdeaStore::with_repo(layout.ideas_dir(), repo),
        None => IdeaStore::new(layout.ideas_dir()),
    };
    match command {
        IdeaCommand::Create {
            title,
            r#type,
            tags,
            body,
            author,
        } => {
            let idea = store.create(
                &title,
                parse_idea_type(&r#type)?,
                tags,
                &body,
                author.as_deref(),
            )?;
            match format {
                OutputFormat::Json => print_json(&idea.metadata),
                OutputFormat::Text => {
                    println!("{} {}", idea.id().green(), idea.metadata.title);
                    Ok(())
                }
            }
        }
        IdeaCommand::List {
            status,
            r#type,
            tags,
            include_archived,
        } => {
            let filter = IdeaFilter {
                status: status.as_deref().map(parse_idea_status).transpose()?,
                idea_type: r#type.as_deref().map(parse_idea_type).transpose()?,
                tags: if tags.is_empty() { None } else { Some(tags.as_slice()) },
                include_archived,
            };
            let ideas = store.list(&filter)?;
            match format {
                OutputFormat::Json => print_json(&ideas),
                OutputFormat::Text => {
                    for idea in &ideas {
                        println!(
                            "{}  {:<9}  {}",
                            idea.id.bold(),
                            idea.status.as_str(),
                            idea.title
                        );
                    }
                    Ok(())
                }
            }
        }
        IdeaCommand::Get { id } => {
            let idea = store.get(&id)?;
            match format {
                OutputFormat::Json => print_json(&idea.metadata),
                OutputFormat::Text => {
                    println!("{}  {}", idea.id().bold(), idea.metadata.title);
                    println!("status: {}", idea.metadata.status.as_str());
                    if !idea.body.is_empty() {
                        println!("\n{}", idea.body);
                    }
                    Ok(())
                }
            }
        }
        IdeaCommand::Search { query, fields } => {
            let fields: Vec<&str> = if fields.is_empty() {
                DEFAULT_SEARCH_FIELDS.to_vec()
            } else {
                fields.iter().map(String::as_str).collect()
            };
            let results = store.search(&query, &fields)?;
            match format {
                OutputFormat::Json => print_json(&results),
                OutputFormat::Text => {
                    for idea in &results {
                        println!("{}  {}", idea.id.bold(), idea.title);
                    }
                    Ok(())
                }
            }
        }
        IdeaCommand::Status { id, status, actor } => {
            let idea = store.update_status(&id, parse_idea_status(&status)?, actor.as_deref())?;
            println!("{} is now {}", idea.id().green(), idea.metadata.status.as_str());
            Ok(())
        }
        IdeaCommand::Tag { id, tags, actor } => {
            let idea = store.add_tags(&id, &tags, actor.as_deref())?;
            println!("{} tags: {}", idea.id().green(), idea.metadata.tags.join(", "));
            Ok(())
        }
        IdeaCommand::Link { id, related, actor } => {
            let idea = store.link_ideas(&id, &related, actor.as_deref())?;
            println!(
                "{} related: {}",
                idea.id().green(),
                idea.metadata.related_ideas.join(", ")
            );
            Ok(())
        }
        IdeaCommand::Archive { id, actor } => {
            let idea = store.archive(&id, actor.as_deref())?;
            println!("{} archived", idea.id().yellow());
            Ok(())
        }
        IdeaCommand::Reindex => {
            let count = store.rebuild_index()?;
            println!("idea index rebuilt ({count} ideas)");
            Ok(())
        }
    }
}

fn parse_state_value(raw: &str) -> StateValue {
    if let Ok(i) = raw.parse::<i64>() {
        return StateValue::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return StateValue::Real(f);
    }
    StateValue::Text(raw.to_string())
}

fn render_state_value(value: &StateValue) -> String {
    match value {
        StateValue::Text(s) => s.clone(),
        StateValue::Int(i) => i.to_string(),
        StateValue::Real(f) => f.to_string(),
        StateValue::Blob(b) => format!("<{} bytes>", b.len()),
        StateValue::Null => "null".to_string(),
    }
}

fn cmd_state(
    layout: &StoreLayout,
    command: StateCommand,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let open = |session: &Option<String>| -> Result<StateStore, OapsError> {
        StateStore::new(layout.state_db(), session.as_deref())
    };
    match command {
        StateCommand::Get { key, session } => {
            let value = open(&session)?.get(&key)?;
            match format {
                OutputFormat::Json => print_json(&json!({"key": key, "value": render_state_value(&value)})),
                OutputFormat::Text => {
                    println!("{}", render_state_value(&value));
                    Ok(())
                }
            }
        }
        StateCommand::Set {
            key,
            value,
            session,
            author,
        } => {
            open(&session)?.set(&key, parse_state_value(&value), author.as_deref())?;
            println!("{} set", key.green());
            Ok(())
        }
        StateCommand::Delete { key, session } => {
            let deleted = open(&session)?.delete(&key)?;
            if deleted {
                println!("{} deleted", key.red());
            } else {
                println!("{key} not present");
            }
            Ok(())
        }
        StateCommand::List { session } => {
            let keys = open(&session)?.keys()?;
            match format {
                OutputFormat::Json => print_json(&keys),
                OutputFormat::Text => {
                    for key in keys {
                        println!("{key}");
                    }
                    Ok(())
                }
            }
        }
        StateCommand::Incr {
            key,
            amount,
            session,
            author,
        } => {
            let value = open(&session)?.atomic_increment(&key, amount, author.as_deref())?;
            println!("{value}");
            Ok(())
        }
        StateCommand::Clear { session } => {
            open(&session)?.clear()?;
            println!("scope cleared");
            Ok(())
        }
    }
}

fn cmd_repo(layout: &StoreLayout, command: RepoCommand, format: OutputFormat) -> anyhow::Result<()> {
    let repo = CheckpointRepo::open_store(layout.base())?;
    match command {
        RepoCommand::Status => {
            let status = repo.get_status()?;
            match format {
                OutputFormat::Json => print_json(&json!({
                    "staged": status.staged,
                    "modified": status.modified,
                    "untracked": status.untracked,
                })),
                OutputFormat::Text => {
                    for path in &status.staged {
                        println!("{} {}", "staged   ".green(), path.display());
                    }
                    for path in &status.modified {
                        println!("{} {}", "modified ".yellow(), path.display());
                    }
                    for path in &status.untracked {
                        println!("{} {}", "untracked".red(), path.display());
                    }
                    Ok(())
                }
            }
        }
        RepoCommand::Log { count } => {
            let commits = repo.get_last_commits(count)?;
            match format {
                OutputFormat::Json => print_json(&json!(
                    commits
                        .iter()
                        .map(|c| json!({
                            "sha": c.sha,
                            "message": c.message,
                            "author": c.author_name,
                            "timestamp": c.timestamp.to_rfc3339(),
                            "files_changed": c.files_changed,
                        }))
                        .collect::<Vec<_>>()
                )),
                OutputFormat::Text => {
                    for commit in &commits {
                        let subject = commit.message.lines().next().unwrap_or_default();
                        println!(
                            "{}  {}  {}",
                            commit.sha[..8].bold(),
                            commit.timestamp.format("%Y-%m-%d %H:%M"),
                            subject
                        );
                    }
                    Ok(())
                }
            }
        }
        RepoCommand::Commit { message, session } => {
            let result = repo.checkpoint(&message, session.as_deref())?;
            if result.no_changes {
                println!("nothing to commit");
            } else if let Some(sha) = &result.sha {
                println!("{} {}", "committed".green(), &sha[..8]);
            }
            Ok(())
        }
        RepoCommand::Discard { paths } => {
            let paths = if paths.is_empty() { None } else { Some(paths) };
            let result = repo.discard_changes(paths.as_deref())?;
            if result.no_changes {
                println!("nothing to discard");
            } else {
                println!(
                    "unstaged {} file(s), restored {} file(s)",
                    result.unstaged.len(),
                    result.restored.len()
                );
            }
            Ok(())
        }
    }
}

fn cmd_query(layout: &StoreLayout, command: QueryCommand, format: OutputFormat) -> anyhow::Result<()> {
    let specs = SpecStore::new(layout.specs_dir());
    let engine = QueryEngine::with_artifacts(&specs);
    match command {
        QueryCommand::Progress { spec_id } => {
            let report = engine.progress(&spec_id)?;
            match format {
                OutputFormat::Json => print_json(&report),
                OutputFormat::Text => {
                    println!(
                        "{}: {}/{} implemented ({:.1}%), {} verified",
                        report.spec_id.bold(),
                        report.implemented_requirements,
                        report.total_requirements,
                        report.overall_percentage,
                        report.verified_requirements
                    );
                    Ok(())
                }
            }
        }
        QueryCommand::Coverage { spec_id } => {
            let report = engine.coverage(&spec_id)?;
            match format {
                OutputFormat::Json => print_json(&report),
                OutputFormat::Text => {
                    println!(
                        "{}: {}/{} covered ({:.1}%)",
                        report.spec_id.bold(),
                        report.covered_requirements,
                        report.total_requirements,
                        report.overall_coverage
                    );
                    Ok(())
                }
            }
        }
        QueryCommand::Unverified { spec_id } => {
            let requirements = engine.unverified(&spec_id)?;
            match format {
                OutputFormat::Json => print_json(&requirements),
                OutputFormat::Text => {
                    for req in &requirements {
                        println!("{}  {}", req.id.bold(), req.title);
                    }
                    Ok(())
                }
            }
        }
        QueryCommand::Orphans { spec_id } => {
            let report = engine.orphans(&spec_id)?;
            match format {
                OutputFormat::Json => print_json(&report),
                OutputFormat::Text => {
                    for test in &report.orphaned_tests {
                        println!("orphaned test: {}  {}", test.id.bold(), test.title);
                    }
                    for test in &report.tests_missing_file {
                        println!("missing file:  {}  {}", test.id.bold(), test.title);
                    }
                    for artifact in &report.orphaned_artifacts {
                        println!("orphaned artifact: {}", artifact.bold());
                    }
                    Ok(())
                }
            }
        }
        QueryCommand::Graph { spec } => {
            let graph = engine.dependency_graph(spec.as_deref())?;
            match format {
                OutputFormat::Json => print_json(&graph),
                OutputFormat::Text => {
                    for node in &graph.nodes {
                        println!("{}{}", "  ".repeat(node.depth), node.spec_id.bold());
                    }
                    if graph.has_cycles {
                        println!("{} {}", "cycle:".red(), graph.cycle_path.join(" -> "));
                    }
                    Ok(())
                }
            }
        }
        QueryCommand::Relationships { spec, types } => {
            let types = types
                .iter()
                .map(|t| parse_relationship_type(t))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let types = if types.is_empty() { None } else { Some(&types[..]) };
            let graph = engine.relationship_graph(spec.as_deref(), types)?;
            match format {
                OutputFormat::Json => print_json(&graph),
                OutputFormat::Text => {
                    for edge in &graph.edges {
                        println!(
                            "{} -[{:?}]-> {}",
                            edge.from_spec_id.bold(),
                            edge.relationship_type,
                            edge.to_spec_id
                        );
                    }
                    Ok(())
                }
            }
        }
    }
}

fn cmd_validate(layout: &StoreLayout, strict: bool, format: OutputFormat) -> anyhow::Result<()> {
    let artifacts = ArtifactStore::new(layout.base());
    let specs = SpecStore::new(layout.specs_dir());

    let mut issues = artifacts.validate(strict)?;
    for spec in specs.list_specs(&SpecFilter {
        include_archived: true,
        ..Default::default()
    })? {
        issues.extend(specs.validate_spec(&spec.id, strict)?);
    }

    let errors = issues
        .iter()
        .filter(|i| i.severity == Severity::Error)
        .count();

    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = issues
                .iter()
                .map(|i| {
                    json!({
                        "severity": match i.severity {
                            Severity::Error => "error",
                            Severity::Warning => "warning",
                        },
                        "message": i.message,
                        "record_id": i.record_id,
                        "field": i.field,
                    })
                })
                .collect();
            print_json(&rows)?;
        }
        OutputFormat::Text => {
            for issue in &issues {
                let label = match issue.severity {
                    Severity::Error => "error".red(),
                    Severity::Warning => "warning".yellow(),
                };
                match &issue.record_id {
                    Some(id) => println!("{label} [{id}] {}", issue.message),
                    None => println!("{label} {}", issue.message),
                }
            }
            if issues.is_empty() {
                println!("{}", "store is valid".green());
            }
        }
    }

    if errors > 0 {
        bail!("{errors} validation error(s)");
    }
    Ok(())
}
