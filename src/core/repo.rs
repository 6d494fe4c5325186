//! Checkpoint layer over the inner git repository.
//!
//! Every store mutation is framed by a commit in a git repository rooted
//! inside the store (store-level) or at the enclosing project root
//! (project-level). The two flavors differ only in how the root is
//! discovered; all operations share one `CheckpointRepo` type that opens
//! the repository per operation and releases it at the operation
//! boundary, leaving cross-process coordination to git's own locks.
//!
//! Commits use optimistic concurrency control: HEAD is captured before
//! the write and the new commit's first parent is compared against it
//! afterwards. On mismatch the operation reports a conflict carrying the
//! SHA of the already-written commit; the commit is not rolled back and
//! the caller reconciles.

use crate::core::error::OapsError;
use crate::core::paths;
use chrono::{DateTime, FixedOffset, TimeZone as _, Utc};
use git2::{Repository, Signature, Sort, Status, StatusOptions, Tree};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Fallback identity when git config carries none.
const DEFAULT_AUTHOR_NAME: &str = "OAPS";
const DEFAULT_AUTHOR_EMAIL: &str = "oaps@localhost";

/// Working-tree status, as sets of absolute paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoStatus {
    pub staged: BTreeSet<PathBuf>,
    pub modified: BTreeSet<PathBuf>,
    pub untracked: BTreeSet<PathBuf>,
}

impl RepoStatus {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.modified.is_empty() && self.untracked.is_empty()
    }
}

/// Outcome of a commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub sha: Option<String>,
    pub files: BTreeSet<PathBuf>,
    pub no_changes: bool,
}

impl CommitResult {
    fn no_changes() -> Self {
        Self {
            sha: None,
            files: BTreeSet::new(),
            no_changes: true,
        }
    }
}

/// Outcome of a discard. Index updates precede working-tree restores and
/// the two are not atomic: compare `unstaged` with `restored` to detect
/// partial failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscardResult {
    pub unstaged: BTreeSet<PathBuf>,
    pub restored: BTreeSet<PathBuf>,
    pub no_changes: bool,
}

/// Immutable snapshot of one commit from the history walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<FixedOffset>,
    /// Size of the tree diff against the first parent; full leaf count
    /// for the initial commit.
    pub files_changed: usize,
    pub parent_shas: Vec<String>,
}

/// Handle on one checkpoint repository.
///
/// Holds only the resolved root; the underlying `git2::Repository` is
/// opened inside each operation.
#[derive(Debug, Clone)]
pub struct CheckpointRepo {
    root: PathBuf,
    author_override: Option<(String, String)>,
}

impl CheckpointRepo {
    /// Open the repository rooted exactly at a store base directory.
    pub fn open_store(base: &Path) -> Result<Self, OapsError> {
        if !base.join(".git").exists() {
            return Err(OapsError::NotFound(format!(
                "no git repository at {}",
                base.display()
            )));
        }
        Ok(Self {
            root: fs::canonicalize(base)?,
            author_override: None,
        })
    }

    /// Open the repository of the project enclosing `working_dir`,
    /// discovered by walking up to the directory holding `.git`.
    pub fn open_project(working_dir: &Path) -> Result<Self, OapsError> {
        let root = paths::discover_project(working_dir)?;
        Ok(Self {
            root: fs::canonicalize(root)?,
            author_override: None,
        })
    }

    /// Initialize a repository at `base` (no-op when one exists) and open
    /// it.
    pub fn init(base: &Path) -> Result<Self, OapsError> {
        fs::create_dir_all(base)?;
        Repository::init(base)?;
        Ok(Self {
            root: fs::canonicalize(base)?,
            author_override: None,
        })
    }

    /// Override the commit identity (normally taken from git config).
    pub fn with_author(mut self, name: &str, email: &str) -> Self {
        self.author_override = Some((name.to_string(), email.to_string()));
        self
    }

    /// The resolved repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn open(&self) -> Result<Repository, OapsError> {
        Ok(Repository::open(&self.root)?)
    }

    // --- Path containment ---

    /// Resolve a path, following symlinks in every existing component, so
    /// containment cannot be escaped through a link.
    fn resolve_path(path: &Path) -> PathBuf {
        if let Ok(resolved) = fs::canonicalize(path) {
            return resolved;
        }
        // Path does not exist yet: canonicalize the deepest existing
        // ancestor and re-append the remainder lexically.
        let mut existing = path.to_path_buf();
        let mut tail: Vec<std::ffi::OsString> = Vec::new();
        while !existing.exists() {
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name.to_os_string());
                    existing = parent.to_path_buf();
                }
                _ => break,
            }
        }
        let mut resolved = fs::canonicalize(&existing).unwrap_or(existing);
        for component in tail.iter().rev() {
            resolved.push(component);
        }
        resolved
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }

    /// Whether the resolved path lies inside the repository root.
    pub fn validate_path(&self, path: &Path) -> bool {
        Self::resolve_path(path).starts_with(&self.root)
    }

    fn to_relative(&self, path: &Path) -> Result<PathBuf, OapsError> {
        let resolved = Self::resolve_path(path);
        resolved
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| OapsError::PathViolation(path.display().to_string()))
    }

    // --- Status ---

    /// Current status as sets of absolute paths.
    pub fn get_status(&self) -> Result<RepoStatus, OapsError> {
        let repo = self.open()?;
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .exclude_submodules(true);

        let mut status = RepoStatus::default();
        for entry in repo.statuses(Some(&mut options))?.iter() {
            let Some(rel) = entry.path() else { continue };
            let abs = self.root.join(rel);
            let flags = entry.status();

            if flags.intersects(
                Status::INDEX_NEW
                    | Status::INDEX_MODIFIED
                    | Status::INDEX_DELETED
                    | Status::INDEX_RENAMED
                    | Status::INDEX_TYPECHANGE,
            ) {
                status.staged.insert(abs.clone());
            }
            if flags.intersects(
                Status::WT_MODIFIED
                    | Status::WT_DELETED
                    | Status::WT_RENAMED
                    | Status::WT_TYPECHANGE,
            ) {
                status.modified.insert(abs.clone());
            }
            if flags.contains(Status::WT_NEW) {
                status.untracked.insert(abs);
            }
        }
        Ok(status)
    }

    pub fn has_changes(&self) -> Result<bool, OapsError> {
        Ok(!self.get_status()?.is_clean())
    }

    /// All files with uncommitted changes (staged, modified, untracked).
    pub fn get_uncommitted_files(&self) -> Result<BTreeSet<PathBuf>, OapsError> {
        let status = self.get_status()?;
        let mut files = status.staged;
        files.extend(status.modified);
        files.extend(status.untracked);
        Ok(files)
    }

    // --- Staging ---

    /// Stage files for commit. Every path is validated to be inside the
    /// repository before staging; deleted files are staged as removals.
    pub fn stage(&self, paths: &[PathBuf]) -> Result<BTreeSet<PathBuf>, OapsError> {
        if paths.is_empty() {
            return Ok(BTreeSet::new());
        }
        let repo = self.open()?;
        let mut index = repo.index()?;
        let mut staged = BTreeSet::new();
        for path in paths {
            let rel = self.to_relative(path)?;
            if self.root.join(&rel).exists() {
                index.add_path(&rel)?;
            } else {
                index.remove_path(&rel)?;
            }
            staged.insert(path.clone());
        }
        index.write()?;
        Ok(staged)
    }

    // --- Commit ---

    /// Commit currently staged changes (or the given staged set).
    ///
    /// Race detection is post-facto: the new commit's first parent must
    /// equal the HEAD captured before the write, otherwise a
    /// `CommitConflict` carrying the written SHA is returned.
    pub fn commit(
        &self,
        message: &str,
        staged_paths: Option<BTreeSet<PathBuf>>,
    ) -> Result<CommitResult, OapsError> {
        let status = self.get_status()?;
        if status.staged.is_empty() {
            return Ok(CommitResult::no_changes());
        }
        let files = staged_paths.unwrap_or_else(|| status.staged.clone());

        let repo = self.open()?;
        let head_before = repo.head().ok().and_then(|h| h.target());

        let signature = self.signature(&repo)?;
        let tree_oid = {
            let mut index = repo.index()?;
            index.write_tree()?
        };
        let tree = repo.find_tree(tree_oid)?;

        let head_now = repo.head().ok().and_then(|h| h.target());
        let parent_commit = match head_now {
            Some(oid) => Some(repo.find_commit(oid)?),
            None => None,
        };
        let parents: Vec<&git2::Commit<'_>> = parent_commit.iter().collect();

        let commit_oid = repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        let sha = commit_oid.to_string();

        let written = repo.find_commit(commit_oid)?;
        let parent_ids: Vec<git2::Oid> = written.parent_ids().collect();
        match head_before {
            Some(expected) => {
                if parent_ids.first() != Some(&expected) {
                    let actual = parent_ids
                        .first()
                        .map(git2::Oid::to_string)
                        .unwrap_or_else(|| "none".to_string());
                    return Err(OapsError::CommitConflict {
                        message: format!(
                            "concurrent modification: expected parent={expected}, got parent={actual}"
                        ),
                        sha,
                    });
                }
            }
            None => {
                if !parent_ids.is_empty() {
                    return Err(OapsError::CommitConflict {
                        message: "concurrent modification: expected no parent for initial commit"
                            .to_string(),
                        sha,
                    });
                }
            }
        }

        Ok(CommitResult {
            sha: Some(sha),
            files,
            no_changes: false,
        })
    }

    /// Stage everything uncommitted, then commit.
    pub fn commit_pending(&self, message: &str) -> Result<CommitResult, OapsError> {
        let uncommitted: Vec<PathBuf> = self.get_uncommitted_files()?.into_iter().collect();
        let staged = self.stage(&uncommitted)?;
        self.commit(message, Some(staged))
    }

    /// Commit everything pending under a structured message, optionally
    /// carrying a session-id trailer.
    pub fn checkpoint(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<CommitResult, OapsError> {
        let full = match session_id {
            Some(session) => format!("{message}\n\nSession-Id: {session}"),
            None => message.to_string(),
        };
        self.commit_pending(&full)
    }

    fn signature(&self, repo: &Repository) -> Result<Signature<'static>, OapsError> {
        if let Some((name, email)) = &self.author_override {
            return Ok(Signature::now(name, email)?);
        }
        match repo.signature() {
            Ok(sig) => Ok(sig),
            Err(_) => Ok(Signature::now(DEFAULT_AUTHOR_NAME, DEFAULT_AUTHOR_EMAIL)?),
        }
    }

    // --- History ---

    /// Walk up to `n` commits from HEAD, newest first. An unborn
    /// repository yields an empty list.
    pub fn get_last_commits(&self, n: usize) -> Result<Vec<CommitInfo>, OapsError> {
        let repo = self.open()?;
        if repo.head().is_err() {
            return Ok(Vec::new());
        }

        let mut walk = repo.revwalk()?;
        walk.push_head()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        let mut commits = Vec::new();
        for oid in walk.take(n) {
            let commit = repo.find_commit(oid?)?;

            let author = commit.author();
            let when = author.when();
            let offset = FixedOffset::east_opt(when.offset_minutes() * 60)
                .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
            let timestamp = match offset.timestamp_opt(when.seconds(), 0) {
                chrono::LocalResult::Single(ts) => ts,
                _ => DateTime::<Utc>::UNIX_EPOCH.with_timezone(&offset),
            };

            let files_changed = self.count_files_changed(&repo, &commit)?;

            commits.push(CommitInfo {
                sha: commit.id().to_string(),
                message: commit.message().unwrap_or_default().to_string(),
                author_name: author.name().unwrap_or_default().to_string(),
                author_email: author.email().unwrap_or_default().to_string(),
                timestamp,
                files_changed,
                parent_shas: commit.parent_ids().map(|id| id.to_string()).collect(),
            });
        }
        Ok(commits)
    }

    fn count_files_changed(
        &self,
        repo: &Repository,
        commit: &git2::Commit<'_>,
    ) -> Result<usize, OapsError> {
        let tree = commit.tree()?;
        match commit.parent(0) {
            Ok(parent) => {
                let parent_tree = parent.tree()?;
                let diff = repo.diff_tree_to_tree(Some(&parent_tree), Some(&tree), None)?;
                Ok(diff.deltas().len())
            }
            Err(_) => Ok(count_tree_leaves(repo, &tree)),
        }
    }

    // --- Discard ---

    /// Discard uncommitted changes for tracked files, restoring both the
    /// index and the working tree from HEAD. Untracked files are never
    /// touched. Invalid paths raise; index updates happen before
    /// working-tree restores, and `restored` reports only files actually
    /// rewritten.
    pub fn discard_changes(&self, paths: Option<&[PathBuf]>) -> Result<DiscardResult, OapsError> {
        let repo = self.open()?;
        let Ok(head) = repo.head() else {
            return Ok(DiscardResult {
                unstaged: BTreeSet::new(),
                restored: BTreeSet::new(),
                no_changes: true,
            });
        };
        let head_commit = head.peel_to_commit()?;
        let tree = head_commit.tree()?;

        let status = self.get_status()?;
        let (target_staged, target_modified) = match paths {
            None => (status.staged.clone(), status.modified.clone()),
            Some(paths) => {
                let mut validated = BTreeSet::new();
                for path in paths {
                    if !self.validate_path(path) {
                        return Err(OapsError::PathViolation(path.display().to_string()));
                    }
                    validated.insert(Self::resolve_path(path));
                }
                (
                    validated.intersection(&status.staged).cloned().collect(),
                    validated.intersection(&status.modified).cloned().collect(),
                )
            }
        };

        let mut all_targets: BTreeSet<PathBuf> = target_staged.clone();
        all_targets.extend(target_modified.iter().cloned());
        if all_targets.is_empty() {
            return Ok(DiscardResult {
                unstaged: BTreeSet::new(),
                restored: BTreeSet::new(),
                no_changes: true,
            });
        }

        let relative: Vec<PathBuf> = all_targets
            .iter()
            .map(|p| self.to_relative(p))
            .collect::<Result<_, _>>()?;

        // Index first: reset entries for the targets back to HEAD. Files
        // absent from the HEAD tree drop out of the index entirely.
        let rel_strs: Vec<String> = relative
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        repo.reset_default(Some(head_commit.as_object()), rel_strs.iter().map(String::as_str))?;

        // Working tree second, file by file.
        let mut restored = BTreeSet::new();
        for rel in &relative {
            if self.restore_file_from_tree(&repo, &tree, rel)? {
                restored.insert(self.root.join(rel));
            }
        }

        Ok(DiscardResult {
            unstaged: target_staged,
            restored,
            no_changes: false,
        })
    }

    fn restore_file_from_tree(
        &self,
        repo: &Repository,
        tree: &Tree<'_>,
        rel: &Path,
    ) -> Result<bool, OapsError> {
        let Ok(entry) = tree.get_path(rel) else {
            return Ok(false);
        };
        let Ok(blob) = repo.find_blob(entry.id()) else {
            return Ok(false);
        };

        let target = self.root.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, blob.content())?;

        #[cfg(unix)]
        if entry.filemode() == 0o100755 {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(0o755))?;
        }

        Ok(true)
    }
}

fn count_tree_leaves(repo: &Repository, tree: &Tree<'_>) -> usize {
    let mut count = 0;
    for entry in tree.iter() {
        match entry.kind() {
            Some(git2::ObjectType::Tree) => {
                if let Ok(subtree) = entry
                    .to_object(repo)
                    .and_then(|obj| obj.peel_to_tree())
                {
                    count += count_tree_leaves(repo, &subtree);
                }
            }
            Some(git2::ObjectType::Blob) => count += 1,
            _ => {}
        }
    }
    count
}
