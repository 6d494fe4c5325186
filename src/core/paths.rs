//! Store layout and path resolution.
//!
//! An OAPS store is a directory (conventionally `<project>/.oaps`) holding
//! the artifact tree, the spec and idea document trees, the state database,
//! and the inner git repository. This module maps a base path to those
//! well-known locations and discovers store/project roots from a working
//! directory.

use crate::core::error::OapsError;
use std::path::{Path, PathBuf};

/// Directory name of an OAPS store inside a project.
pub const STORE_DIR_NAME: &str = ".oaps";

/// File name of the state database inside the store.
pub const STATE_DB_NAME: &str = "state.db";

/// Resolved locations inside one OAPS store.
///
/// The layout owns no file handles; it is pure path math over the base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    base: PathBuf,
}

impl StoreLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The store base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Root-level artifact tree (`<base>/artifacts`).
    pub fn artifacts_dir(&self) -> PathBuf {
        self.base.join("artifacts")
    }

    /// Root-level artifact index (`<base>/artifacts.json`).
    pub fn artifacts_index(&self) -> PathBuf {
        self.base.join("artifacts.json")
    }

    /// Spec tree (`<base>/docs/specs`).
    pub fn specs_dir(&self) -> PathBuf {
        self.base.join("docs").join("specs")
    }

    /// Idea tree (`<base>/docs/ideas`).
    pub fn ideas_dir(&self) -> PathBuf {
        self.base.join("docs").join("ideas")
    }

    /// The shared state database (`<base>/state.db`).
    pub fn state_db(&self) -> PathBuf {
        self.base.join(STATE_DB_NAME)
    }

    /// Store configuration file (`<base>/config.toml`).
    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.toml")
    }

    /// The inner git directory (`<base>/.git`).
    pub fn git_dir(&self) -> PathBuf {
        self.base.join(".git")
    }
}

/// Walk up from `start` looking for a directory containing `marker`.
fn ascend_to(start: &Path, marker: &str) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(marker).is_dir() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// Discover the OAPS store base from a working directory.
///
/// Walks up until a `.oaps` directory is found and returns that directory
/// (the store base, not the project root).
pub fn discover_store(working_dir: &Path) -> Result<PathBuf, OapsError> {
    ascend_to(working_dir, STORE_DIR_NAME)
        .map(|project| project.join(STORE_DIR_NAME))
        .ok_or_else(|| {
            OapsError::NotFound(format!(
                "no {STORE_DIR_NAME} store above {}",
                working_dir.display()
            ))
        })
}

/// Discover the enclosing project repository root (the directory holding
/// `.git`) from a working directory.
pub fn discover_project(working_dir: &Path) -> Result<PathBuf, OapsError> {
    ascend_to(working_dir, ".git").ok_or_else(|| {
        OapsError::NotFound(format!(
            "no git repository above {}",
            working_dir.display()
        ))
    })
}
