//! Error types for OAPS operations.
//!
//! This module defines the canonical error type used throughout OAPS.
//! All subsystems return `Result<T, OapsError>` for error handling.

use std::io;
use thiserror::Error;

/// Canonical error type for all OAPS operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
/// Several variants auto-convert from library errors via `#[from]`.
#[derive(Error, Debug)]
pub enum OapsError {
    /// A record (artifact, spec, requirement, test, idea, key) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Metadata or input failed a validation rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// Slug or id collision
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// Mutation blocked by inbound references or dependency rules
    #[error("Referential integrity error: {0}")]
    ReferentialIntegrity(String),

    /// Supersession rule violation (type mismatch, already superseded, self-link)
    #[error("Supersession error: {0}")]
    Supersession(String),

    /// Unknown artifact type prefix
    #[error("Type not registered: {0}")]
    TypeNotRegistered(String),

    /// A concurrent writer committed between HEAD capture and commit write.
    /// Carries the SHA of the already-written commit; the caller reconciles.
    #[error("Commit conflict: {message} (commit sha: {sha})")]
    CommitConflict { message: String, sha: String },

    /// A path resolved outside the repository scope
    #[error("Path outside repository: {0}")]
    PathViolation(String),

    /// Malformed front-matter, index file, or other on-disk format
    #[error("Format error: {0}")]
    Format(String),

    /// Expression compile or evaluation failure
    #[error("Expression error in {expression:?}: {message}")]
    Expression { expression: String, message: String },

    /// I/O error (auto-converts from `std::io::Error`)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// SQLite error (auto-converts from `rusqlite::Error`)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Inner git repository error (auto-converts from `git2::Error`)
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// JSON serialization error (auto-converts from `serde_json::Error`)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error (auto-converts from `serde_yaml::Error`)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl OapsError {
    /// Shorthand for a not-found error naming the record kind and id.
    pub fn not_found(kind: &str, id: &str) -> Self {
        OapsError::NotFound(format!("{kind} {id:?}"))
    }
}
