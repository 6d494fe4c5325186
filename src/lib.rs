//! OAPS: a local, file-backed knowledge store for engineering artifacts.
//!
//! OAPS keeps specifications, requirements, tests, ideas, and their
//! supporting documents as plain files in a store directory, and layers
//! on top of them:
//!
//! - per-folder JSON indices that summarize contents and can always be
//!   rebuilt from the files themselves
//! - an inner git repository that checkpoints every mutation, with
//!   optimistic race detection for concurrent writers
//! - a session- and project-scoped key/value state store on SQLite,
//!   including an atomic counter primitive
//! - a small boolean expression evaluator used by hook-rule matching
//!
//! # Layout
//!
//! A store lives at `<project>/.oaps`:
//!
//! ```text
//! .oaps/
//!   artifacts/            flat artifact folder
//!   artifacts.json        artifact index
//!   docs/specs/           one subdirectory per specification
//!   docs/ideas/           idea documents, index, history log
//!   state.db              SQLite state store
//!   config.toml           store settings
//!   .git                  inner checkpoint repository
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: shared primitives (codec, checkpoint repo, state store,
//!   expression evaluator, errors)
//! - [`stores`]: the artifact, spec, requirement/test, and idea stores
//!   plus the query engine

pub mod cli;
pub mod core;
pub mod stores;
