//! The record stores: artifacts, specs, requirements, tests, ideas, and
//! the read-only query layer over them.
//!
//! Each store owns a directory and a JSON index summarizing it. Indices
//! are read-through caches, invalidated on every mutation and
//! reconstructible from the filesystem with the stores' `rebuild_index`
//! operations.

pub mod artifact;
pub mod idea;
pub mod query;
pub mod registry;
pub mod requirement;
pub mod spec;
