//! Small filesystem helpers shared by the stores.

use crate::core::error::OapsError;
use std::fs;
use std::path::Path;

/// Write a file atomically: write to a `.tmp` sibling, then rename over the
/// target. A crash mid-write leaves the previous contents intact.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), OapsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
