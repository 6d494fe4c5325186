//! Store configuration loaded from `<base>/config.toml`.

use crate::core::error::OapsError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level store configuration.
///
/// Every field has a default; a missing file yields `StoreConfig::default()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub author: AuthorSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSection {
    /// Maintain per-folder indices on every mutation.
    #[serde(default = "default_true")]
    pub auto_index: bool,
    /// Checkpoint every mutation in the inner repository.
    #[serde(default = "default_true")]
    pub auto_checkpoint: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            auto_index: true,
            auto_checkpoint: true,
        }
    }
}

/// Identity override for checkpoint commits. Falls back to git config, then
/// to the fixed `OAPS <oaps@localhost>` identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthorSection {
    pub name: Option<String>,
    pub email: Option<String>,
}

fn default_true() -> bool {
    true
}

impl StoreConfig {
    /// Load configuration from a store base directory.
    pub fn load(base: &Path) -> Result<Self, OapsError> {
        let path = base.join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        toml::from_str(&raw)
            .map_err(|e| OapsError::Format(format!("invalid config.toml: {e}")))
    }
}
