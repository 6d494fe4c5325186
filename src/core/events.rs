//! Append-only JSONL event logs.
//!
//! Stores record every mutation as one JSON envelope per line in a
//! `history.jsonl` next to the records it describes. The log is an audit
//! trail, not a source of truth; indices and record files stay
//! authoritative.

use crate::core::error::OapsError;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One mutation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// ISO-8601 timestamp of the mutation
    pub ts: String,
    /// Unique event identifier (ULID)
    pub event_id: String,
    /// Event name (e.g. "created", "status_updated", "tags_added")
    pub event: String,
    /// Who performed the mutation
    pub actor: String,
    /// Affected record id
    pub id: String,
    /// Previous value, for transitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_value: Option<String>,
    /// New value, for transitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_value: Option<String>,
}

/// Handle on one history log file.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event. Creates the file (and parent directory) on first use.
    pub fn record(
        &self,
        event: &str,
        actor: &str,
        id: &str,
        from_value: Option<&str>,
        to_value: Option<&str>,
    ) -> Result<(), OapsError> {
        let entry = HistoryEvent {
            ts: time::now_iso(),
            event_id: time::new_event_id(),
            event: event.to_string(),
            actor: actor.to_string(),
            id: id.to_string(),
            from_value: from_value.map(str::to_string),
            to_value: to_value.map(str::to_string),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        Ok(())
    }

    /// Read all events, oldest first. Missing file yields an empty list.
    pub fn read_all(&self) -> Result<Vec<HistoryEvent>, OapsError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let mut events = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }
}
