//! Session- and project-scoped key/value state on SQLite.
//!
//! One database file (`<base>/state.db`) holds every scope in a single
//! table keyed by `(session_id, key)`; the empty-string session id is the
//! project scope (SQLite `ON CONFLICT` does not accept NULL in a key
//! column). Every operation opens its own connection, runs one
//! transaction, and closes, so child processes can share the file safely
//! through SQLite's own locking.

use crate::core::error::OapsError;
use crate::core::time;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sentinel session id for the project scope.
const PROJECT_SCOPE: &str = "";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS state_store (
    session_id TEXT,
    key TEXT NOT NULL,
    value BLOB,
    created_at TEXT NOT NULL,
    created_by TEXT,
    updated_at TEXT NOT NULL,
    updated_by TEXT,
    PRIMARY KEY (session_id, key)
);

CREATE INDEX IF NOT EXISTS idx_state_store_session_updated
ON state_store (session_id, updated_at);
";

const SQL_ATOMIC_INCREMENT: &str = r#"
INSERT INTO state_store
    (session_id, "key", "value",
     "created_at", "created_by", "updated_at", "updated_by")
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT (session_id, "key") DO UPDATE SET
    "value" = COALESCE(
        CASE
            WHEN typeof(state_store."value") IN ('integer', 'real')
            THEN CAST(state_store."value" AS INTEGER)
            ELSE 0
        END, 0
    ) + excluded."value",
    "updated_at" = excluded."updated_at",
    "updated_by" = excluded."updated_by"
RETURNING "value"
"#;

/// A value storable in the state store.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Text(String),
    Int(i64),
    Real(f64),
    Blob(Vec<u8>),
    Null,
}

impl StateValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            StateValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::Text(value.to_string())
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        StateValue::Int(value)
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::Real(value)
    }
}

impl ToSql for StateValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            StateValue::Text(v) => v.to_sql(),
            StateValue::Int(v) => v.to_sql(),
            StateValue::Real(v) => v.to_sql(),
            StateValue::Blob(v) => v.to_sql(),
            StateValue::Null => Ok(ToSqlOutput::from(rusqlite::types::Null)),
        }
    }
}

impl FromSql for StateValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(StateValue::Null),
            ValueRef::Integer(v) => Ok(StateValue::Int(v)),
            ValueRef::Real(v) => Ok(StateValue::Real(v)),
            ValueRef::Text(v) => String::from_utf8(v.to_vec())
                .map(StateValue::Text)
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(v) => Ok(StateValue::Blob(v.to_vec())),
        }
    }
}

/// One row of the state store, metadata included.
#[derive(Debug, Clone, PartialEq)]
pub struct StateEntry {
    /// Empty string means project scope.
    pub session_id: String,
    pub key: String,
    pub value: StateValue,
    pub created_at: String,
    pub created_by: Option<String>,
    pub updated_at: String,
    pub updated_by: Option<String>,
}

/// A scoped handle on the shared state database.
#[derive(Debug, Clone)]
pub struct StateStore {
    db_path: PathBuf,
    session_id: Option<String>,
}

impl StateStore {
    /// Open (creating schema if needed) a store scoped to `session_id`,
    /// or to the project when `None`.
    pub fn new(db_path: impl Into<PathBuf>, session_id: Option<&str>) -> Result<Self, OapsError> {
        let store = Self {
            db_path: db_path.into(),
            session_id: session_id.map(str::to_string),
        };
        if let Some(parent) = store.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = store.connect()?;
        conn.execute_batch(SCHEMA)?;
        Ok(store)
    }

    /// Project-scoped handle.
    pub fn project(db_path: impl Into<PathBuf>) -> Result<Self, OapsError> {
        Self::new(db_path, None)
    }

    /// Session-scoped handle.
    pub fn session(db_path: impl Into<PathBuf>, session_id: &str) -> Result<Self, OapsError> {
        Self::new(db_path, Some(session_id))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn effective_session(&self) -> &str {
        self.session_id.as_deref().unwrap_or(PROJECT_SCOPE)
    }

    /// Per-call connection: busy timeout and WAL, then closed at scope
    /// exit.
    fn connect(&self) -> Result<Connection, OapsError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
        Ok(conn)
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<StateEntry> {
        Ok(StateEntry {
            session_id: row.get("session_id")?,
            key: row.get("key")?,
            value: row.get("value")?,
            created_at: row.get("created_at")?,
            created_by: row.get("created_by")?,
            updated_at: row.get("updated_at")?,
            updated_by: row.get("updated_by")?,
        })
    }

    /// Get the value for a key; missing keys are an error.
    pub fn get(&self, key: &str) -> Result<StateValue, OapsError> {
        self.get_entry(key)?
            .map(|entry| entry.value)
            .ok_or_else(|| OapsError::not_found("state key", key))
    }

    /// Get the full entry with metadata, or `None`.
    pub fn get_entry(&self, key: &str) -> Result<Option<StateEntry>, OapsError> {
        let conn = self.connect()?;
        let entry = conn
            .query_row(
                r#"SELECT * FROM state_store WHERE session_id = ?1 AND "key" = ?2"#,
                params![self.effective_session(), key],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// All keys in this scope, sorted.
    pub fn keys(&self) -> Result<Vec<String>, OapsError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"SELECT "key" FROM state_store WHERE session_id = ?1 ORDER BY "key""#,
        )?;
        let keys = stmt
            .query_map(params![self.effective_session()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    pub fn len(&self) -> Result<usize, OapsError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM state_store WHERE session_id = ?1",
            params![self.effective_session()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, OapsError> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, key: &str) -> Result<bool, OapsError> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                r#"SELECT 1 FROM state_store WHERE session_id = ?1 AND "key" = ?2"#,
                params![self.effective_session(), key],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Upsert a value. New keys record `created_at/by`; existing keys
    /// keep them and refresh `updated_at/by`.
    pub fn set(
        &self,
        key: &str,
        value: StateValue,
        author: Option<&str>,
    ) -> Result<(), OapsError> {
        let now = time::now_iso();
        let conn = self.connect()?;
        conn.execute(
            r#"INSERT INTO state_store
                   (session_id, "key", "value",
                    "created_at", "created_by", "updated_at", "updated_by")
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT (session_id, "key") DO UPDATE SET
                   "value" = excluded."value",
                   "updated_at" = excluded."updated_at",
                   "updated_by" = excluded."updated_by""#,
            params![
                self.effective_session(),
                key,
                value,
                now,
                author,
                now,
                author
            ],
        )?;
        Ok(())
    }

    /// Delete a key. Returns whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool, OapsError> {
        let conn = self.connect()?;
        let affected = conn.execute(
            r#"DELETE FROM state_store WHERE session_id = ?1 AND "key" = ?2"#,
            params![self.effective_session(), key],
        )?;
        Ok(affected > 0)
    }

    /// Remove every entry in this scope.
    pub fn clear(&self) -> Result<(), OapsError> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM state_store WHERE session_id = ?1",
            params![self.effective_session()],
        )?;
        Ok(())
    }

    /// Atomically add `amount` to a counter, initializing from 0.
    ///
    /// A single upsert statement, so concurrent increments across
    /// processes serialize through SQLite. A non-numeric current value
    /// counts as 0. `created_at/by` survive updates; `updated_at/by` are
    /// always refreshed.
    pub fn atomic_increment(
        &self,
        key: &str,
        amount: i64,
        author: Option<&str>,
    ) -> Result<i64, OapsError> {
        let now = time::now_iso();
        let conn = self.connect()?;
        let value: i64 = conn.query_row(
            SQL_ATOMIC_INCREMENT,
            params![
                self.effective_session(),
                key,
                amount,
                now,
                author,
                now,
                author
            ],
            |row| row.get(0),
        )?;
        Ok(value)
    }
}
