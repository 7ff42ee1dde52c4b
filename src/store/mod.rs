//! SQLite storage for activity definitions and activity intervals.
//!
//! Two tables hold everything:
//!
//! - `activities(id, date_added, face_id, activity_string)` is append-only;
//!   the latest row per face is the effective definition.
//! - `activity_events(id, start_time, finish_time, activity_id)` is the
//!   interval ledger. A NULL `finish_time` marks the open interval.
//!
//! Timestamps are stored as epoch seconds.

mod activities;
mod intervals;
mod migrations;
pub mod models;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use intervals::{ClosedInterval, TransitionOutcome, TransitionStep};
pub use models::{ActivityDefinition, ActivityId, ActivityInterval, IntervalId, IntervalRecord};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database version ({found}) is newer than supported schema ({supported})")]
    SchemaTooNew { found: i32, supported: i32 },

    #[error("Invalid {field} value {value}")]
    InvalidValue { field: &'static str, value: i64 },
}

/// Handle onto the tracker database.
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!(error = %err, "Failed to enable WAL mode");
        }
        migrations::run_migrations(&mut conn)?;

        tracing::info!(path = %path.display(), "Database ready");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        migrations::run_migrations(&mut conn)?;
        Ok(Self { conn, path: None })
    }

    /// Location of the database file, if on disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn to_datetime(value: i64, field: &'static str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(value, 0).ok_or(StoreError::InvalidValue { field, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("facelog.db");

        let store = Store::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facelog.db");

        {
            let store = Store::open(&path).unwrap();
            store.insert_activity(crate::FaceId(1), "Dev", 100).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.activities().unwrap().len(), 1);
    }

    #[test]
    fn test_to_datetime_rejects_out_of_range() {
        assert!(to_datetime(i64::MAX, "start_time").is_err());
        assert_eq!(to_datetime(0, "start_time").unwrap().timestamp(), 0);
    }
}
