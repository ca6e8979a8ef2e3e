//! Local persistence for missions, processed messages, and the checkpoint.
//!
//! Everything lives in a single `SQLite` file:
//!
//! ```text
//! <root>/mailprint.db
//!   missions            # one row per actionable message
//!   processed_messages  # every message a cycle has handled
//!   settings            # key/value, holds the mailbox checkpoint
//! ```
//!
//! One process writes the store at a time. Each mission write is a single
//! statement or transaction, so an interrupted cycle never leaves a
//! half-written mission behind.

mod checkpoint;
mod message;
mod mission;
mod stats;

use std::{fs, io, path::Path};

use rusqlite::Connection;

use crate::model::{Mission, MissionStatus};

pub use stats::Stats;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("mission not found: {0}")]
    MissionNotFound(String),

    /// The source message already has a mission. Carries the existing record.
    #[error(
        "message {} already has mission {}",
        .0.source_message_id,
        .0.mission_id
    )]
    Conflict(Box<Mission>),

    #[error("mission {mission_id} is {from}; it cannot become {to}")]
    InvalidTransition {
        mission_id: String,
        from: MissionStatus,
        to: MissionStatus,
    },

    #[error("verdict is not actionable")]
    NotActionable,

    #[error("no free mission id for message {0}")]
    IdExhausted(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS missions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        mission_id TEXT NOT NULL UNIQUE,
        source_message_id TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL DEFAULT 'NEW'
            CHECK (status IN ('NEW', 'PRINTED', 'COMPLETED', 'CANCELLED')),
        urgency TEXT NOT NULL
            CHECK (urgency IN ('CRITICAL', 'HIGH', 'MEDIUM', 'LOW', 'INFO')),
        summary TEXT NOT NULL,
        action TEXT NOT NULL,
        context TEXT NOT NULL,
        people_involved TEXT NOT NULL,
        deadline TEXT,
        sender TEXT NOT NULL,
        subject TEXT NOT NULL,
        received_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        printed_at TEXT,
        closed_at TEXT,
        raw_verdict TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS missions_status ON missions (status);

    CREATE TABLE IF NOT EXISTS processed_messages (
        message_id TEXT PRIMARY KEY,
        subject TEXT NOT NULL,
        sender TEXT NOT NULL,
        received_at TEXT NOT NULL,
        processed_at TEXT NOT NULL,
        actionable INTEGER NOT NULL DEFAULT 0,
        mission_id TEXT REFERENCES missions (mission_id)
    );

    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
";

/// The mission store.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Opens (or creates) the store at `path`.
    ///
    /// Parent directories are created if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

/// Parses a stored timestamp column.
fn parse_timestamp(column: &str, value: &str) -> Result<jiff::Timestamp> {
    value
        .parse()
        .map_err(|e| StorageError::Corrupt(format!("invalid {column}: {e}")))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn survives_reopen() {
        let (dir, storage) = test_storage();
        let created = storage
            .create_mission(&sample_message("m-1"), &actionable_verdict())
            .unwrap();
        drop(storage);

        let reopened = Storage::open(dir.path().join("mailprint.db")).unwrap();
        let loaded = reopened.load_mission(&created.mission_id).unwrap();
        assert_eq!(loaded, created);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state").join("mailprint.db");
        Storage::open(&path).unwrap();
        assert!(path.exists());
    }
}
