//! Checkpoint storage: the mailbox position the last complete cycle reached.

use jiff::Timestamp;
use rusqlite::{OptionalExtension, params};

use super::{Result, Storage, parse_timestamp};

const CHECKPOINT_KEY: &str = "last_check";

impl Storage {
    /// Loads the checkpoint. `None` before the first complete cycle.
    pub fn load_checkpoint(&self) -> Result<Option<Timestamp>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                [CHECKPOINT_KEY],
                |row| row.get(0),
            )
            .optional()?;
        value
            .as_deref()
            .map(|v| parse_timestamp(CHECKPOINT_KEY, v))
            .transpose()
    }

    /// Saves the checkpoint, replacing any earlier one.
    pub fn save_checkpoint(&self, at: Timestamp) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![CHECKPOINT_KEY, at.to_string(), Timestamp::now().to_string()],
        )?;
        Ok(())
    }
}
