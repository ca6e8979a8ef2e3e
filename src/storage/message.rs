//! Processed-message storage: which mailbox messages a cycle has already handled.

use jiff::Timestamp;
use rusqlite::params;

use crate::model::Message;

use super::{Result, Storage};

impl Storage {
    /// Records that `message` was handled, and whether it produced a mission.
    ///
    /// Recording the same message again overwrites the earlier row.
    pub fn mark_processed(
        &self,
        message: &Message,
        actionable: bool,
        mission_id: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO processed_messages
                 (message_id, subject, sender, received_at, processed_at, actionable, mission_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &message.id,
                &message.subject,
                &message.sender,
                message.received_at.to_string(),
                Timestamp::now().to_string(),
                actionable,
                mission_id,
            ],
        )?;
        Ok(())
    }

    /// Whether a message has already been handled by some cycle.
    pub fn is_processed(&self, message_id: &str) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM processed_messages WHERE message_id = ?1)",
            [message_id],
            |row| row.get(0),
        )?)
    }
}
