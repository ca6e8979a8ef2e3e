//! Mailbox messages as the pipeline sees them.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A single mailbox message, reduced to what the classifier needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Stable mailbox identifier.
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub received_at: Timestamp,
}
