//! The classifier's structured answer for one message.

use serde::{Deserialize, Serialize};

use super::Urgency;

/// Whether a message is actionable, and if so, what the mission looks like.
///
/// Non-actionable verdicts carry empty briefing fields and `Urgency::Info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub actionable: bool,
    pub urgency: Urgency,
    pub summary: String,
    pub action: String,
    pub context: String,
    pub people: Vec<String>,
    pub deadline: Option<String>,
    pub confidence: f32,
    pub reasoning: String,

    /// The reply text the verdict was parsed from.
    pub raw: String,
}

impl Verdict {
    /// A verdict for a message that needs no action.
    pub fn not_actionable(reasoning: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            actionable: false,
            urgency: Urgency::Info,
            summary: String::new(),
            action: String::new(),
            context: String::new(),
            people: Vec::new(),
            deadline: None,
            confidence: 0.0,
            reasoning: reasoning.into(),
            raw: raw.into(),
        }
    }
}
