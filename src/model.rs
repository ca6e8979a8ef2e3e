//! Core data model for mailprint.
//!
//! Messages come in from the mailbox, the classifier turns each into a
//! verdict, and actionable verdicts become missions.

mod message;
mod mission;
mod verdict;

pub use message::Message;
pub use mission::{Mission, MissionStatus, Urgency, mission_id_candidates, normalize_mission_id};
pub use verdict::Verdict;
