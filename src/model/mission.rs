//! Mission types: the durable record of one actionable message.

use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One actionable message, tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub mission_id: String,
    pub source_message_id: String,
    pub status: MissionStatus,
    pub urgency: Urgency,

    /// Short title of what needs doing.
    pub summary: String,

    /// The concrete next step.
    pub action: String,

    /// One line of background.
    pub context: String,

    pub people_involved: Vec<String>,
    pub deadline: Option<String>,
    pub sender: String,
    pub subject: String,
    pub received_at: Timestamp,
    pub created_at: Timestamp,
    pub printed_at: Option<Timestamp>,

    /// When the mission entered a terminal state.
    pub closed_at: Option<Timestamp>,

    /// The classifier's JSON reply, verbatim.
    pub raw_verdict: String,
}

/// Where a mission stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    New,
    Printed,
    Completed,
    Cancelled,
}

impl MissionStatus {
    pub const ALL: [Self; 4] = [Self::New, Self::Printed, Self::Completed, Self::Cancelled];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Printed => "PRINTED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Completed and cancelled missions never move again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether `self → next` is a legal lifecycle step.
    ///
    /// A mission is printed before it is completed. Cancelling is allowed
    /// from any non-terminal state.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::Printed)
                | (Self::Printed, Self::Completed)
                | (Self::New | Self::Printed, Self::Cancelled)
        )
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown mission status: {s}"))
    }
}

/// How soon a mission needs attention. Assigned once by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Urgency {
    pub const ALL: [Self; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Info => "INFO",
        }
    }

    /// The notice printed at the bottom of a briefing, if any.
    pub fn self_destruct_notice(self) -> Option<&'static str> {
        match self {
            Self::Critical => Some("THIS MESSAGE WILL SELF-DESTRUCT IN FIVE SECONDS"),
            Self::High | Self::Medium => Some("THIS MESSAGE WILL SELF-DESTRUCT"),
            Self::Low | Self::Info => None,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|urgency| urgency.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown urgency: {s}"))
    }
}

/// Candidate mission ids for a source message, shortest first.
///
/// `MI-` plus the first 8 hex digits of the SHA-256 of the message id,
/// then 12, 16, ... up to the full digest. The store takes the first
/// candidate not already used by a different message.
pub fn mission_id_candidates(source_message_id: &str) -> impl Iterator<Item = String> {
    let digest = hex::encode_upper(Sha256::digest(source_message_id.as_bytes()));
    (8..=digest.len())
        .step_by(4)
        .map(move |len| format!("MI-{}", &digest[..len]))
}

/// Normalize a user-supplied mission id for lookup.
pub fn normalize_mission_id(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_legal() {
        assert!(MissionStatus::New.can_transition_to(MissionStatus::Printed));
        assert!(MissionStatus::Printed.can_transition_to(MissionStatus::Completed));
        assert!(MissionStatus::New.can_transition_to(MissionStatus::Cancelled));
        assert!(MissionStatus::Printed.can_transition_to(MissionStatus::Cancelled));
    }

    #[test]
    fn every_other_transition_is_rejected() {
        let legal = [
            (MissionStatus::New, MissionStatus::Printed),
            (MissionStatus::Printed, MissionStatus::Completed),
            (MissionStatus::New, MissionStatus::Cancelled),
            (MissionStatus::Printed, MissionStatus::Cancelled),
        ];
        for from in MissionStatus::ALL {
            for to in MissionStatus::ALL {
                if legal.contains(&(from, to)) {
                    continue;
                }
                assert!(
                    !from.can_transition_to(to),
                    "{from} -> {to} should be rejected"
                );
            }
        }
    }

    #[test]
    fn terminal_states() {
        assert!(MissionStatus::Completed.is_terminal());
        assert!(MissionStatus::Cancelled.is_terminal());
        assert!(!MissionStatus::New.is_terminal());
        assert!(!MissionStatus::Printed.is_terminal());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("high".parse::<Urgency>().unwrap(), Urgency::High);
        assert_eq!(" Critical ".parse::<Urgency>().unwrap(), Urgency::Critical);
        assert_eq!(
            "printed".parse::<MissionStatus>().unwrap(),
            MissionStatus::Printed
        );
        assert!("urgent".parse::<Urgency>().is_err());
    }

    #[test]
    fn mission_ids_are_stable_and_lengthen() {
        let ids: Vec<String> = mission_id_candidates("18c2f0a9b7").take(3).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0].len(), "MI-".len() + 8);
        assert_eq!(ids[1].len(), "MI-".len() + 12);
        assert!(ids[1].starts_with(&ids[0]));

        let again: Vec<String> = mission_id_candidates("18c2f0a9b7").take(3).collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn mission_ids_differ_per_message() {
        let a = mission_id_candidates("message-a").next().unwrap();
        let b = mission_id_candidates("message-b").next().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn normalizes_user_input() {
        assert_eq!(normalize_mission_id(" mi-1a2b3c4d\n"), "MI-1A2B3C4D");
    }

    #[test]
    fn notice_keyed_by_urgency() {
        assert!(Urgency::Critical.self_destruct_notice().is_some());
        assert!(Urgency::Medium.self_destruct_notice().is_some());
        assert!(Urgency::Info.self_destruct_notice().is_none());
    }
}
