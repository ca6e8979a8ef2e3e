//! Aggregate counts for the `status` command.

use jiff::Timestamp;
use serde::Serialize;

use crate::model::{MissionStatus, Urgency};

use super::{Result, Storage, StorageError, parse_timestamp};

const DAY_SECONDS: i64 = 24 * 60 * 60;

/// A snapshot of what the store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Mission counts per status, in lifecycle order. Zero counts omitted.
    pub by_status: Vec<(MissionStatus, u64)>,

    /// Mission counts per urgency, most urgent first. Zero counts omitted.
    pub by_urgency: Vec<(Urgency, u64)>,

    /// Missions created in the 24 hours before `now`.
    pub missions_last_24h: u64,

    pub messages_processed: u64,

    /// Processed messages that produced a mission.
    pub messages_actionable: u64,
}

impl Storage {
    /// Computes store statistics relative to `now`.
    pub fn stats(&self, now: Timestamp) -> Result<Stats> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, urgency, created_at FROM missions")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut stats = Stats::default();
        let mut status_counts = [0u64; MissionStatus::ALL.len()];
        let mut urgency_counts = [0u64; Urgency::ALL.len()];
        let cutoff = now.as_second() - DAY_SECONDS;

        for row in rows {
            let (status, urgency, created_at) = row?;
            let status: MissionStatus = status.parse().map_err(StorageError::Corrupt)?;
            let urgency: Urgency = urgency.parse().map_err(StorageError::Corrupt)?;
            let created_at = parse_timestamp("created_at", &created_at)?;

            if let Some(i) = MissionStatus::ALL.iter().position(|s| *s == status) {
                status_counts[i] += 1;
            }
            if let Some(i) = Urgency::ALL.iter().position(|u| *u == urgency) {
                urgency_counts[i] += 1;
            }
            if created_at.as_second() > cutoff {
                stats.missions_last_24h += 1;
            }
        }

        stats.by_status = MissionStatus::ALL
            .into_iter()
            .zip(status_counts)
            .filter(|(_, n)| *n > 0)
            .collect();
        stats.by_urgency = Urgency::ALL
            .into_iter()
            .zip(urgency_counts)
            .filter(|(_, n)| *n > 0)
            .collect();

        let (processed, actionable): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(actionable), 0) FROM processed_messages",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.messages_processed = processed.unsigned_abs();
        stats.messages_actionable = actionable.unsigned_abs();

        Ok(stats)
    }
}
