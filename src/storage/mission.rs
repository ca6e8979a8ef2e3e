//! Mission storage: create, load, list, and move missions through their lifecycle.

use jiff::Timestamp;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::model::{Message, Mission, MissionStatus, Verdict, mission_id_candidates};

use super::{Result, Storage, StorageError, parse_timestamp};

const MISSION_COLUMNS: &str = "mission_id, source_message_id, status, urgency, summary, action,
     context, people_involved, deadline, sender, subject, received_at, created_at,
     printed_at, closed_at, raw_verdict";

impl Storage {
    /// Creates a mission for an actionable message.
    ///
    /// Fails with [`StorageError::Conflict`] carrying the existing record when
    /// the message already has a mission, and with
    /// [`StorageError::NotActionable`] when the verdict says there is nothing to do.
    pub fn create_mission(&self, message: &Message, verdict: &Verdict) -> Result<Mission> {
        if !verdict.actionable {
            return Err(StorageError::NotActionable);
        }

        let tx = self.conn.unchecked_transaction()?;

        if let Some(existing) = find_by_source(&tx, &message.id)? {
            return Err(StorageError::Conflict(Box::new(existing)));
        }

        let mission_id = free_mission_id(&tx, &message.id)?;
        let mission = Mission {
            mission_id,
            source_message_id: message.id.clone(),
            status: MissionStatus::New,
            urgency: verdict.urgency,
            summary: verdict.summary.clone(),
            action: verdict.action.clone(),
            context: verdict.context.clone(),
            people_involved: verdict.people.clone(),
            deadline: verdict.deadline.clone(),
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            received_at: message.received_at,
            created_at: Timestamp::now(),
            printed_at: None,
            closed_at: None,
            raw_verdict: verdict.raw.clone(),
        };

        tx.execute(
            "INSERT INTO missions (mission_id, source_message_id, status, urgency, summary,
                 action, context, people_involved, deadline, sender, subject, received_at,
                 created_at, printed_at, closed_at, raw_verdict)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL, NULL, ?14)",
            params![
                &mission.mission_id,
                &mission.source_message_id,
                mission.status.as_str(),
                mission.urgency.as_str(),
                &mission.summary,
                &mission.action,
                &mission.context,
                serde_json::to_string(&mission.people_involved)?,
                &mission.deadline,
                &mission.sender,
                &mission.subject,
                mission.received_at.to_string(),
                mission.created_at.to_string(),
                &mission.raw_verdict,
            ],
        )?;
        tx.commit()?;

        Ok(mission)
    }

    /// Loads a single mission by id.
    pub fn load_mission(&self, mission_id: &str) -> Result<Mission> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {MISSION_COLUMNS} FROM missions WHERE mission_id = ?1"),
                [mission_id],
                MissionRow::read,
            )
            .optional()?;
        match row {
            Some(row) => row.into_mission(),
            None => Err(StorageError::MissionNotFound(mission_id.to_string())),
        }
    }

    /// Lists missions, newest first, optionally filtered by status.
    pub fn list_missions(
        &self,
        status: Option<MissionStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<Mission>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let status = status.map(MissionStatus::as_str);

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MISSION_COLUMNS} FROM missions
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY id DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![status, limit], MissionRow::read)?;

        let mut missions = Vec::new();
        for row in rows {
            missions.push(row?.into_mission()?);
        }
        Ok(missions)
    }

    /// Moves a mission to `to`, enforcing the lifecycle rule.
    ///
    /// Entering a terminal state records `closed_at`.
    pub fn update_status(&self, mission_id: &str, to: MissionStatus) -> Result<Mission> {
        let mission = self.load_mission(mission_id)?;
        if !mission.status.can_transition_to(to) {
            return Err(StorageError::InvalidTransition {
                mission_id: mission.mission_id,
                from: mission.status,
                to,
            });
        }

        let closed_at = to.is_terminal().then(|| Timestamp::now().to_string());
        self.conn.execute(
            "UPDATE missions SET status = ?1, closed_at = COALESCE(?2, closed_at)
             WHERE mission_id = ?3 AND status = ?4",
            params![to.as_str(), closed_at, mission_id, mission.status.as_str()],
        )?;
        self.load_mission(mission_id)
    }

    /// Records a successful print.
    ///
    /// NEW becomes PRINTED; other statuses are left alone. `printed_at` keeps
    /// the first print time.
    pub fn mark_printed(&self, mission_id: &str, at: Timestamp) -> Result<Mission> {
        let rows = self.conn.execute(
            "UPDATE missions
             SET printed_at = COALESCE(printed_at, ?1),
                 status = CASE WHEN status = 'NEW' THEN 'PRINTED' ELSE status END
             WHERE mission_id = ?2",
            params![at.to_string(), mission_id],
        )?;
        if rows == 0 {
            return Err(StorageError::MissionNotFound(mission_id.to_string()));
        }
        self.load_mission(mission_id)
    }
}

fn find_by_source(conn: &Connection, source_message_id: &str) -> Result<Option<Mission>> {
    conn.query_row(
        &format!("SELECT {MISSION_COLUMNS} FROM missions WHERE source_message_id = ?1"),
        [source_message_id],
        MissionRow::read,
    )
    .optional()?
    .map(MissionRow::into_mission)
    .transpose()
}

/// The shortest candidate id not already taken.
fn free_mission_id(conn: &Connection, source_message_id: &str) -> Result<String> {
    for candidate in mission_id_candidates(source_message_id) {
        let taken: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM missions WHERE mission_id = ?1)",
            [&candidate],
            |row| row.get(0),
        )?;
        if !taken {
            return Ok(candidate);
        }
    }
    Err(StorageError::IdExhausted(source_message_id.to_string()))
}

/// Raw column values for one mission row.
struct MissionRow {
    mission_id: String,
    source_message_id: String,
    status: String,
    urgency: String,
    summary: String,
    action: String,
    context: String,
    people_involved: String,
    deadline: Option<String>,
    sender: String,
    subject: String,
    received_at: String,
    created_at: String,
    printed_at: Option<String>,
    closed_at: Option<String>,
    raw_verdict: String,
}

impl MissionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            mission_id: row.get(0)?,
            source_message_id: row.get(1)?,
            status: row.get(2)?,
            urgency: row.get(3)?,
            summary: row.get(4)?,
            action: row.get(5)?,
            context: row.get(6)?,
            people_involved: row.get(7)?,
            deadline: row.get(8)?,
            sender: row.get(9)?,
            subject: row.get(10)?,
            received_at: row.get(11)?,
            created_at: row.get(12)?,
            printed_at: row.get(13)?,
            closed_at: row.get(14)?,
            raw_verdict: row.get(15)?,
        })
    }

    fn into_mission(self) -> Result<Mission> {
        let status = self.status.parse().map_err(StorageError::Corrupt)?;
        let urgency = self.urgency.parse().map_err(StorageError::Corrupt)?;
        let people_involved = serde_json::from_str(&self.people_involved)
            .map_err(|e| StorageError::Corrupt(format!("invalid people_involved: {e}")))?;

        Ok(Mission {
            mission_id: self.mission_id,
            source_message_id: self.source_message_id,
            status,
            urgency,
            summary: self.summary,
            action: self.action,
            context: self.context,
            people_involved,
            deadline: self.deadline,
            sender: self.sender,
            subject: self.subject,
            received_at: parse_timestamp("received_at", &self.received_at)?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            printed_at: self
                .printed_at
                .as_deref()
                .map(|s| parse_timestamp("printed_at", s))
                .transpose()?,
            closed_at: self
                .closed_at
                .as_deref()
                .map(|s| parse_timestamp("closed_at", s))
                .transpose()?,
            raw_verdict: self.raw_verdict,
        })
    }
}
