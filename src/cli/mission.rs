//! Mission commands: list, show, complete, cancel, print.

use jiff::tz::TimeZone;

use crate::config::Config;
use crate::model::{Mission, MissionStatus, normalize_mission_id};
use crate::printer::Printer;
use crate::storage::{Storage, StorageError};

use super::format::{format_mission_detail, format_mission_line};

pub(super) fn cmd_list(
    storage: &Storage,
    status: Option<MissionStatus>,
    limit: usize,
    json: bool,
) -> Result<(), String> {
    println!("{}", list_output(storage, status, limit, json, &TimeZone::system())?);
    Ok(())
}

fn list_output(
    storage: &Storage,
    status: Option<MissionStatus>,
    limit: usize,
    json: bool,
    tz: &TimeZone,
) -> Result<String, String> {
    let missions = storage
        .list_missions(status, Some(limit))
        .map_err(|e| format!("failed to list missions: {e}"))?;

    if json {
        return serde_json::to_string_pretty(&missions)
            .map_err(|e| format!("failed to serialize missions: {e}"));
    }
    if missions.is_empty() {
        return Ok("No missions".to_string());
    }
    Ok(missions
        .iter()
        .map(|m| format_mission_line(m, tz))
        .collect::<Vec<_>>()
        .join("\n"))
}

pub(super) fn cmd_show(storage: &Storage, id: &str, json: bool) -> Result<(), String> {
    let mission = resolve_mission(storage, id)?;
    if json {
        let json = serde_json::to_string_pretty(&mission)
            .map_err(|e| format!("failed to serialize mission: {e}"))?;
        println!("{json}");
    } else {
        println!("{}", format_mission_detail(&mission, &TimeZone::system()));
    }
    Ok(())
}

pub(super) fn cmd_transition(
    storage: &Storage,
    id: &str,
    to: MissionStatus,
) -> Result<(), String> {
    let mission = transition(storage, id, to)?;
    println!("{} is now {}", mission.mission_id, mission.status);
    Ok(())
}

fn transition(storage: &Storage, id: &str, to: MissionStatus) -> Result<Mission, String> {
    storage
        .update_status(&normalize_mission_id(id), to)
        .map_err(describe)
}

pub(super) fn cmd_print(config: &Config, storage: &Storage, id: &str) -> Result<(), String> {
    let mission = resolve_mission(storage, id)?;
    let mut printer = Printer::from_config(config);
    let result = printer
        .render(storage, &mission)
        .map_err(|e| format!("failed to print {}: {e}", mission.mission_id))?;
    println!("Printed {} to {}", mission.mission_id, result.delivered_to);
    Ok(())
}

fn resolve_mission(storage: &Storage, id: &str) -> Result<Mission, String> {
    storage
        .load_mission(&normalize_mission_id(id))
        .map_err(describe)
}

fn describe(e: StorageError) -> String {
    match e {
        StorageError::MissionNotFound(id) => format!("no mission '{id}'"),
        other => other.to_string(),
    }
}
