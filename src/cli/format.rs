//! Output formatting for CLI display.

use std::fmt::Write;
use std::time::Duration;

use jiff::Timestamp;
use jiff::tz::TimeZone;

use crate::model::Mission;
use crate::monitor::CycleReport;
use crate::storage::Stats;

pub(super) fn format_time(at: Timestamp, tz: &TimeZone) -> String {
    at.to_zoned(tz.clone()).strftime("%Y-%m-%d %H:%M").to_string()
}

/// One line per mission for `list`.
pub(super) fn format_mission_line(mission: &Mission, tz: &TimeZone) -> String {
    format!(
        "{}  {:<9}  {:<8}  {}  {}",
        mission.mission_id,
        mission.status,
        mission.urgency,
        format_time(mission.created_at, tz),
        mission.summary
    )
}

/// Full detail for `show`.
pub(super) fn format_mission_detail(mission: &Mission, tz: &TimeZone) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Mission:   {}", mission.mission_id);
    let _ = writeln!(out, "Status:    {}", mission.status);
    let _ = writeln!(out, "Urgency:   {}", mission.urgency);
    let _ = writeln!(out, "Summary:   {}", mission.summary);
    if !mission.action.is_empty() {
        let _ = writeln!(out, "Action:    {}", mission.action);
    }
    if !mission.context.is_empty() {
        let _ = writeln!(out, "Context:   {}", mission.context);
    }
    if !mission.people_involved.is_empty() {
        let _ = writeln!(out, "People:    {}", mission.people_involved.join(", "));
    }
    let _ = writeln!(
        out,
        "Deadline:  {}",
        mission.deadline.as_deref().unwrap_or("none")
    );
    let _ = writeln!(out, "From:      {}", mission.sender);
    let _ = writeln!(out, "Subject:   {}", mission.subject);
    let _ = writeln!(out, "Received:  {}", format_time(mission.received_at, tz));
    let _ = writeln!(out, "Created:   {}", format_time(mission.created_at, tz));
    if let Some(at) = mission.printed_at {
        let _ = writeln!(out, "Printed:   {}", format_time(at, tz));
    }
    if let Some(at) = mission.closed_at {
        let _ = writeln!(out, "Closed:    {}", format_time(at, tz));
    }
    out.truncate(out.trim_end().len());
    out
}

/// What `status` reports about the running setup.
pub(super) struct StatusView<'a> {
    pub last_check: Option<Timestamp>,
    pub interval: Duration,
    pub device: Option<String>,
    pub fallback: String,
    pub stats: &'a Stats,
}

pub(super) fn format_status(view: &StatusView<'_>, tz: &TimeZone) -> String {
    let mut out = String::new();
    let last_check = view
        .last_check
        .map_or_else(|| "never".to_string(), |at| format_time(at, tz));
    let _ = writeln!(out, "Last check:  {last_check}");
    let _ = writeln!(out, "Interval:    {} min", view.interval.as_secs() / 60);
    let _ = writeln!(
        out,
        "Printer:     {}",
        view.device.as_deref().unwrap_or("none (fallback log only)")
    );
    let _ = writeln!(out, "Fallback:    {}", view.fallback);
    let _ = writeln!(out);

    let stats = view.stats;
    let _ = writeln!(
        out,
        "Messages processed:  {} ({} actionable)",
        stats.messages_processed, stats.messages_actionable
    );
    let _ = writeln!(out, "Missions (24h):      {}", stats.missions_last_24h);
    if !stats.by_status.is_empty() {
        let _ = writeln!(out, "By status:           {}", join_counts(&stats.by_status));
    }
    if !stats.by_urgency.is_empty() {
        let _ = writeln!(out, "By urgency:          {}", join_counts(&stats.by_urgency));
    }
    out.truncate(out.trim_end().len());
    out
}

/// One-line summary of a `check` cycle.
pub(super) fn format_cycle_report(report: &CycleReport) -> String {
    if let Some(error) = &report.mailbox_error {
        return format!("Mailbox unavailable: {error}");
    }
    let mut line = format!(
        "Checked {} new message(s): {} mission(s) created, {} printed",
        report.fetched, report.missions_created, report.printed
    );
    if report.deferred > 0 {
        let _ = write!(line, ", {} deferred", report.deferred);
    }
    if report.print_failures > 0 {
        let _ = write!(line, ", {} print failure(s)", report.print_failures);
    }
    line
}

fn join_counts<T: std::fmt::Display>(counts: &[(T, u64)]) -> String {
    counts
        .iter()
        .map(|(key, n)| format!("{key} {n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{MissionStatus, Urgency};
    use crate::storage::test_support::*;

    #[test]
    fn detail_shows_stored_fields() {
        let (_dir, storage) = test_storage();
        let created = storage
            .create_mission(&sample_message("m-1"), &actionable_verdict())
            .unwrap();
        let mission = storage.load_mission(&created.mission_id).unwrap();

        let detail = format_mission_detail(&mission, &TimeZone::UTC);
        assert!(detail.starts_with(&format!("Mission:   {}", mission.mission_id)));
        assert!(detail.contains("Status:    NEW"));
        assert!(detail.contains("Urgency:   HIGH"));
        assert!(detail.contains("Summary:   Call back John"));
        assert!(detail.contains("Deadline:  EOD"));
        assert!(detail.contains("People:    John Smith"));
        assert!(detail.contains("Received:  2025-10-09 08:53"));
        assert!(!detail.contains("Printed:"));
    }

    #[test]
    fn mission_line_is_columnar() {
        let (_dir, storage) = test_storage();
        let mut mission = storage
            .create_mission(&sample_message("m-1"), &actionable_verdict())
            .unwrap();
        mission.created_at = Timestamp::from_second(1_760_000_000).unwrap();

        assert_eq!(
            format_mission_line(&mission, &TimeZone::UTC),
            format!(
                "{}  NEW        HIGH      2025-10-09 08:53  Call back John",
                mission.mission_id
            )
        );
    }

    #[test]
    fn status_lists_counts() {
        let stats = Stats {
            by_status: vec![(MissionStatus::New, 2), (MissionStatus::Completed, 1)],
            by_urgency: vec![(Urgency::High, 3)],
            missions_last_24h: 2,
            messages_processed: 10,
            messages_actionable: 3,
        };
        let view = StatusView {
            last_check: None,
            interval: Duration::from_secs(300),
            device: None,
            fallback: "/tmp/printed_missions.txt".into(),
            stats: &stats,
        };

        let text = format_status(&view, &TimeZone::UTC);
        assert!(text.contains("Last check:  never"));
        assert!(text.contains("Interval:    5 min"));
        assert!(text.contains("none (fallback log only)"));
        assert!(text.contains("Messages processed:  10 (3 actionable)"));
        assert!(text.contains("By status:           NEW 2, COMPLETED 1"));
        assert!(text.contains("By urgency:          HIGH 3"));
    }

    #[test]
    fn cycle_report_summary() {
        let report = CycleReport {
            fetched: 3,
            missions_created: 1,
            printed: 1,
            deferred: 1,
            ..CycleReport::default()
        };
        assert_eq!(
            format_cycle_report(&report),
            "Checked 3 new message(s): 1 mission(s) created, 1 printed, 1 deferred"
        );

        let failed = CycleReport {
            mailbox_error: Some("timeout".into()),
            ..CycleReport::default()
        };
        assert_eq!(format_cycle_report(&failed), "Mailbox unavailable: timeout");
    }
}
