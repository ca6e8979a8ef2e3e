//! Monitor commands: status, check, monitor, test-printer.

use std::time::Duration;

use jiff::Timestamp;
use jiff::tz::TimeZone;

use crate::classify::GeminiClassifier;
use crate::config::Config;
use crate::mailbox::GmailMailbox;
use crate::monitor::{CycleReport, Monitor, MonitorSettings};
use crate::printer::Printer;
use crate::storage::Storage;

use super::format::{StatusView, format_cycle_report, format_status};

pub(super) fn cmd_status(config: &Config, storage: &Storage) -> Result<(), String> {
    let last_check = storage
        .load_checkpoint()
        .map_err(|e| format!("failed to read checkpoint: {e}"))?;
    let stats = storage
        .stats(Timestamp::now())
        .map_err(|e| format!("failed to compute statistics: {e}"))?;
    let printer = Printer::from_config(config);

    let view = StatusView {
        last_check,
        interval: config.interval(),
        device: printer.device(),
        fallback: printer.fallback(),
        stats: &stats,
    };
    println!("{}", format_status(&view, &TimeZone::system()));
    Ok(())
}

pub(super) fn cmd_check(config: &Config, storage: &Storage) -> Result<(), String> {
    let mut monitor = build_monitor(config, storage)?;
    let report = monitor.run_cycle().map_err(|e| e.to_string())?;
    println!("{}", check_summary(&report)?);
    Ok(())
}

/// A cycle that could not reach the mailbox did nothing, so it fails.
fn check_summary(report: &CycleReport) -> Result<String, String> {
    let summary = format_cycle_report(report);
    if report.mailbox_error.is_some() {
        Err(summary)
    } else {
        Ok(summary)
    }
}

pub(super) fn cmd_monitor(
    config: &Config,
    storage: &Storage,
    interval_minutes: Option<u64>,
) -> Result<(), String> {
    let minutes = interval_minutes.unwrap_or(config.monitor.interval_minutes);
    if minutes == 0 {
        return Err("--interval must be at least 1 minute".to_string());
    }
    let mut monitor = build_monitor(config, storage)?;
    monitor
        .run(Duration::from_secs(minutes * 60))
        .map_err(|e| e.to_string())
}

pub(super) fn cmd_test_printer(config: &Config) -> Result<(), String> {
    let mut printer = Printer::from_config(config);
    let result = printer
        .print_sample()
        .map_err(|e| format!("test print failed: {e}"))?;
    println!("{}", result.text);
    println!();
    println!("Sent to {}", result.delivered_to);
    Ok(())
}

/// Wire the Gmail mailbox, Gemini classifier and printer from config.
///
/// Fails up front on a missing token file or API key.
fn build_monitor<'a>(
    config: &Config,
    storage: &'a Storage,
) -> Result<Monitor<'a, GmailMailbox, GeminiClassifier>, String> {
    let mailbox = GmailMailbox::new(
        &config.token_path(),
        Duration::from_secs(config.mailbox.timeout_secs),
        config.classifier.max_body_chars,
    )?;
    let classifier = GeminiClassifier::new(
        &config.classifier.endpoint,
        &config.classifier.model,
        config.api_key()?,
        Duration::from_secs(config.classifier.timeout_secs),
    )?;

    Ok(Monitor::new(
        storage,
        mailbox,
        classifier,
        Printer::from_config(config),
        MonitorSettings::from_config(config),
    ))
}
