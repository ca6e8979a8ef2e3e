//! Mission printing: physical device first, fallback log file second.

mod briefing;
mod sink;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use jiff::{Timestamp, Zoned};
use tracing::{info, warn};

use crate::config::Config;
use crate::model::{Mission, MissionStatus, Urgency};
use crate::notify::Notifier;
use crate::storage::{Storage, StorageError};

use briefing::format_briefing;
pub use sink::{DeviceSink, FileSink, Sink};

#[cfg(test)]
pub(crate) use sink::memory::MemorySink;

#[derive(Debug, thiserror::Error)]
pub enum PrinterError {
    /// Neither the device nor the fallback file accepted the ticket.
    #[error("failed to write fallback log {path}: {source}")]
    Fallback { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = core::result::Result<T, PrinterError>;

/// Where a ticket ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Physical,
    File,
}

impl std::fmt::Display for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Physical => "printer",
            Self::File => "fallback log",
        })
    }
}

#[derive(Debug, Clone)]
pub struct RenderResult {
    pub delivered_to: Delivery,
    pub text: String,
}

pub struct Printer {
    device: Option<Box<dyn Sink>>,
    fallback: FileSink,
    agent: String,
    width: usize,
    busy_retries: u32,
    busy_delay: Duration,
    notifier: Option<Notifier>,

    /// Delivered tickets whose mission could not be marked printed yet.
    unrecorded: HashMap<String, RenderResult>,
}

impl Printer {
    pub fn new(
        device: Option<Box<dyn Sink>>,
        fallback: FileSink,
        agent: &str,
        width: usize,
    ) -> Self {
        Self {
            device,
            fallback,
            agent: agent.to_string(),
            width,
            busy_retries: 0,
            busy_delay: Duration::ZERO,
            notifier: None,
            unrecorded: HashMap::new(),
        }
    }

    /// Build from config: device path wins over network address.
    pub fn from_config(config: &Config) -> Self {
        let settings = &config.printer;
        let device: Option<Box<dyn Sink>> = match (&settings.device, &settings.network) {
            (Some(path), _) => Some(Box::new(DeviceSink::Device(config.resolve(path)))),
            (None, Some(addr)) => Some(Box::new(DeviceSink::Network(addr.clone()))),
            (None, None) => None,
        };

        let notifier = settings.webhook_url.as_deref().and_then(|url| {
            Notifier::new(url, Duration::from_secs(settings.webhook_cooldown_secs))
                .inspect_err(|e| warn!(error = %e, "print webhook disabled"))
                .ok()
        });

        let mut printer = Self::new(
            device,
            FileSink::new(config.fallback_path()),
            &config.agent_name,
            settings.width,
        )
        .with_busy_retry(
            settings.busy_retries,
            Duration::from_secs(settings.busy_delay_secs),
        );
        printer.notifier = notifier;
        printer
    }

    pub fn with_busy_retry(mut self, retries: u32, delay: Duration) -> Self {
        self.busy_retries = retries;
        self.busy_delay = delay;
        self
    }

    /// The physical target, or `None` when only the fallback log is configured.
    pub fn device(&self) -> Option<String> {
        self.device.as_ref().map(|d| d.describe())
    }

    pub fn fallback(&self) -> String {
        self.fallback.describe()
    }

    /// Print a mission and record it as printed.
    ///
    /// NEW missions become PRINTED; any other status is left alone, so this
    /// also serves reprints. If the ticket went out but the store write
    /// failed, the next call for the same mission only retries the write.
    pub fn render(&mut self, storage: &Storage, mission: &Mission) -> Result<RenderResult> {
        if let Some(result) = self.unrecorded.remove(&mission.mission_id) {
            if let Err(e) = storage.mark_printed(&mission.mission_id, Timestamp::now()) {
                self.unrecorded.insert(mission.mission_id.clone(), result);
                return Err(e.into());
            }
            info!(mission_id = %mission.mission_id, "recorded earlier print");
            return Ok(result);
        }

        if let Some(notifier) = &mut self.notifier {
            notifier.mission_print(&mission.mission_id);
        }

        let text = format_briefing(mission, &self.agent, self.width, &Zoned::now());
        let delivered_to = self.deliver(&text)?;
        if let Err(e) = storage.mark_printed(&mission.mission_id, Timestamp::now()) {
            warn!(
                mission_id = %mission.mission_id,
                error = %e,
                "printed but could not record it"
            );
            self.unrecorded.insert(
                mission.mission_id.clone(),
                RenderResult { delivered_to, text },
            );
            return Err(e.into());
        }

        info!(
            mission_id = %mission.mission_id,
            urgency = %mission.urgency,
            delivered_to = %delivered_to,
            "mission printed"
        );
        Ok(RenderResult { delivered_to, text })
    }

    /// Print a sample briefing without touching the store.
    pub fn print_sample(&mut self) -> Result<RenderResult> {
        let now = Zoned::now();
        let text = format_briefing(&sample_mission(now.timestamp()), &self.agent, self.width, &now);
        let delivered_to = self.deliver(&text)?;
        Ok(RenderResult { delivered_to, text })
    }

    fn deliver(&mut self, text: &str) -> Result<Delivery> {
        if let Some(device) = &mut self.device {
            let mut attempt = 0;
            loop {
                match device.write_ticket(text) {
                    Ok(()) => return Ok(Delivery::Physical),
                    Err(e)
                        if e.kind() == io::ErrorKind::ResourceBusy
                            && attempt < self.busy_retries =>
                    {
                        attempt += 1;
                        warn!(
                            device = %device.describe(),
                            attempt,
                            "printer busy, retrying"
                        );
                        thread::sleep(self.busy_delay);
                    }
                    Err(e) => {
                        warn!(
                            device = %device.describe(),
                            error = %e,
                            "printer unavailable, using fallback log"
                        );
                        break;
                    }
                }
            }
        }

        self.fallback
            .write_ticket(text)
            .map_err(|source| PrinterError::Fallback {
                path: self.fallback.path().to_path_buf(),
                source,
            })?;
        Ok(Delivery::File)
    }
}

fn sample_mission(now: Timestamp) -> Mission {
    Mission {
        mission_id: "MI-00000000".to_string(),
        source_message_id: "printer-test".to_string(),
        status: MissionStatus::New,
        urgency: Urgency::Medium,
        summary: "Printer test".to_string(),
        action: "Confirm this briefing printed cleanly and the paper was cut.".to_string(),
        context: String::new(),
        people_involved: vec!["Mission Control".to_string()],
        deadline: None,
        sender: "mailprint".to_string(),
        subject: "Printer test".to_string(),
        received_at: now,
        created_at: now,
        printed_at: None,
        closed_at: None,
        raw_verdict: String::new(),
    }
}
