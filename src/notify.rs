//! Best-effort webhook fired before each mission print.
//!
//! Lets something else in the room (lights, a sound board) react to a
//! mission arriving. Failures are logged and never reach the caller.

use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::{debug, warn};

const TIMEOUT: Duration = Duration::from_secs(2);
const ATTEMPTS: usize = 2;

#[derive(Debug, Serialize)]
struct PrintEvent<'a> {
    event: &'static str,
    source: &'static str,
    mission_id: &'a str,
}

pub struct Notifier {
    client: Client,
    url: String,
    cooldown: Duration,
    last_sent: Option<Instant>,
}

impl Notifier {
    pub fn new(url: &str, cooldown: Duration) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            url: url.to_string(),
            cooldown,
            last_sent: None,
        })
    }

    /// Announce that `mission_id` is about to print.
    pub fn mission_print(&mut self, mission_id: &str) {
        let now = Instant::now();
        if !self.ready(now) {
            debug!(mission_id, "webhook suppressed by cooldown");
            return;
        }
        self.last_sent = Some(now);

        let event = PrintEvent {
            event: "mission_print",
            source: "mailprint",
            mission_id,
        };
        for attempt in 1..=ATTEMPTS {
            match self.client.post(&self.url).json(&event).send() {
                Ok(response) if response.status().is_success() => {
                    debug!(mission_id, "webhook delivered");
                    return;
                }
                Ok(response) => {
                    warn!(mission_id, attempt, status = %response.status(), "webhook rejected");
                }
                Err(e) => warn!(mission_id, attempt, error = %e, "webhook failed"),
            }
        }
    }

    fn ready(&self, now: Instant) -> bool {
        self.last_sent
            .is_none_or(|last| now.duration_since(last) >= self.cooldown)
    }
}
