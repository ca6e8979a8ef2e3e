//! The monitor loop: fetch, classify, store, print, advance the checkpoint.
//!
//! Delivery is at-least-once. Each message is recorded as processed on its
//! own, and the checkpoint moves to the cycle start only after a cycle in
//! which every fetched message was handled. Anything left over is listed
//! again next cycle and deduplicated against the processed-message table.

use std::thread;
use std::time::Duration;

use jiff::Timestamp;
use tracing::{debug, error, info, warn};

use crate::classify::{ClassifyError, Classifier};
use crate::config::Config;
use crate::mailbox::{Mailbox, MailboxError};
use crate::model::{Message, MissionStatus};
use crate::printer::Printer;
use crate::storage::{Storage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("{0}\nRe-authorize mailbox access and restart.")]
    AuthExpired(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("giving up after {0} consecutive failed cycles")]
    TooManyFailures(u32),
}

/// Tunables for one monitor.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub max_messages: usize,
    pub lookback_hours: u64,
    pub overlap_minutes: u64,
    pub max_consecutive_failures: u32,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_messages: config.mailbox.max_messages,
            lookback_hours: config.mailbox.lookback_hours,
            overlap_minutes: config.mailbox.overlap_minutes,
            max_consecutive_failures: config.monitor.max_consecutive_failures,
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub missions_created: usize,
    pub ignored: usize,

    /// Messages left unprocessed for a later cycle.
    pub deferred: usize,
    pub printed: usize,
    pub print_failures: usize,
    pub checkpoint_advanced: bool,

    /// Set when the mailbox could not be listed; the cycle stopped early.
    pub mailbox_error: Option<String>,
}

impl CycleReport {
    /// Whether the cycle made no progress for a transient reason.
    pub fn failed(&self) -> bool {
        self.mailbox_error.is_some() || (self.deferred > 0 && self.deferred == self.fetched)
    }
}

enum Outcome {
    Created,
    Existing,
    Ignored,
    Deferred,
}

/// Everything one cycle needs, passed explicitly.
pub struct Monitor<'a, M, C> {
    storage: &'a Storage,
    mailbox: M,
    classifier: C,
    printer: Printer,
    settings: MonitorSettings,
}

impl<'a, M: Mailbox, C: Classifier> Monitor<'a, M, C> {
    pub fn new(
        storage: &'a Storage,
        mailbox: M,
        classifier: C,
        printer: Printer,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            storage,
            mailbox,
            classifier,
            printer,
            settings,
        }
    }

    /// Run cycles every `interval` until a fatal error.
    pub fn run(&mut self, interval: Duration) -> Result<(), MonitorError> {
        info!(
            interval_secs = interval.as_secs(),
            device = self.printer.device().as_deref().unwrap_or("none"),
            "monitor started"
        );
        let mut failures = 0;
        loop {
            let report = self.run_cycle()?;
            if report.failed() {
                failures += 1;
                warn!(failures, "cycle failed");
                if failures >= self.settings.max_consecutive_failures {
                    return Err(MonitorError::TooManyFailures(failures));
                }
            } else {
                failures = 0;
            }
            debug!(?interval, "sleeping until next cycle");
            thread::sleep(interval);
        }
    }

    /// One pass over the mailbox.
    pub fn run_cycle(&mut self) -> Result<CycleReport, MonitorError> {
        let started = Timestamp::now();
        let since = match self.storage.load_checkpoint()? {
            Some(checkpoint) => {
                rewind(checkpoint, self.settings.overlap_minutes.saturating_mul(60))
            }
            None => rewind(started, self.settings.lookback_hours.saturating_mul(3600)),
        };
        debug!(%since, "checking mailbox");

        let mut report = CycleReport::default();
        let storage = self.storage;
        let is_seen = |id: &str| {
            storage.is_processed(id).unwrap_or_else(|e| {
                warn!(message_id = id, error = %e, "failed to check processed state");
                false
            })
        };

        let fetched = match self
            .mailbox
            .fetch_unseen(since, self.settings.max_messages, &is_seen)
        {
            Ok(fetched) => fetched,
            Err(MailboxError::AuthExpired(e)) => return Err(MonitorError::AuthExpired(e)),
            Err(MailboxError::Transient(e)) => {
                warn!(error = %e, "mailbox unavailable, skipping cycle");
                report.mailbox_error = Some(e);
                return Ok(report);
            }
        };

        report.fetched = fetched.messages.len();
        for message in &fetched.messages {
            match self.handle(message) {
                Outcome::Created => report.missions_created += 1,
                Outcome::Existing => {}
                Outcome::Ignored => report.ignored += 1,
                Outcome::Deferred => report.deferred += 1,
            }
        }

        self.print_pending(&mut report);

        // A full batch may have left unseen messages behind the limit.
        let saturated = report.fetched >= self.settings.max_messages;
        if report.deferred == 0 && !fetched.incomplete && !saturated {
            self.storage.save_checkpoint(started)?;
            report.checkpoint_advanced = true;
        } else {
            debug!(
                deferred = report.deferred,
                incomplete = fetched.incomplete,
                saturated,
                "holding checkpoint"
            );
        }

        info!(
            fetched = report.fetched,
            created = report.missions_created,
            ignored = report.ignored,
            printed = report.printed,
            deferred = report.deferred,
            "cycle complete"
        );
        Ok(report)
    }

    fn handle(&mut self, message: &Message) -> Outcome {
        let verdict = match self.classifier.classify(message) {
            Ok(verdict) => verdict,
            Err(ClassifyError::Transient(e)) => {
                warn!(message_id = %message.id, error = %e, "classification deferred");
                return Outcome::Deferred;
            }
            Err(ClassifyError::Malformed(e)) => {
                warn!(
                    message_id = %message.id,
                    error = %e,
                    "unusable classification, skipping message"
                );
                return self.record(message, false, None, Outcome::Ignored);
            }
        };

        if !verdict.actionable {
            debug!(message_id = %message.id, reasoning = %verdict.reasoning, "not actionable");
            return self.record(message, false, None, Outcome::Ignored);
        }

        match self.storage.create_mission(message, &verdict) {
            Ok(mission) => {
                info!(
                    mission_id = %mission.mission_id,
                    urgency = %mission.urgency,
                    summary = %mission.summary,
                    confidence = verdict.confidence,
                    "mission created"
                );
                self.record(message, true, Some(&mission.mission_id), Outcome::Created)
            }
            Err(StorageError::Conflict(existing)) => {
                debug!(mission_id = %existing.mission_id, "message already has a mission");
                self.record(message, true, Some(&existing.mission_id), Outcome::Existing)
            }
            Err(e) => {
                error!(message_id = %message.id, error = %e, "failed to store mission");
                Outcome::Deferred
            }
        }
    }

    fn record(
        &self,
        message: &Message,
        actionable: bool,
        mission_id: Option<&str>,
        outcome: Outcome,
    ) -> Outcome {
        match self.storage.mark_processed(message, actionable, mission_id) {
            Ok(()) => outcome,
            Err(e) => {
                error!(
                    message_id = %message.id,
                    error = %e,
                    "failed to record processed message"
                );
                Outcome::Deferred
            }
        }
    }

    /// Print every mission still NEW, oldest first.
    fn print_pending(&mut self, report: &mut CycleReport) {
        let pending = match self.storage.list_missions(Some(MissionStatus::New), None) {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "failed to list unprinted missions");
                return;
            }
        };

        for mission in pending.iter().rev() {
            match self.printer.render(self.storage, mission) {
                Ok(_) => report.printed += 1,
                Err(e) => {
                    error!(mission_id = %mission.mission_id, error = %e, "failed to print mission");
                    report.print_failures += 1;
                }
            }
        }
    }
}

fn rewind(at: Timestamp, secs: u64) -> Timestamp {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);
    Timestamp::from_second(at.as_second().saturating_sub(secs)).unwrap_or(Timestamp::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::classify::fake::FakeClassifier;
    use crate::mailbox::fake::FakeMailbox;
    use crate::model::Urgency;
    use crate::printer::{FileSink, MemorySink, Sink};
    use crate::storage::test_support::*;

    fn recent_message(id: &str) -> Message {
        Message {
            received_at: Timestamp::from_second(Timestamp::now().as_second() - 600).unwrap(),
            ..sample_message(id)
        }
    }

    fn settings() -> MonitorSettings {
        MonitorSettings {
            max_messages: 20,
            lookback_hours: 24,
            overlap_minutes: 60,
            max_consecutive_failures: 2,
        }
    }

    fn monitor<'a>(
        storage: &'a Storage,
        dir: &tempfile::TempDir,
        mailbox: FakeMailbox,
        classifier: FakeClassifier,
        device: &MemorySink,
    ) -> Monitor<'a, FakeMailbox, FakeClassifier> {
        let printer = Printer::new(
            Some(Box::new(device.clone()) as Box<dyn Sink>),
            FileSink::new(dir.path().join("printed_missions.txt")),
            "Agent",
            32,
        );
        Monitor::new(storage, mailbox, classifier, printer, settings())
    }

    fn classifier_for(id: &str) -> FakeClassifier {
        let mut classifier = FakeClassifier::default();
        classifier
            .verdicts
            .insert(id.to_string(), actionable_verdict());
        classifier
    }

    #[test]
    fn non_actionable_message_creates_no_mission() {
        let (dir, storage) = test_storage();
        let device = MemorySink::default();
        let mailbox = FakeMailbox::with(vec![recent_message("m-1")]);
        let mut monitor = monitor(&storage, &dir, mailbox, FakeClassifier::default(), &device);

        let report = monitor.run_cycle().unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.ignored, 1);
        assert_eq!(report.missions_created, 0);
        assert!(report.checkpoint_advanced);
        assert!(storage.list_missions(None, None).unwrap().is_empty());
        assert!(storage.is_processed("m-1").unwrap());
        assert!(device.printed().is_empty());
    }

    #[test]
    fn actionable_message_is_stored_and_printed() {
        let (dir, storage) = test_storage();
        let device = MemorySink::default();
        let mailbox = FakeMailbox::with(vec![recent_message("m-1")]);
        let mut monitor = monitor(&storage, &dir, mailbox, classifier_for("m-1"), &device);

        let report = monitor.run_cycle().unwrap();
        assert_eq!(report.missions_created, 1);
        assert_eq!(report.printed, 1);

        let missions = storage.list_missions(None, None).unwrap();
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].summary, "Call back John");
        assert_eq!(missions[0].urgency, Urgency::High);
        assert_eq!(missions[0].status, MissionStatus::Printed);

        let printed = device.printed();
        assert_eq!(printed.len(), 1);
        assert!(printed[0].contains("Call back John"));
        assert!(printed[0].contains("URGENCY: HIGH"));
    }

    #[test]
    fn same_message_over_two_cycles_creates_one_mission() {
        let (dir, storage) = test_storage();
        let device = MemorySink::default();
        let mailbox = FakeMailbox::with(vec![recent_message("m-1")]);
        let mut monitor = monitor(&storage, &dir, mailbox, classifier_for("m-1"), &device);

        monitor.run_cycle().unwrap();
        // Rewind so the listing returns the same message again.
        storage.save_checkpoint(Timestamp::UNIX_EPOCH).unwrap();
        let second = monitor.run_cycle().unwrap();

        assert_eq!(second.fetched, 0);
        assert_eq!(storage.list_missions(None, None).unwrap().len(), 1);
        assert_eq!(monitor.classifier.calls, vec!["m-1".to_string()]);
        assert_eq!(device.printed().len(), 1);
    }

    #[test]
    fn replay_after_crash_reuses_existing_mission() {
        let (dir, storage) = test_storage();
        let message = recent_message("m-1");
        // Mission stored, but the process died before recording the message.
        let existing = storage
            .create_mission(&message, &actionable_verdict())
            .unwrap();

        let device = MemorySink::default();
        let mailbox = FakeMailbox::with(vec![message]);
        let mut monitor = monitor(&storage, &dir, mailbox, classifier_for("m-1"), &device);

        let report = monitor.run_cycle().unwrap();
        assert_eq!(report.missions_created, 0);
        assert_eq!(report.printed, 1);

        let missions = storage.list_missions(None, None).unwrap();
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].mission_id, existing.mission_id);
        assert!(storage.is_processed("m-1").unwrap());
    }

    #[test]
    fn transient_classifier_failure_defers_message() {
        let (dir, storage) = test_storage();
        let device = MemorySink::default();
        let mailbox = FakeMailbox::with(vec![recent_message("m-1")]);
        let mut classifier = classifier_for("m-1");
        classifier.failures.insert("m-1".to_string(), || {
            ClassifyError::Transient("quota exceeded".into())
        });
        let mut monitor = monitor(&storage, &dir, mailbox, classifier, &device);

        let report = monitor.run_cycle().unwrap();
        assert_eq!(report.deferred, 1);
        assert!(report.failed());
        assert!(!report.checkpoint_advanced);
        assert!(!storage.is_processed("m-1").unwrap());
        assert_eq!(storage.load_checkpoint().unwrap(), None);

        monitor.classifier.failures.clear();
        let retry = monitor.run_cycle().unwrap();
        assert_eq!(retry.missions_created, 1);
        assert!(retry.checkpoint_advanced);
    }

    #[test]
    fn malformed_reply_is_not_retried() {
        let (dir, storage) = test_storage();
        let device = MemorySink::default();
        let mailbox = FakeMailbox::with(vec![recent_message("m-1")]);
        let mut classifier = FakeClassifier::default();
        classifier.failures.insert("m-1".to_string(), || {
            ClassifyError::Malformed("not json".into())
        });
        let mut monitor = monitor(&storage, &dir, mailbox, classifier, &device);

        let report = monitor.run_cycle().unwrap();
        assert_eq!(report.ignored, 1);
        assert!(report.checkpoint_advanced);
        assert!(storage.is_processed("m-1").unwrap());
        assert_eq!(storage.stats(Timestamp::now()).unwrap().messages_actionable, 0);
    }

    #[test]
    fn expired_credential_is_fatal() {
        let (dir, storage) = test_storage();
        let device = MemorySink::default();
        let mut mailbox = FakeMailbox::with(vec![recent_message("m-1")]);
        mailbox.fail_list = Some(|| MailboxError::AuthExpired("token revoked".into()));
        let mut monitor = monitor(&storage, &dir, mailbox, FakeClassifier::default(), &device);

        let err = monitor.run_cycle().unwrap_err();
        assert!(matches!(err, MonitorError::AuthExpired(_)));
    }

    #[test]
    fn repeated_mailbox_outages_stop_the_loop() {
        let (dir, storage) = test_storage();
        let device = MemorySink::default();
        let mut mailbox = FakeMailbox::with(Vec::new());
        mailbox.fail_list = Some(|| MailboxError::Transient("503".into()));
        let mut monitor = monitor(&storage, &dir, mailbox, FakeClassifier::default(), &device);

        let report = monitor.run_cycle().unwrap();
        assert!(report.mailbox_error.is_some());
        assert!(!report.checkpoint_advanced);

        let err = monitor.run(Duration::ZERO).unwrap_err();
        assert!(matches!(err, MonitorError::TooManyFailures(2)));
    }

    #[test]
    fn incomplete_fetch_holds_checkpoint() {
        let (dir, storage) = test_storage();
        let device = MemorySink::default();
        let mut mailbox = FakeMailbox::with(vec![recent_message("m-1"), recent_message("m-2")]);
        mailbox.fail_fetch.insert("m-2".to_string());
        let mut monitor = monitor(&storage, &dir, mailbox, FakeClassifier::default(), &device);

        let report = monitor.run_cycle().unwrap();
        assert_eq!(report.fetched, 1);
        assert!(!report.checkpoint_advanced);
        assert!(storage.is_processed("m-1").unwrap());
        assert!(!storage.is_processed("m-2").unwrap());
    }

    #[test]
    fn full_batch_holds_checkpoint() {
        let (dir, storage) = test_storage();
        let device = MemorySink::default();
        let messages = (1..=3).map(|i| recent_message(&format!("m-{i}"))).collect();
        let mailbox = FakeMailbox::with(messages);
        let mut monitor = monitor(&storage, &dir, mailbox, FakeClassifier::default(), &device);
        monitor.settings.max_messages = 2;

        let first = monitor.run_cycle().unwrap();
        assert_eq!(first.fetched, 2);
        assert!(!first.checkpoint_advanced);

        let second = monitor.run_cycle().unwrap();
        assert_eq!(second.fetched, 1);
        assert!(second.checkpoint_advanced);
    }

    #[test]
    fn late_indexed_message_is_picked_up_next_cycle() {
        let (dir, storage) = test_storage();
        let device = MemorySink::default();
        let mut mailbox = FakeMailbox::with(vec![recent_message("late")]);
        mailbox.unindexed.insert("late".to_string());
        let mut monitor = monitor(&storage, &dir, mailbox, classifier_for("late"), &device);

        let first = monitor.run_cycle().unwrap();
        assert_eq!(first.fetched, 0);
        assert!(first.checkpoint_advanced);
        let checkpoint = storage.load_checkpoint().unwrap().unwrap();
        assert!(checkpoint > monitor.mailbox.messages[0].received_at);

        monitor.mailbox.unindexed.clear();
        let second = monitor.run_cycle().unwrap();
        assert_eq!(second.fetched, 1);
        assert_eq!(second.missions_created, 1);
        assert!(storage.is_processed("late").unwrap());
    }

    #[test]
    fn truncated_listing_holds_checkpoint() {
        let (dir, storage) = test_storage();
        let now = Timestamp::now().as_second();
        let mut messages = vec![Message {
            received_at: Timestamp::from_second(now - 20 * 3600).unwrap(),
            ..sample_message("stuck")
        }];
        for i in 1..=25 {
            let message = Message {
                received_at: Timestamp::from_second(now - 3600 + i).unwrap(),
                ..sample_message(&format!("done-{i}"))
            };
            storage.mark_processed(&message, false, None).unwrap();
            messages.push(message);
        }

        let device = MemorySink::default();
        let mut mailbox = FakeMailbox::with(messages);
        mailbox.page_size = 1;
        let mut monitor = monitor(&storage, &dir, mailbox, FakeClassifier::default(), &device);

        let report = monitor.run_cycle().unwrap();
        assert_eq!(report.fetched, 0);
        assert!(!report.checkpoint_advanced);
        assert_eq!(storage.load_checkpoint().unwrap(), None);
        assert!(!storage.is_processed("stuck").unwrap());
    }

    #[test]
    fn unprinted_missions_from_earlier_cycles_are_printed() {
        let (dir, storage) = test_storage();
        storage
            .create_mission(&sample_message("old"), &actionable_verdict())
            .unwrap();

        let device = MemorySink::default();
        let mailbox = FakeMailbox::with(Vec::new());
        let mut monitor = monitor(&storage, &dir, mailbox, FakeClassifier::default(), &device);

        let report = monitor.run_cycle().unwrap();
        assert_eq!(report.printed, 1);
        assert_eq!(device.printed().len(), 1);
        assert!(storage
            .list_missions(Some(MissionStatus::New), None)
            .unwrap()
            .is_empty());
    }
}
