//! Mailbox access: list and fetch messages newer than a checkpoint.
//!
//! The [`Mailbox`] trait is the seam between the monitor and a concrete
//! mail provider. Implementations only list and fetch; paging, skipping
//! already-handled messages, and ordering live in [`Mailbox::fetch_unseen`].

mod gmail;

use jiff::Timestamp;
use tracing::{debug, warn};

use crate::model::Message;

pub use gmail::GmailMailbox;

/// Safety valve on paging through one listing.
const MAX_PAGES: usize = 20;

/// Errors from the mailbox provider.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// Network failure, timeout, rate limit or server error. Retried next cycle.
    #[error("mailbox unavailable: {0}")]
    Transient(String),

    /// The credential is invalid and cannot be refreshed here.
    #[error("mailbox credential expired: {0}")]
    AuthExpired(String),
}

pub type Result<T> = core::result::Result<T, MailboxError>;

/// One page of message ids from a listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub ids: Vec<String>,
    pub next_page: Option<String>,
}

/// Unseen messages from one fetch.
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    /// Oldest first.
    pub messages: Vec<Message>,

    /// Some unseen message was left behind: a fetch failed, or the listing
    /// was cut off before every page was read.
    pub incomplete: bool,
}

/// A read-only mailbox.
pub trait Mailbox {
    /// List ids of messages received after `since`, one page at a time.
    fn list_page(&mut self, since: Timestamp, page: Option<&str>) -> Result<Page>;

    /// Fetch one message in full.
    fn fetch(&mut self, id: &str) -> Result<Message>;

    /// Fetch up to `limit` messages received after `checkpoint` that
    /// `is_seen` does not already know about, oldest first.
    ///
    /// A transient failure fetching a single message skips it and marks the
    /// result incomplete, as does stopping at the page cap with pages left.
    /// Listing failures and expired credentials are returned.
    fn fetch_unseen(
        &mut self,
        checkpoint: Timestamp,
        limit: usize,
        is_seen: &dyn Fn(&str) -> bool,
    ) -> Result<Fetched> {
        let mut fetched = Fetched::default();
        let mut unseen = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page = self.list_page(checkpoint, page_token.as_deref())?;
            for id in page.ids {
                if unseen.len() >= limit {
                    break;
                }
                if is_seen(&id) {
                    debug!(message_id = %id, "skipping already processed message");
                } else if !unseen.contains(&id) {
                    unseen.push(id);
                }
            }
            page_token = page.next_page;
            if unseen.len() >= limit || page_token.is_none() {
                break;
            }
        }
        if page_token.is_some() && unseen.len() < limit {
            warn!(pages = MAX_PAGES, "listing cut off at page cap");
            fetched.incomplete = true;
        }

        for id in unseen {
            match self.fetch(&id) {
                Ok(message) => fetched.messages.push(message),
                Err(MailboxError::Transient(e)) => {
                    warn!(message_id = %id, error = %e, "failed to fetch message");
                    fetched.incomplete = true;
                }
                Err(e) => return Err(e),
            }
        }

        fetched.messages.sort_by_key(|m| m.received_at);
        Ok(fetched)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeMailbox;
    use super::*;

    fn message(id: &str, second: i64) -> Message {
        Message {
            id: id.to_string(),
            sender: "someone@example.com".into(),
            subject: format!("Subject {id}"),
            body: "Body".into(),
            received_at: Timestamp::from_second(second).unwrap(),
        }
    }

    fn epoch() -> Timestamp {
        Timestamp::from_second(0).unwrap()
    }

    #[test]
    fn returns_unseen_oldest_first() {
        let mut mailbox = FakeMailbox::with(vec![
            message("a", 300),
            message("b", 100),
            message("c", 200),
        ]);

        let fetched = mailbox.fetch_unseen(epoch(), 10, &|_| false).unwrap();
        let ids: Vec<&str> = fetched.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
        assert!(!fetched.incomplete);
    }

    #[test]
    fn skips_seen_and_respects_checkpoint() {
        let mut mailbox = FakeMailbox::with(vec![
            message("old", 50),
            message("seen", 150),
            message("new", 200),
        ]);
        let checkpoint = Timestamp::from_second(100).unwrap();

        let fetched = mailbox
            .fetch_unseen(checkpoint, 10, &|id| id == "seen")
            .unwrap();
        let ids: Vec<&str> = fetched.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["new"]);
    }

    #[test]
    fn pages_past_seen_messages_until_limit() {
        let messages = (1..=10).map(|i| message(&format!("m{i}"), i * 10)).collect();
        let mut mailbox = FakeMailbox::with(messages);
        mailbox.page_size = 3;

        // The newest six are already handled; the limit must still be filled.
        let seen = ["m10", "m9", "m8", "m7", "m6", "m5"];
        let fetched = mailbox
            .fetch_unseen(epoch(), 2, &|id| seen.contains(&id))
            .unwrap();
        let ids: Vec<&str> = fetched.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m3", "m4"]);
        assert!(mailbox.list_calls >= 3);
    }

    #[test]
    fn page_cap_marks_incomplete() {
        let mut messages: Vec<Message> = (1..=25)
            .map(|i| message(&format!("done{i}"), 1000 + i))
            .collect();
        messages.push(message("old", 10));
        let mut mailbox = FakeMailbox::with(messages);
        mailbox.page_size = 1;

        let fetched = mailbox
            .fetch_unseen(epoch(), 10, &|id| id.starts_with("done"))
            .unwrap();
        assert!(fetched.messages.is_empty());
        assert!(fetched.incomplete);
        assert_eq!(mailbox.list_calls, MAX_PAGES);
    }

    #[test]
    fn full_limit_on_last_page_is_complete() {
        let mut mailbox = FakeMailbox::with(vec![message("a", 100), message("b", 200)]);
        mailbox.page_size = 1;

        let fetched = mailbox.fetch_unseen(epoch(), 1, &|_| false).unwrap();
        assert_eq!(fetched.messages.len(), 1);
        assert!(!fetched.incomplete);
    }

    #[test]
    fn transient_fetch_failure_marks_incomplete() {
        let mut mailbox = FakeMailbox::with(vec![message("a", 100), message("b", 200)]);
        mailbox.fail_fetch.insert("a".to_string());

        let fetched = mailbox.fetch_unseen(epoch(), 10, &|_| false).unwrap();
        assert_eq!(fetched.messages.len(), 1);
        assert_eq!(fetched.messages[0].id, "b");
        assert!(fetched.incomplete);
    }

    #[test]
    fn listing_failure_is_returned() {
        let mut mailbox = FakeMailbox::with(vec![message("a", 100)]);
        mailbox.fail_list = Some(|| MailboxError::AuthExpired("revoked".into()));

        let err = mailbox.fetch_unseen(epoch(), 10, &|_| false).unwrap_err();
        assert!(matches!(err, MailboxError::AuthExpired(_)));
    }
}
