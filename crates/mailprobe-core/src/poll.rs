//! Mailbox poll session: one endpoint's polling loop for one run.
//!
//! Each cycle connects, scans the inbox for the probe, deletes what the
//! verdict consumed, disconnects and decides whether to come back later.
//! A session never holds a connection across the retry delay.

use std::time::Duration;

use mailprobe_mime::Message;

use crate::config::{RetryPolicy, RunConfig};
use crate::endpoint::Endpoint;
use crate::error::{ProbeError, Result};
use crate::mailbox::{MailboxConnector, MailboxSession};
use crate::verdict::{DeliveryVerdict, Offer, Status};

/// Scan position within the most recent listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InboxSnapshot {
    /// Messages in the listing.
    pub total: usize,
    /// Index of the message being inspected.
    pub index: usize,
    /// Message number being inspected.
    pub current: Option<u32>,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// This endpoint supplied the evidence it was polled for.
    Satisfied,
    /// The verdict became terminal.
    Settled,
    /// The session reported an error to the verdict.
    Failed,
    /// The retry budget ran out; a no-response error was reported.
    Exhausted,
}

/// Result of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Poll again after the delay.
    Retry(Duration),
    /// Stop polling.
    Finished(Outcome),
}

/// Polling state for one endpoint.
#[derive(Debug, Clone)]
pub struct PollSession {
    endpoint: Endpoint,
    retry: RetryPolicy,
    max_message_size: u64,
    attempts: u32,
    inbox: InboxSnapshot,
}

impl PollSession {
    /// Creates a session for `endpoint` using the run's retry policy.
    #[must_use]
    pub fn new(endpoint: &Endpoint, config: &RunConfig) -> Self {
        Self {
            endpoint: endpoint.clone(),
            retry: config.retry,
            max_message_size: config.max_message_size,
            attempts: 0,
            inbox: InboxSnapshot::default(),
        }
    }

    /// Endpoint being polled.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Fruitless cycles so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Scan position of the last cycle.
    #[must_use]
    pub const fn inbox(&self) -> InboxSnapshot {
        self.inbox
    }

    /// Polls until the session finishes, sleeping between cycles.
    pub async fn run<C>(mut self, connector: &C, verdict: &DeliveryVerdict) -> Outcome
    where
        C: MailboxConnector,
    {
        loop {
            match self.tick(connector, verdict).await {
                Tick::Retry(delay) => {
                    tracing::info!(
                        endpoint = %self.endpoint.id,
                        attempt = self.attempts,
                        max_attempts = self.retry.max_attempts,
                        "no matching message yet, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Tick::Finished(outcome) => {
                    tracing::debug!(
                        endpoint = %self.endpoint.id,
                        ?outcome,
                        "poll session finished"
                    );
                    return outcome;
                }
            }
        }
    }

    /// Runs one scan-and-decide cycle.
    pub async fn tick<C>(&mut self, connector: &C, verdict: &DeliveryVerdict) -> Tick
    where
        C: MailboxConnector,
    {
        if verdict.is_terminal() {
            return Tick::Finished(Outcome::Settled);
        }

        if let Err(error) = self.cycle(connector, verdict).await {
            verdict.fail(error);
            return Tick::Finished(Outcome::Failed);
        }

        if verdict.is_terminal() {
            return Tick::Finished(if verdict.status() == Status::Error {
                Outcome::Failed
            } else {
                Outcome::Settled
            });
        }
        match verdict.has_evidence_from(&self.endpoint.id) {
            Ok(true) => return Tick::Finished(Outcome::Satisfied),
            Ok(false) => {}
            Err(error) => {
                verdict.fail(error);
                return Tick::Finished(Outcome::Failed);
            }
        }

        self.attempts += 1;
        if self.retry.should_retry(self.attempts) {
            Tick::Retry(self.retry.retry_delay)
        } else {
            verdict.fail(ProbeError::NoResponse {
                endpoint: self.endpoint.id.clone(),
                attempts: self.attempts,
            });
            Tick::Finished(Outcome::Exhausted)
        }
    }

    async fn cycle<C>(&mut self, connector: &C, verdict: &DeliveryVerdict) -> Result<()>
    where
        C: MailboxConnector,
    {
        let mut session = connector.connect(&self.endpoint).await?;

        match self.scan(&mut session, verdict).await {
            Ok(()) => session.quit().await,
            Err(error) => {
                if let Err(quit_error) = session.quit().await {
                    tracing::warn!(
                        endpoint = %self.endpoint.id,
                        %quit_error,
                        "QUIT after failure also failed"
                    );
                }
                Err(error)
            }
        }
    }

    async fn scan<S>(&mut self, session: &mut S, verdict: &DeliveryVerdict) -> Result<()>
    where
        S: MailboxSession,
    {
        let entries = session.list().await?;
        self.inbox = InboxSnapshot {
            total: entries.len(),
            index: 0,
            current: None,
        };
        tracing::debug!(endpoint = %self.endpoint.id, messages = entries.len(), "inbox listed");

        for (index, entry) in entries.iter().enumerate() {
            self.inbox.index = index;
            self.inbox.current = Some(entry.number);

            if entry.size > self.max_message_size {
                tracing::warn!(
                    endpoint = %self.endpoint.id,
                    number = entry.number,
                    size = entry.size,
                    limit = self.max_message_size,
                    "oversized message skipped"
                );
                continue;
            }

            let raw = session.retrieve(entry.number).await?;
            let offer = match Message::parse(&raw) {
                Ok(message) => verdict.offer(&self.endpoint.id, &message),
                Err(error) => {
                    tracing::warn!(
                        endpoint = %self.endpoint.id,
                        number = entry.number,
                        %error,
                        "unparseable message skipped"
                    );
                    Offer::Unrelated
                }
            };

            if offer.consumes() {
                session.delete(entry.number).await?;
                tracing::debug!(
                    endpoint = %self.endpoint.id,
                    number = entry.number,
                    ?offer,
                    "message consumed"
                );
                break;
            }
            if verdict.status() == Status::Error {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::mailbox::MailboxEntry;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Mailbox with a fixed list of messages; records what was deleted.
    #[derive(Default)]
    struct Inbox {
        messages: Vec<Vec<u8>>,
        retrieved: Vec<u32>,
        deleted: Vec<u32>,
        connects: u32,
        quits: u32,
    }

    #[derive(Clone, Default)]
    struct FakeConnector {
        inbox: Rc<RefCell<Inbox>>,
    }

    struct FakeSession {
        inbox: Rc<RefCell<Inbox>>,
    }

    impl FakeConnector {
        fn with_subjects(subjects: &[&str]) -> Self {
            let connector = Self::default();
            connector.inbox.borrow_mut().messages = subjects
                .iter()
                .map(|s| format!("Subject: {s}\r\n\r\nbody\r\n").into_bytes())
                .collect();
            connector
        }
    }

    impl MailboxConnector for FakeConnector {
        type Session = FakeSession;

        async fn connect(&self, _endpoint: &Endpoint) -> Result<FakeSession> {
            self.inbox.borrow_mut().connects += 1;
            Ok(FakeSession {
                inbox: Rc::clone(&self.inbox),
            })
        }
    }

    impl MailboxSession for FakeSession {
        async fn list(&mut self) -> Result<Vec<MailboxEntry>> {
            let inbox = self.inbox.borrow();
            Ok(inbox
                .messages
                .iter()
                .enumerate()
                .map(|(i, raw)| MailboxEntry {
                    number: u32::try_from(i + 1).unwrap(),
                    size: raw.len() as u64,
                })
                .collect())
        }

        async fn retrieve(&mut self, number: u32) -> Result<Vec<u8>> {
            let mut inbox = self.inbox.borrow_mut();
            inbox.retrieved.push(number);
            Ok(inbox.messages[number as usize - 1].clone())
        }

        async fn delete(&mut self, number: u32) -> Result<()> {
            self.inbox.borrow_mut().deleted.push(number);
            Ok(())
        }

        async fn quit(self) -> Result<()> {
            self.inbox.borrow_mut().quits += 1;
            Ok(())
        }
    }

    fn setup(sending: &str, receiving: &str) -> (DeliveryVerdict, RunConfig) {
        let config = RunConfig::new().with_retry(
            RetryPolicy::new()
                .with_max_attempts(3)
                .with_retry_delay(Duration::from_secs(2)),
        );
        let (verdict, _rx) = DeliveryVerdict::new(
            &Endpoint::new(sending),
            &Endpoint::new(receiving),
            "T1-abc",
            &config,
        );
        verdict.record_sent(Vec::new());
        (verdict, config)
    }

    #[tokio::test]
    async fn match_is_consumed_and_scan_stops() {
        let (verdict, config) = setup("a@x.example", "b@y.example");
        let connector = FakeConnector::with_subjects(&["Newsletter", "Re: T1-abc", "Re: T1-abc"]);
        let mut session = PollSession::new(&Endpoint::new("b@y.example"), &config);

        let tick = session.tick(&connector, &verdict).await;

        assert_eq!(tick, Tick::Finished(Outcome::Settled));
        assert_eq!(verdict.status(), Status::Completed);
        assert_eq!(connector.inbox.borrow().deleted, vec![2]);
        assert_eq!(connector.inbox.borrow().quits, 1);
        assert_eq!(
            session.inbox(),
            InboxSnapshot {
                total: 3,
                index: 1,
                current: Some(2)
            }
        );
    }

    #[tokio::test]
    async fn empty_inbox_schedules_retry() {
        let (verdict, config) = setup("a@x.example", "b@y.example");
        let connector = FakeConnector::default();
        let mut session = PollSession::new(&Endpoint::new("b@y.example"), &config);

        assert_eq!(
            session.tick(&connector, &verdict).await,
            Tick::Retry(Duration::from_secs(2))
        );
        assert_eq!(session.attempts(), 1);
        assert_eq!(session.inbox().total, 0);
        assert_eq!(connector.inbox.borrow().quits, 1);
    }

    #[tokio::test]
    async fn unparseable_and_unrelated_messages_are_left() {
        let (verdict, config) = setup("a@x.example", "b@y.example");
        let connector = FakeConnector::default();
        connector.inbox.borrow_mut().messages = vec![
            b" orphan continuation\r\n\r\n".to_vec(),
            b"Subject: unrelated\r\n\r\n".to_vec(),
        ];
        let mut session = PollSession::new(&Endpoint::new("b@y.example"), &config);

        assert!(matches!(session.tick(&connector, &verdict).await, Tick::Retry(_)));
        assert!(connector.inbox.borrow().deleted.is_empty());
        assert_eq!(verdict.status(), Status::Sent);
    }

    #[tokio::test]
    async fn oversized_messages_are_not_retrieved() {
        let (verdict, config) = setup("a@x.example", "b@y.example");
        let connector =
            FakeConnector::with_subjects(&["Re: T1-abc, with a long tail", "Re: T1-abc"]);
        let config = config.with_max_message_size(30);
        let mut session = PollSession::new(&Endpoint::new("b@y.example"), &config);

        let tick = session.tick(&connector, &verdict).await;

        assert_eq!(tick, Tick::Finished(Outcome::Settled));
        assert_eq!(connector.inbox.borrow().retrieved, vec![2]);
        assert_eq!(connector.inbox.borrow().deleted, vec![2]);
        assert_eq!(verdict.status(), Status::Completed);
    }

    #[tokio::test]
    async fn terminal_verdict_skips_connect() {
        let (verdict, config) = setup("a@x.example", "b@y.example");
        verdict.fail(ProbeError::Config("already over".into()));
        let connector = FakeConnector::default();
        let mut session = PollSession::new(&Endpoint::new("b@y.example"), &config);

        assert_eq!(
            session.tick(&connector, &verdict).await,
            Tick::Finished(Outcome::Settled)
        );
        assert_eq!(connector.inbox.borrow().connects, 0);
    }

    #[tokio::test]
    async fn strict_receiving_side_is_satisfied_by_its_own_match() {
        let config = RunConfig::new().with_require_confirmation(true);
        let (verdict, _rx) = DeliveryVerdict::new(
            &Endpoint::new("a@x.example"),
            &Endpoint::new("b@y.example"),
            "T1-abc",
            &config,
        );
        verdict.record_sent(Vec::new());
        let connector = FakeConnector::with_subjects(&["Re: T1-abc"]);
        let mut session = PollSession::new(&Endpoint::new("b@y.example"), &config);

        assert_eq!(
            session.tick(&connector, &verdict).await,
            Tick::Finished(Outcome::Satisfied)
        );
        assert_eq!(verdict.status(), Status::Incomplete);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_no_response() {
        let (verdict, config) = setup("a@x.example", "b@y.example");
        let connector = FakeConnector::with_subjects(&["Newsletter"]);
        let session = PollSession::new(&Endpoint::new("b@y.example"), &config);

        let started = tokio::time::Instant::now();
        let outcome = session.run(&connector, &verdict).await;

        assert_eq!(outcome, Outcome::Exhausted);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert_eq!(connector.inbox.borrow().connects, 3);
        assert!(verdict.error().unwrap().is_no_response());
    }
}
