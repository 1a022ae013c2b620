//! Delivery verdict: the correlation state machine for one probe.
//!
//! Evidence arrives from the poll sessions in any order. The verdict decides
//! whether a candidate message belongs to the probe, records it, and moves
//! through the states below. Entering a terminal state fires the run's
//! completion handle exactly once.
//!
//! ```text
//! NEW ── send ok ──→ SENT ──┬── bounce at sending ─────────────→ REJECTED
//!  │                        ├── match, same endpoint ──────────→ COMPLETED
//!  │                        ├── one leg matched ──→ INCOMPLETE ─→ COMPLETED
//!  │                        └── receiving match (not strict) ──→ COMPLETED
//!  └──────────── any error (from any non-terminal state) ──────→ ERROR
//! ```

use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

use mailprobe_mime::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::config::RunConfig;
use crate::endpoint::Endpoint;
use crate::error::{ProbeError, Result};

/// Lifecycle status of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, not yet sent.
    New,
    /// A fatal error occurred.
    Error,
    /// The sending endpoint accepted the probe.
    Sent,
    /// The sending endpoint returned a non-delivery notice.
    Rejected,
    /// One side matched; waiting for the other.
    Incomplete,
    /// Delivery observed.
    Completed,
}

impl Status {
    /// Every status, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::New,
        Self::Error,
        Self::Sent,
        Self::Rejected,
        Self::Incomplete,
        Self::Completed,
    ];

    /// Returns true for ERROR, REJECTED and COMPLETED.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Rejected | Self::Completed)
    }

    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Error => "ERROR",
            Self::Sent => "SENT",
            Self::Rejected => "REJECTED",
            Self::Incomplete => "INCOMPLETE",
            Self::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProbeError::Config(format!("unknown status {s:?}")))
    }
}

/// A message observed at an endpoint and attributed to the probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evidence {
    /// Endpoint the message was found at.
    pub endpoint: String,
    /// Decoded subject.
    pub subject: String,
    /// Decoded `From` header.
    pub from: Option<String>,
    /// Raw `Date` header.
    pub date: Option<String>,
    /// `Message-ID` header.
    pub message_id: Option<String>,
}

impl Evidence {
    /// Captures the identifying headers of `message`.
    ///
    /// Returns `None` when the message has no subject.
    #[must_use]
    pub fn from_message(endpoint: &str, message: &Message) -> Option<Self> {
        Some(Self {
            endpoint: endpoint.to_string(),
            subject: message.subject()?,
            from: message.from(),
            date: message.date().map(str::to_string),
            message_id: message.message_id().map(str::to_string),
        })
    }
}

/// How the verdict classified a candidate message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Matched and recorded.
    Accepted,
    /// Matched, but the verdict is terminal or that leg is already filled.
    Ignored,
    /// Not about this probe.
    Unrelated,
}

impl Offer {
    /// Returns true if the poll session should delete the message.
    #[must_use]
    pub const fn consumes(self) -> bool {
        matches!(self, Self::Accepted | Self::Ignored)
    }
}

/// What the completion handle delivers: the terminal status, or the error.
pub type Completion = std::result::Result<Status, ProbeError>;

/// Outcome of a run, as returned by `verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Probe subject.
    pub subject: String,
    /// Final status.
    pub status: Status,
    /// Error text when the status is ERROR.
    pub error: Option<String>,
    /// Evidence found at the sending endpoint.
    pub evidence_from_sending: Option<Evidence>,
    /// Evidence found at the receiving endpoint.
    pub evidence_from_receiving: Option<Evidence>,
    /// Recipients refused at RCPT time.
    pub rejected_recipients: Vec<String>,
}

#[derive(Debug)]
struct State {
    status: Status,
    error: Option<ProbeError>,
    evidence_from_sending: Option<Evidence>,
    evidence_from_receiving: Option<Evidence>,
    rejected_recipients: Vec<String>,
    completion: Option<oneshot::Sender<Completion>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Same,
    Sending,
    Receiving,
}

/// Correlation state for one probe.
///
/// Shared by reference between the orchestrator and the poll sessions of
/// one run, all on one task. No borrow of the inner state outlives a method
/// call, so the `RefCell` never sees overlapping borrows.
#[derive(Debug)]
pub struct DeliveryVerdict {
    sending: String,
    receiving: String,
    subject: String,
    config: RunConfig,
    state: RefCell<State>,
}

impl DeliveryVerdict {
    /// Creates a verdict in the NEW state and the receiver of its completion.
    #[must_use]
    pub fn new(
        sending: &Endpoint,
        receiving: &Endpoint,
        subject: impl Into<String>,
        config: &RunConfig,
    ) -> (Self, oneshot::Receiver<Completion>) {
        let (tx, rx) = oneshot::channel();
        let verdict = Self {
            sending: sending.id.clone(),
            receiving: receiving.id.clone(),
            subject: subject.into(),
            config: config.clone(),
            state: RefCell::new(State {
                status: Status::New,
                error: None,
                evidence_from_sending: None,
                evidence_from_receiving: None,
                rejected_recipients: Vec::new(),
                completion: Some(tx),
            }),
        };
        (verdict, rx)
    }

    /// Probe subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Sending endpoint identity.
    #[must_use]
    pub fn sending(&self) -> &str {
        &self.sending
    }

    /// Receiving endpoint identity.
    #[must_use]
    pub fn receiving(&self) -> &str {
        &self.receiving
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.state.borrow().status
    }

    /// Returns true once the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// The error that ended the run, if any.
    #[must_use]
    pub fn error(&self) -> Option<ProbeError> {
        self.state.borrow().error.clone()
    }

    /// Evidence recorded for the sending endpoint.
    #[must_use]
    pub fn evidence_from_sending(&self) -> Option<Evidence> {
        self.state.borrow().evidence_from_sending.clone()
    }

    /// Evidence recorded for the receiving endpoint.
    #[must_use]
    pub fn evidence_from_receiving(&self) -> Option<Evidence> {
        self.state.borrow().evidence_from_receiving.clone()
    }

    /// Recipients refused during the send.
    #[must_use]
    pub fn rejected_recipients(&self) -> Vec<String> {
        self.state.borrow().rejected_recipients.clone()
    }

    /// Snapshot of the verdict.
    #[must_use]
    pub fn report(&self) -> Report {
        let state = self.state.borrow();
        Report {
            subject: self.subject.clone(),
            status: state.status,
            error: state.error.as_ref().map(ToString::to_string),
            evidence_from_sending: state.evidence_from_sending.clone(),
            evidence_from_receiving: state.evidence_from_receiving.clone(),
            rejected_recipients: state.rejected_recipients.clone(),
        }
    }

    /// NEW → SENT, recording the recipients the server refused.
    pub fn record_sent(&self, rejected_recipients: Vec<String>) {
        let mut state = self.state.borrow_mut();
        if state.status != Status::New {
            tracing::debug!(status = %state.status, "send reported outside NEW, ignored");
            return;
        }
        if !rejected_recipients.is_empty() {
            tracing::warn!(?rejected_recipients, "some recipients were refused");
        }
        state.rejected_recipients = rejected_recipients;
        state.status = Status::Sent;
        tracing::info!(subject = %self.subject, "probe sent");
    }

    /// Any non-terminal state → ERROR. Ignored once terminal.
    pub fn fail(&self, error: ProbeError) {
        let mut state = self.state.borrow_mut();
        if state.status.is_terminal() {
            tracing::debug!(%error, status = %state.status, "error after verdict, ignored");
            return;
        }
        tracing::error!(%error, subject = %self.subject, "probe failed");
        state.error = Some(error.clone());
        state.status = Status::Error;
        if let Some(tx) = state.completion.take() {
            let _ = tx.send(Err(error));
        }
    }

    /// Offers a message found at `endpoint` as evidence.
    pub fn offer(&self, endpoint: &str, message: &Message) -> Offer {
        let Some(evidence) = Evidence::from_message(endpoint, message) else {
            return Offer::Unrelated;
        };
        self.offer_evidence(evidence)
    }

    /// Offers already-extracted evidence; see [`Self::offer`].
    pub fn offer_evidence(&self, evidence: Evidence) -> Offer {
        if !evidence.subject.contains(self.subject.as_str()) {
            return Offer::Unrelated;
        }
        if self.is_terminal() {
            return Offer::Ignored;
        }
        let side = match self.side(&evidence.endpoint) {
            Ok(side) => side,
            Err(error) => {
                self.fail(error);
                return Offer::Unrelated;
            }
        };
        let bounce = self.config.is_bounce(&evidence.subject);

        let mut state = self.state.borrow_mut();
        let next = match side {
            Side::Same | Side::Sending if bounce => {
                state.evidence_from_sending.get_or_insert(evidence);
                Status::Rejected
            }
            Side::Same => {
                state.evidence_from_receiving = Some(evidence);
                Status::Completed
            }
            Side::Sending => {
                if state.evidence_from_sending.is_some() {
                    return Offer::Ignored;
                }
                state.evidence_from_sending = Some(evidence);
                if state.evidence_from_receiving.is_some() {
                    Status::Completed
                } else {
                    Status::Incomplete
                }
            }
            Side::Receiving => {
                if state.evidence_from_receiving.is_some() {
                    return Offer::Ignored;
                }
                state.evidence_from_receiving = Some(evidence);
                if state.evidence_from_sending.is_some() || !self.config.require_confirmation {
                    Status::Completed
                } else {
                    Status::Incomplete
                }
            }
        };

        tracing::info!(from = %state.status, to = %next, ?side, "verdict transition");
        state.status = next;
        if next.is_terminal() {
            if let Some(tx) = state.completion.take() {
                let _ = tx.send(Ok(next));
            }
        }
        Offer::Accepted
    }

    /// Returns true if `endpoint` has produced the evidence its poll session
    /// is waiting for.
    ///
    /// The sending endpoint is satisfied by its own evidence, or by the
    /// receiving side's when confirmation is not required.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::UnknownEndpoint`] for an endpoint outside this run.
    pub fn has_evidence_from(&self, endpoint: &str) -> Result<bool> {
        let side = self.side(endpoint)?;
        let state = self.state.borrow();
        let sending = state.evidence_from_sending.is_some();
        let receiving = state.evidence_from_receiving.is_some();
        Ok(match side {
            Side::Same => sending || receiving,
            Side::Sending => sending || (receiving && !self.config.require_confirmation),
            Side::Receiving => receiving,
        })
    }

    fn side(&self, endpoint: &str) -> Result<Side> {
        match (endpoint == self.sending, endpoint == self.receiving) {
            (true, true) => Ok(Side::Same),
            (true, false) => Ok(Side::Sending),
            (false, true) => Ok(Side::Receiving),
            (false, false) => Err(ProbeError::UnknownEndpoint(endpoint.to_string())),
        }
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
    use proptest::prelude::*;

    const S: &str = "sender@hisp-a.example";
    const R: &str = "inbox@hisp-b.example";

    fn verdict(
        sending: &str,
        receiving: &str,
        strict: bool,
    ) -> (DeliveryVerdict, oneshot::Receiver<Completion>) {
        let config = RunConfig::new().with_require_confirmation(strict);
        let (verdict, rx) = DeliveryVerdict::new(
            &Endpoint::new(sending),
            &Endpoint::new(receiving),
            "T1-abc",
            &config,
        );
        verdict.record_sent(Vec::new());
        (verdict, rx)
    }

    fn evidence(endpoint: &str, subject: &str) -> Evidence {
        Evidence {
            endpoint: endpoint.to_string(),
            subject: subject.to_string(),
            from: None,
            date: None,
            message_id: None,
        }
    }

    mod status_tests {
        use super::*;

        #[test]
        fn terminal_states() {
            assert!(Status::Error.is_terminal());
            assert!(Status::Rejected.is_terminal());
            assert!(Status::Completed.is_terminal());
            assert!(!Status::New.is_terminal());
            assert!(!Status::Sent.is_terminal());
            assert!(!Status::Incomplete.is_terminal());
        }

        #[test]
        fn parse_case_insensitive() {
            assert_eq!("completed".parse::<Status>().unwrap(), Status::Completed);
            assert_eq!("Rejected".parse::<Status>().unwrap(), Status::Rejected);
            assert_eq!(" ERROR ".parse::<Status>().unwrap(), Status::Error);
            assert!("complete".parse::<Status>().is_err());
        }

        #[test]
        fn display_round_trips() {
            for status in Status::ALL {
                assert_eq!(status.to_string().parse::<Status>().unwrap(), status);
            }
        }
    }

    #[test]
    fn new_verdict_and_send() {
        let config = RunConfig::default();
        let (verdict, _rx) =
            DeliveryVerdict::new(&Endpoint::new(S), &Endpoint::new(R), "T1-abc", &config);
        assert_eq!(verdict.status(), Status::New);

        verdict.record_sent(vec!["ghost@hisp-b.example".into()]);
        assert_eq!(verdict.status(), Status::Sent);
        assert_eq!(verdict.rejected_recipients(), vec!["ghost@hisp-b.example"]);
    }

    #[test]
    fn unrelated_subject_is_left_alone() {
        let (verdict, _rx) = verdict(S, R, false);
        assert_eq!(verdict.offer_evidence(evidence(R, "Weekly newsletter")), Offer::Unrelated);
        assert_eq!(verdict.status(), Status::Sent);
    }

    #[test]
    fn message_without_subject_is_unrelated() {
        let (verdict, _rx) = verdict(S, R, false);
        let message = Message::parse(b"From: someone@x.example\r\n\r\nbody").unwrap();
        assert_eq!(verdict.offer(R, &message), Offer::Unrelated);
    }

    #[test]
    fn encoded_subject_matches() {
        let (verdict, _rx) = verdict(S, R, false);
        let message = Message::parse(b"Subject: =?UTF-8?B?UmU6IFQxLWFiYw==?=\r\n\r\n").unwrap();
        assert_eq!(verdict.offer(R, &message), Offer::Accepted);
        assert_eq!(verdict.status(), Status::Completed);
    }

    #[test]
    fn receiving_match_completes_when_not_strict() {
        let (verdict, mut rx) = verdict(S, R, false);
        assert_eq!(verdict.offer_evidence(evidence(R, "Re: T1-abc")), Offer::Accepted);
        assert_eq!(verdict.status(), Status::Completed);
        assert_eq!(rx.try_recv().unwrap(), Ok(Status::Completed));
    }

    #[test]
    fn receiving_match_waits_for_confirmation_when_strict() {
        let (verdict, mut rx) = verdict(S, R, true);
        verdict.offer_evidence(evidence(R, "Re: T1-abc"));
        assert_eq!(verdict.status(), Status::Incomplete);
        assert!(rx.try_recv().is_err());

        verdict.offer_evidence(evidence(S, "Confirmation: T1-abc"));
        assert_eq!(verdict.status(), Status::Completed);
        assert_eq!(rx.try_recv().unwrap(), Ok(Status::Completed));
    }

    #[test]
    fn configured_bounce_markers_decide_rejection() {
        let config = RunConfig::new().with_bounce_markers(["Mail Delivery Failed"]);
        let (verdict, mut rx) =
            DeliveryVerdict::new(&Endpoint::new(S), &Endpoint::new(R), "T1-abc", &config);
        verdict.record_sent(Vec::new());

        verdict.offer_evidence(evidence(S, "Undeliverable: T1-abc"));
        assert_eq!(verdict.status(), Status::Incomplete);
        assert!(rx.try_recv().is_err());

        let (rejecting, mut rx) =
            DeliveryVerdict::new(&Endpoint::new(S), &Endpoint::new(R), "T1-abc", &config);
        rejecting.record_sent(Vec::new());
        rejecting.offer_evidence(evidence(S, "Mail Delivery Failed: T1-abc"));
        assert_eq!(rejecting.status(), Status::Rejected);
        assert_eq!(rx.try_recv().unwrap(), Ok(Status::Rejected));
    }

    #[test]
    fn bounce_rejects() {
        let (verdict, mut rx) = verdict(S, R, false);
        assert_eq!(
            verdict.offer_evidence(evidence(S, "Undeliverable: T1-abc")),
            Offer::Accepted
        );
        assert_eq!(verdict.status(), Status::Rejected);
        assert_eq!(rx.try_recv().unwrap(), Ok(Status::Rejected));
    }

    #[test]
    fn bounce_after_receiving_evidence_in_strict_mode() {
        let (verdict, _rx) = verdict(S, R, true);
        verdict.offer_evidence(evidence(R, "Re: T1-abc"));
        verdict.offer_evidence(evidence(S, "Undeliverable: T1-abc"));
        assert_eq!(verdict.status(), Status::Rejected);
        assert!(verdict.evidence_from_receiving().is_some());
    }

    #[test]
    fn bounce_after_confirmation_still_rejects() {
        let (verdict, _rx) = verdict(S, R, true);
        verdict.offer_evidence(evidence(S, "Confirmation: T1-abc"));
        assert_eq!(verdict.status(), Status::Incomplete);
        verdict.offer_evidence(evidence(S, "Undeliverable: T1-abc"));
        assert_eq!(verdict.status(), Status::Rejected);
        assert_eq!(
            verdict.evidence_from_sending().unwrap().subject,
            "Confirmation: T1-abc"
        );
    }

    #[test]
    fn same_endpoint_first_match_completes() {
        let (verdict, mut rx) = verdict(S, S, true);
        assert_eq!(verdict.offer_evidence(evidence(S, "T1-abc")), Offer::Accepted);
        assert_eq!(verdict.status(), Status::Completed);
        assert_eq!(rx.try_recv().unwrap(), Ok(Status::Completed));
        assert!(verdict.has_evidence_from(S).unwrap());
    }

    #[test]
    fn same_endpoint_bounce_rejects() {
        let (verdict, _rx) = verdict(S, S, false);
        verdict.offer_evidence(evidence(S, "Undeliverable: T1-abc"));
        assert_eq!(verdict.status(), Status::Rejected);
    }

    #[test]
    fn second_match_for_filled_leg_is_ignored() {
        let (verdict, _rx) = verdict(S, R, true);
        assert_eq!(verdict.offer_evidence(evidence(R, "Re: T1-abc")), Offer::Accepted);
        assert_eq!(verdict.offer_evidence(evidence(R, "Fwd: T1-abc")), Offer::Ignored);
        assert_eq!(verdict.evidence_from_receiving().unwrap().subject, "Re: T1-abc");
        assert_eq!(verdict.status(), Status::Incomplete);
    }

    #[test]
    fn unknown_endpoint_is_a_defect() {
        let (verdict, mut rx) = verdict(S, R, false);
        let offer = verdict.offer_evidence(evidence("stranger@elsewhere.example", "T1-abc"));
        assert_eq!(offer, Offer::Unrelated);
        assert_eq!(verdict.status(), Status::Error);
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(ProbeError::UnknownEndpoint(_))
        ));
        assert!(verdict.has_evidence_from("stranger@elsewhere.example").is_err());
    }

    #[test]
    fn terminal_state_is_sticky() {
        let (verdict, mut rx) = verdict(S, R, false);
        verdict.offer_evidence(evidence(R, "Re: T1-abc"));
        assert_eq!(rx.try_recv().unwrap(), Ok(Status::Completed));

        assert_eq!(
            verdict.offer_evidence(evidence(S, "Undeliverable: T1-abc")),
            Offer::Ignored
        );
        verdict.fail(ProbeError::Config("late".into()));
        verdict.record_sent(Vec::new());
        assert_eq!(verdict.status(), Status::Completed);
        assert!(verdict.error().is_none());
    }

    #[test]
    fn error_fires_once_with_error() {
        let (verdict, mut rx) = verdict(S, R, false);
        verdict.fail(ProbeError::authentication(R, "bad password"));
        verdict.fail(ProbeError::Config("second".into()));
        assert_eq!(verdict.status(), Status::Error);
        assert_eq!(
            rx.try_recv().unwrap(),
            Err(ProbeError::authentication(R, "bad password"))
        );
        assert_eq!(
            verdict.report().error.as_deref(),
            Some("Authentication failed at inbox@hisp-b.example: bad password")
        );
    }

    #[test]
    fn has_evidence_from_respects_strictness() {
        let (lenient, _rx) = verdict(S, R, false);
        lenient.offer_evidence(evidence(R, "Re: T1-abc"));
        assert!(lenient.has_evidence_from(S).unwrap());
        assert!(lenient.has_evidence_from(R).unwrap());

        let (strict, _rx) = verdict(S, R, true);
        strict.offer_evidence(evidence(R, "Re: T1-abc"));
        assert!(!strict.has_evidence_from(S).unwrap());
        assert!(strict.has_evidence_from(R).unwrap());
    }

    proptest! {
        #[test]
        fn delivery_completes_in_any_order(
            strict in any::<bool>(),
            receiving_first in any::<bool>(),
        ) {
            let (verdict, mut rx) = verdict(S, R, strict);
            let confirmation = evidence(S, "Confirmation: T1-abc");
            let delivery = evidence(R, "Re: T1-abc");
            if receiving_first {
                verdict.offer_evidence(delivery);
                verdict.offer_evidence(confirmation);
            } else {
                verdict.offer_evidence(confirmation);
                verdict.offer_evidence(delivery);
            }
            prop_assert_eq!(verdict.status(), Status::Completed);
            prop_assert_eq!(rx.try_recv().unwrap(), Ok(Status::Completed));
        }

        #[test]
        fn bounce_rejects_while_not_terminal(
            strict in any::<bool>(),
            receiving_first in any::<bool>(),
        ) {
            let (verdict, _rx) = verdict(S, R, strict);
            if receiving_first {
                verdict.offer_evidence(evidence(R, "Re: T1-abc"));
            }
            let was_terminal = verdict.is_terminal();
            verdict.offer_evidence(evidence(S, "Undeliverable: T1-abc"));
            if !was_terminal {
                prop_assert_eq!(verdict.status(), Status::Rejected);
            }
        }

        #[test]
        fn unrelated_subjects_never_change_state(subject in "[a-zA-Z0-9 :]{0,40}") {
            prop_assume!(!subject.contains("T1-abc"));
            let (verdict, _rx) = verdict(S, R, false);
            prop_assert_eq!(verdict.offer_evidence(evidence(R, &subject)), Offer::Unrelated);
            prop_assert_eq!(verdict.status(), Status::Sent);
        }
    }
}
