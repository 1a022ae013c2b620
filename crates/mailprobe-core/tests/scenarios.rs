//! Whole delivery runs against in-memory servers.
//!
//! Time is paused, so retry delays elapse instantly but stay measurable.

#![allow(clippy::unwrap_used)]

mod support;

use std::time::Duration;

use mailprobe_core::{
    Endpoint, Probe, ProbeError, Report, RetryPolicy, RunConfig, RunCoordinator, Status,
    dump_mailbox, purge_mailbox,
};
use tokio::time::Instant;

use support::{Fault, FakeMailboxes, FakeTransmitter};

const S: &str = "sender@hisp-a.example";
const R: &str = "inbox@hisp-b.example";
const SUBJECT: &str = "T1-abc";

fn endpoints() -> (Endpoint, Endpoint) {
    (Endpoint::new(S), Endpoint::new(R))
}

fn outbound() -> Probe {
    Probe::new(SUBJECT, S, R)
}

fn config() -> RunConfig {
    RunConfig::new().with_retry(
        RetryPolicy::new()
            .with_max_attempts(30)
            .with_retry_delay(Duration::from_secs(2)),
    )
}

/// Runs once and returns the callback's argument, when it fired relative to
/// the start, when the run drained, and the report.
async fn run_once(
    transmitter: FakeTransmitter,
    mailboxes: &FakeMailboxes,
    config: RunConfig,
    sending: &Endpoint,
    receiving: &Endpoint,
    expected: Status,
) -> (mailprobe_core::Result<()>, Duration, Duration, Report) {
    let coordinator = RunCoordinator::new(transmitter, mailboxes.clone(), config);
    let start = Instant::now();
    let mut fired = Vec::new();
    let report = coordinator
        .run(
            |outcome| fired.push((outcome, start.elapsed())),
            sending,
            receiving,
            &outbound(),
            expected,
        )
        .await;
    let drained = start.elapsed();

    assert_eq!(fired.len(), 1, "callback must fire exactly once");
    let (outcome, at) = fired.pop().unwrap();
    (outcome, at, drained, report)
}

#[tokio::test(start_paused = true)]
async fn scenario_a_reply_and_confirmation_complete() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(R, "Re: T1-abc");
    mailboxes.deliver_on(S, 2, "Confirmation: T1-abc");

    let (outcome, at, _, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config().with_require_confirmation(true),
        &sending,
        &receiving,
        Status::Completed,
    )
    .await;

    assert_eq!(outcome, Ok(()));
    assert_eq!(at, Duration::from_secs(2));
    assert_eq!(report.status, Status::Completed);
    assert_eq!(report.evidence_from_receiving.unwrap().subject, "Re: T1-abc");
    assert_eq!(report.evidence_from_sending.unwrap().subject, "Confirmation: T1-abc");
    assert_eq!(mailboxes.deleted_subjects(R), vec!["Re: T1-abc"]);
    assert_eq!(mailboxes.deleted_subjects(S), vec!["Confirmation: T1-abc"]);
}

#[tokio::test(start_paused = true)]
async fn scenario_a_reply_alone_completes_without_confirmation() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(R, "Re: T1-abc");

    let (outcome, at, _, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config(),
        &sending,
        &receiving,
        Status::Completed,
    )
    .await;

    assert_eq!(outcome, Ok(()));
    assert_eq!(at, Duration::ZERO);
    assert!(report.evidence_from_sending.is_none());
}

#[tokio::test(start_paused = true)]
async fn scenario_b_bounce_rejects() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(S, "Undeliverable: T1-abc");

    let (outcome, _, _, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config(),
        &sending,
        &receiving,
        Status::Rejected,
    )
    .await;

    assert_eq!(outcome, Ok(()));
    assert_eq!(report.status, Status::Rejected);
    assert_eq!(
        report.evidence_from_sending.unwrap().subject,
        "Undeliverable: T1-abc"
    );
    assert!(mailboxes.connects(R) <= 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_bounce_after_reply_rejects_in_strict_mode() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(R, "Re: T1-abc");
    mailboxes.deliver_on(S, 3, "Undeliverable: T1-abc");

    let (outcome, at, _, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config().with_require_confirmation(true),
        &sending,
        &receiving,
        Status::Rejected,
    )
    .await;

    assert_eq!(outcome, Ok(()));
    assert_eq!(at, Duration::from_secs(4));
    assert_eq!(report.status, Status::Rejected);
    assert!(report.evidence_from_receiving.is_some());
}

#[tokio::test(start_paused = true)]
async fn scenario_c_same_endpoint_completes_in_one_cycle() {
    let sending = Endpoint::new(S);
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(S, "Newsletter");
    mailboxes.deliver(S, "T1-abc");

    let (outcome, at, drained, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config(),
        &sending,
        &sending,
        Status::Completed,
    )
    .await;

    assert_eq!(outcome, Ok(()));
    assert_eq!(at, Duration::ZERO);
    assert_eq!(drained, Duration::ZERO);
    assert_eq!(mailboxes.connects(S), 1);
    assert_eq!(mailboxes.remaining(S), 1);
    assert_eq!(report.evidence_from_receiving.unwrap().subject, "T1-abc");
}

#[tokio::test(start_paused = true)]
async fn scenario_d_silence_exhausts_retries() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(S, "Confirmation: T1-abc");
    mailboxes.deliver(R, "Unrelated newsletter");

    let (outcome, at, _, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config().with_require_confirmation(true),
        &sending,
        &receiving,
        Status::Completed,
    )
    .await;

    let error = outcome.unwrap_err();
    assert_eq!(
        error,
        ProbeError::NoResponse {
            endpoint: R.to_string(),
            attempts: 30,
        }
    );
    assert!(error.to_string().starts_with("no response from receiving server"));
    assert_eq!(mailboxes.connects(S), 1);
    assert_eq!(at, Duration::from_secs(58));
    assert_eq!(mailboxes.connects(R), 30);
    assert_eq!(mailboxes.remaining(R), 1);
    assert_eq!(report.status, Status::Error);
}

#[tokio::test(start_paused = true)]
async fn scenario_e_authentication_failure_is_immediate() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.reject_login(R);

    let (outcome, at, drained, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config(),
        &sending,
        &receiving,
        Status::Completed,
    )
    .await;

    assert!(matches!(
        outcome,
        Err(ProbeError::Authentication { ref endpoint, .. }) if endpoint == R
    ));
    assert_eq!(at, Duration::ZERO);
    assert_eq!(mailboxes.connects(R), 1);
    // A sending session already waiting out its delay stops when it wakes.
    assert!(drained <= Duration::from_secs(2));
    assert!(mailboxes.connects(S) <= 1);
    assert_eq!(report.status, Status::Error);
}

#[tokio::test(start_paused = true)]
async fn send_failure_skips_polling() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    let transmitter =
        FakeTransmitter::failing(ProbeError::send(S, "554 5.7.1 relay denied"));

    let (outcome, _, _, report) = run_once(
        transmitter.clone(),
        &mailboxes,
        config(),
        &sending,
        &receiving,
        Status::Completed,
    )
    .await;

    assert!(matches!(outcome, Err(ProbeError::Send { .. })));
    assert_eq!(
        transmitter.submitted(),
        vec![(S.to_string(), SUBJECT.to_string())]
    );
    assert_eq!(mailboxes.connects(S), 0);
    assert_eq!(mailboxes.connects(R), 0);
    assert_eq!(report.status, Status::Error);
}

#[tokio::test(start_paused = true)]
async fn unexpected_status_is_reported() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(R, "Re: T1-abc");

    let (outcome, _, _, _) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config(),
        &sending,
        &receiving,
        Status::Rejected,
    )
    .await;

    assert_eq!(
        outcome,
        Err(ProbeError::UnexpectedStatus {
            actual: Status::Completed,
            expected: Status::Rejected,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn verify_reports_refused_recipients() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(R, "Auto-reply: T1-abc");

    let coordinator = RunCoordinator::new(
        FakeTransmitter::refusing(&["cc@hisp-c.example"]),
        mailboxes.clone(),
        config(),
    );
    let report = coordinator.verify(&sending, &receiving, &outbound()).await;

    assert_eq!(report.status, Status::Completed);
    assert_eq!(report.rejected_recipients, vec!["cc@hisp-c.example"]);
    assert!(report.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn unparseable_message_is_left_in_place() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver_raw(R, b" continuation first\r\n\r\nT1-abc\r\n");
    mailboxes.deliver_on(R, 2, "Re: T1-abc");

    let (outcome, at, _, _) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config(),
        &sending,
        &receiving,
        Status::Completed,
    )
    .await;

    assert_eq!(outcome, Ok(()));
    assert_eq!(at, Duration::from_secs(2));
    assert_eq!(mailboxes.remaining(R), 1);
}

#[tokio::test]
async fn purge_deletes_everything() {
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(R, "one");
    mailboxes.deliver(R, "two");
    mailboxes.deliver(R, "three");

    let purged = purge_mailbox(&mailboxes, &Endpoint::new(R), u64::MAX)
        .await
        .unwrap();

    assert_eq!(purged, 3);
    assert_eq!(mailboxes.remaining(R), 0);
    assert_eq!(mailboxes.quits(R), 1);
}

#[tokio::test]
async fn purge_surfaces_login_failure() {
    let mailboxes = FakeMailboxes::new();
    mailboxes.reject_login(R);

    let err = purge_mailbox(&mailboxes, &Endpoint::new(R), u64::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::Authentication { .. }));
}

#[tokio::test]
async fn dump_summarizes_without_deleting() {
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(R, "Re: T1-abc");
    mailboxes.deliver_raw(R, b" broken\r\n\r\n");

    let summaries = dump_mailbox(&mailboxes, &Endpoint::new(R), u64::MAX)
        .await
        .unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].number, 1);
    assert_eq!(summaries[0].subject.as_deref(), Some("Re: T1-abc"));
    assert_eq!(summaries[0].from.as_deref(), Some("sender@hisp.example"));
    assert!(summaries[1].subject.is_none());
    assert_eq!(mailboxes.remaining(R), 2);
}

/// Asserts a run that ended on a refused mailbox command at `R` on the
/// first cycle.
fn assert_mailbox_failure(
    outcome: &mailprobe_core::Result<()>,
    at: Duration,
    report: &Report,
    mailboxes: &FakeMailboxes,
) {
    assert!(
        matches!(outcome, Err(ProbeError::Mailbox { endpoint, .. }) if endpoint == R),
        "unexpected outcome {outcome:?}"
    );
    assert_eq!(at, Duration::ZERO);
    assert_eq!(report.status, Status::Error);
    assert_eq!(mailboxes.connects(R), 1);
}

#[tokio::test(start_paused = true)]
async fn list_failure_ends_run_without_retry() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(R, "Re: T1-abc");
    mailboxes.fail(R, Fault::List);

    let (outcome, at, _, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config(),
        &sending,
        &receiving,
        Status::Completed,
    )
    .await;

    assert_mailbox_failure(&outcome, at, &report, &mailboxes);
    assert_eq!(mailboxes.retrievals(R), 0);
    assert_eq!(mailboxes.quits(R), 1);
    assert!(report.error.unwrap().contains("List refused"));
}

#[tokio::test(start_paused = true)]
async fn retrieve_failure_ends_run_without_retry() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(R, "Newsletter");
    mailboxes.fail(R, Fault::Retrieve);

    let (outcome, at, _, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config(),
        &sending,
        &receiving,
        Status::Completed,
    )
    .await;

    assert_mailbox_failure(&outcome, at, &report, &mailboxes);
    assert_eq!(mailboxes.remaining(R), 1);
}

#[tokio::test(start_paused = true)]
async fn delete_failure_on_a_match_ends_run_in_strict_mode() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(R, "Re: T1-abc");
    mailboxes.fail(R, Fault::Delete);

    let (outcome, at, _, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config().with_require_confirmation(true),
        &sending,
        &receiving,
        Status::Completed,
    )
    .await;

    assert_mailbox_failure(&outcome, at, &report, &mailboxes);
    assert!(report.evidence_from_receiving.is_some());
    assert_eq!(mailboxes.remaining(R), 1);
}

#[tokio::test(start_paused = true)]
async fn delete_failure_after_completion_keeps_the_verdict() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(R, "Re: T1-abc");
    mailboxes.fail(R, Fault::Delete);

    let (outcome, _, _, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config(),
        &sending,
        &receiving,
        Status::Completed,
    )
    .await;

    assert_eq!(outcome, Ok(()));
    assert_eq!(report.status, Status::Completed);
    assert!(report.error.is_none());
    assert_eq!(mailboxes.remaining(R), 1);
}

#[tokio::test(start_paused = true)]
async fn quit_failure_after_clean_scan_is_fatal() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver(R, "Newsletter");
    mailboxes.fail(R, Fault::Quit);

    let (outcome, at, _, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config(),
        &sending,
        &receiving,
        Status::Completed,
    )
    .await;

    assert_mailbox_failure(&outcome, at, &report, &mailboxes);
    assert_eq!(mailboxes.retrievals(R), 1);
    assert_eq!(mailboxes.quits(R), 0);
}

#[tokio::test(start_paused = true)]
async fn oversized_messages_are_skipped_unread() {
    let (sending, receiving) = endpoints();
    let mailboxes = FakeMailboxes::new();
    let padding = "x".repeat(400);
    mailboxes.deliver_raw(R, format!("Subject: Re: T1-abc\r\n\r\n{padding}\r\n").as_bytes());
    mailboxes.deliver_on(R, 2, "Re: T1-abc");

    let (outcome, at, _, report) = run_once(
        FakeTransmitter::new(),
        &mailboxes,
        config().with_max_message_size(200),
        &sending,
        &receiving,
        Status::Completed,
    )
    .await;

    assert_eq!(outcome, Ok(()));
    assert_eq!(at, Duration::from_secs(2));
    assert_eq!(report.status, Status::Completed);
    assert_eq!(mailboxes.retrievals(R), 1);
    assert_eq!(mailboxes.remaining(R), 1);
}

#[tokio::test]
async fn purge_deletes_oversized_messages_unread() {
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver_raw(R, "x".repeat(500).as_bytes());
    mailboxes.deliver(R, "small");

    let purged = purge_mailbox(&mailboxes, &Endpoint::new(R), 200)
        .await
        .unwrap();

    assert_eq!(purged, 2);
    assert_eq!(mailboxes.remaining(R), 0);
    assert_eq!(mailboxes.retrievals(R), 1);
}

#[tokio::test]
async fn dump_lists_oversized_messages_without_headers() {
    let mailboxes = FakeMailboxes::new();
    mailboxes.deliver_raw(R, "x".repeat(500).as_bytes());
    mailboxes.deliver(R, "Re: T1-abc");

    let summaries = dump_mailbox(&mailboxes, &Endpoint::new(R), 200)
        .await
        .unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].size, 500);
    assert!(summaries[0].subject.is_none());
    assert_eq!(summaries[1].subject.as_deref(), Some("Re: T1-abc"));
    assert_eq!(mailboxes.retrievals(R), 1);
}
