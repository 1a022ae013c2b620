//! Run coordinator: the entry point for one probe run.
//!
//! The caller hears about the verdict through a callback that fires once,
//! as soon as the verdict is terminal. Sessions still waiting on a retry
//! delay keep running; the returned future resolves after they drain.

use crate::config::RunConfig;
use crate::endpoint::Endpoint;
use crate::error::{ProbeError, Result};
use crate::mailbox::MailboxConnector;
use crate::orchestrator::SendOrchestrator;
use crate::probe::Probe;
use crate::transmit::Transmitter;
use crate::verdict::{DeliveryVerdict, Report, Status};

/// Runs probes with a fixed transport and run configuration.
#[derive(Debug, Clone)]
pub struct RunCoordinator<T, C> {
    transmitter: T,
    connector: C,
    config: RunConfig,
}

impl<T: Transmitter, C: MailboxConnector> RunCoordinator<T, C> {
    /// Creates a coordinator.
    #[must_use]
    pub const fn new(transmitter: T, connector: C, config: RunConfig) -> Self {
        Self {
            transmitter,
            connector,
            config,
        }
    }

    /// Run settings in use.
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs one probe and invokes `callback` exactly once.
    ///
    /// The callback receives `Ok(())` when the terminal status equals
    /// `expected`, the verdict's error when it ended in ERROR, and
    /// [`ProbeError::UnexpectedStatus`] otherwise. The final report is
    /// returned once every poll session has stopped.
    pub async fn run<F>(
        &self,
        callback: F,
        sending: &Endpoint,
        receiving: &Endpoint,
        probe: &Probe,
        expected: Status,
    ) -> Report
    where
        F: FnOnce(Result<()>),
    {
        let (verdict, completion) =
            DeliveryVerdict::new(sending, receiving, &probe.subject, &self.config);
        tracing::info!(
            subject = %probe.subject,
            sending = %sending.id,
            receiving = %receiving.id,
            %expected,
            "probe run started"
        );

        let drive = async {
            let polled = SendOrchestrator::new(&self.transmitter, &self.connector, &self.config)
                .run(sending, receiving, probe, &verdict)
                .await;
            if !verdict.is_terminal() {
                tracing::debug!(
                    ?polled,
                    status = %verdict.status(),
                    "sessions drained without a verdict"
                );
                verdict.fail(ProbeError::Unsettled(verdict.status()));
            }
        };

        let notify = async {
            let outcome = match completion.await {
                Ok(Ok(status)) if status == expected => Ok(()),
                Ok(Ok(actual)) => Err(ProbeError::UnexpectedStatus { actual, expected }),
                Ok(Err(error)) => Err(error),
                Err(_) => Err(ProbeError::Unsettled(verdict.status())),
            };
            callback(outcome);
        };

        tokio::join!(drive, notify);

        let report = verdict.report();
        tracing::info!(subject = %report.subject, status = %report.status, "probe run finished");
        report
    }

    /// Runs one probe and returns its outcome.
    pub async fn verify(&self, sending: &Endpoint, receiving: &Endpoint, probe: &Probe) -> Report {
        self.run(|_| {}, sending, receiving, probe, Status::Completed).await
    }
}
