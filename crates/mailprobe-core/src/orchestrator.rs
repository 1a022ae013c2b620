//! Send orchestrator: transmit the probe, then poll for evidence.

use crate::config::RunConfig;
use crate::endpoint::Endpoint;
use crate::mailbox::MailboxConnector;
use crate::poll::{Outcome, PollSession};
use crate::probe::Probe;
use crate::transmit::Transmitter;
use crate::verdict::DeliveryVerdict;

/// How each poll session of a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Polled {
    /// Session polling the sending endpoint.
    pub sending: Option<Outcome>,
    /// Session polling the receiving endpoint, when distinct.
    pub receiving: Option<Outcome>,
}

/// Drives one probe from submission to the end of polling.
#[derive(Debug)]
pub struct SendOrchestrator<'a, T, C> {
    transmitter: &'a T,
    connector: &'a C,
    config: &'a RunConfig,
}

impl<'a, T: Transmitter, C: MailboxConnector> SendOrchestrator<'a, T, C> {
    /// Creates an orchestrator sharing the given transport and settings.
    #[must_use]
    pub const fn new(transmitter: &'a T, connector: &'a C, config: &'a RunConfig) -> Self {
        Self {
            transmitter,
            connector,
            config,
        }
    }

    /// Sends `probe` through `sending` and polls until every session stops.
    ///
    /// A failed submission goes to the verdict and nothing is polled.
    pub async fn run(
        &self,
        sending: &Endpoint,
        receiving: &Endpoint,
        probe: &Probe,
        verdict: &DeliveryVerdict,
    ) -> Polled {
        match self.transmitter.transmit(sending, probe).await {
            Ok(refused) => verdict.record_sent(refused),
            Err(error) => {
                verdict.fail(error);
                return Polled::default();
            }
        }

        let at_sending = PollSession::new(sending, self.config);
        if sending.is_same(receiving) {
            tracing::debug!(endpoint = %sending.id, "polling a single endpoint");
            return Polled {
                sending: Some(at_sending.run(self.connector, verdict).await),
                receiving: None,
            };
        }

        let at_receiving = PollSession::new(receiving, self.config);
        let (sending_outcome, receiving_outcome) = tokio::join!(
            at_sending.run(self.connector, verdict),
            at_receiving.run(self.connector, verdict)
        );
        Polled {
            sending: Some(sending_outcome),
            receiving: Some(receiving_outcome),
        }
    }
}
