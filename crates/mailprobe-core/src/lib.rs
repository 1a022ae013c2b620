//! # mailprobe-core
//!
//! End-to-end delivery probing between mail endpoints.
//!
//! A run sends one probe message through a sending endpoint's SMTP
//! submission server, then polls the POP3 mailboxes of the sending and
//! receiving endpoints for evidence: the delivered probe, an auto-reply,
//! a delivery confirmation or a bounce. The evidence drives a
//! [`DeliveryVerdict`] to one of COMPLETED, REJECTED or ERROR.
//!
//! This crate provides:
//! - Endpoint descriptors, validation and the JSON configuration file
//! - The delivery verdict state machine
//! - Mailbox poll sessions with a bounded retry budget
//! - The send orchestrator and run coordinator
//! - Mailbox maintenance (purge and dump)
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailprobe_core::{ConfigFile, Pop3Connector, Probe, RunCoordinator, SmtpTransmitter, Status};
//!
//! let config = ConfigFile::load(&ConfigFile::default_path()).await?;
//! let sending = config.endpoint("hisp-a")?;
//! let receiving = config.endpoint("hisp-b")?;
//! let probe = Probe::between(Probe::generate_subject("mailprobe"), sending, receiving);
//!
//! let coordinator = RunCoordinator::new(
//!     SmtpTransmitter::new(&config.run.client_hostname),
//!     Pop3Connector::new(),
//!     config.run.clone(),
//! );
//! coordinator
//!     .run(|outcome| println!("{outcome:?}"), sending, receiving, &probe, Status::Completed)
//!     .await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod endpoint;
mod error;
pub mod mailbox;
pub mod maintenance;
pub mod orchestrator;
pub mod poll;
pub mod probe;
pub mod tls;
pub mod transmit;
pub mod verdict;

pub use config::{ConfigFile, RetryPolicy, RunConfig};
pub use coordinator::RunCoordinator;
pub use endpoint::{
    Endpoint, Pop3Leg, Security, SmtpLeg, Timeouts, ValidationError, ValidationResult,
    validate_endpoint,
};
pub use error::{ProbeError, Result};
pub use mailbox::{MailboxConnector, MailboxEntry, MailboxSession, Pop3Connector, Pop3Session};
pub use maintenance::{MessageSummary, dump_mailbox, purge_mailbox};
pub use orchestrator::{Polled, SendOrchestrator};
pub use poll::{InboxSnapshot, Outcome, PollSession, Tick};
pub use probe::Probe;
pub use transmit::{SmtpTransmitter, Transmitter};
pub use verdict::{Completion, DeliveryVerdict, Evidence, Offer, Report, Status};
