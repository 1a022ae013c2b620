//! Endpoint descriptors.
//!
//! An endpoint is one mail server under test: the SMTP leg the probe is
//! submitted through and the POP3 leg its mailbox is polled through.

mod model;
mod validation;

pub use model::{Endpoint, Pop3Leg, Security, SmtpLeg, Timeouts};
pub use validation::{ValidationError, ValidationResult, validate_endpoint};
