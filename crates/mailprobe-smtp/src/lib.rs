//! # mailprobe-smtp
//!
//! SMTP submission client (RFC 5321) used to transmit delivery probes.
//!
//! ## Features
//!
//! - **Type-state connection management**: Compile-time enforcement of valid
//!   SMTP state transitions
//! - **Generic transport**: Any `AsyncRead + AsyncWrite` stream, so sessions
//!   can be scripted in tests
//! - **TLS support**: Implicit TLS (port 465) and STARTTLS with a caller
//!   supplied `TlsConnector`
//! - **Authentication**: PLAIN and LOGIN
//! - **Partial recipient failure**: Refused recipients are reported instead of
//!   aborting the transaction while at least one is accepted
//! - **DSN**: Optional `NOTIFY=` on RCPT when the server advertises DSN
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailprobe_smtp::{Address, Client};
//! use mailprobe_smtp::stream::{connect_tls, default_tls_connector};
//!
//! let stream = connect_tls("smtp.hisp-a.example", 465, &default_tls_connector()).await?;
//! let client = Client::from_stream(stream).await?;
//! let client = client.ehlo("probe.local").await?;
//! let client = client.auth_plain("user", "secret").await?;
//! let client = client.mail_from(&Address::new("sender@hisp-a.example")?).await?;
//! let (client, refused) = client
//!     .recipients(&[Address::new("inbox@hisp-b.example")?], None)
//!     .await?;
//! let client = client.data().await?;
//! let client = client.send_message(b"Subject: T1-abc\r\n\r\nhello\r\n").await?;
//! client.quit().await?;
//! ```
//!
//! ## Connection States
//!
//! ```text
//! Connected ── auth_*() ──→ Authenticated
//!     │                          │
//!     └──── mail_from() ─────────┴──→ MailTransaction ── recipients() ──→ RecipientAdded
//!                                                                            │
//!                        Connected ←── send_message() ── Data ←── data() ────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod client;
pub mod command;
mod error;
mod extension;
pub mod reply;
pub mod stream;

pub use address::Address;
pub use client::{
    Authenticated, Client, Connected, Data, MailTransaction, RecipientAdded, RefusedRecipient,
    ServerInfo,
};
pub use error::{Error, Result};
pub use extension::{AuthMechanism, Extension};
pub use reply::{Reply, ReplyCode};
pub use stream::SmtpStream;
