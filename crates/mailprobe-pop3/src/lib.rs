//! # mailprobe-pop3
//!
//! POP3 client (RFC 1939) used to poll the mailboxes a delivery probe lands in.
//!
//! ## Features
//!
//! - **Type-state connection management**: `Authorization` and `Transaction`
//!   states are enforced at compile time
//! - **Generic transport**: Any `AsyncRead + AsyncWrite` stream
//! - **TLS support**: Implicit TLS (port 995) and `STLS` (RFC 2595)
//! - **Raw retrieval**: `RETR` returns message bytes with dot-stuffing removed
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailprobe_pop3::Client;
//! use mailprobe_pop3::stream::{connect_tls, default_tls_connector};
//!
//! let stream = connect_tls("pop.hisp-b.example", 995, &default_tls_connector()).await?;
//! let client = Client::from_stream(stream).await?;
//! let mut client = client.login("inbox", "secret").await?;
//! for entry in client.list().await? {
//!     let raw = client.retr(entry.id).await?;
//!     client.dele(entry.id).await?;
//! }
//! client.quit().await?;
//! ```
//!
//! ## Connection States
//!
//! ```text
//! Authorization ── login() ──→ Transaction ── quit() ──→ (deletions committed)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
pub mod command;
mod error;
pub mod response;
pub mod stream;

pub use client::{Authorization, Client, DEFAULT_MAX_RESPONSE_SIZE, Transaction};
pub use error::{Error, Result};
pub use response::{ListEntry, Stat};
pub use stream::Pop3Stream;
