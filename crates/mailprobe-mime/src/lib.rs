//! # mailprobe-mime
//!
//! The small slice of MIME that a delivery probe needs.
//!
//! ## Features
//!
//! - **Header parsing**: Unfolded, case-insensitive, order-preserving headers
//! - **Encoded words**: RFC 2047 `B` and `Q` decoding inside any header value,
//!   so `Undeliverable: =?utf-8?B?...?=` still yields a searchable subject
//! - **Message parsing**: Split a retrieved message into headers and raw body
//! - **Composition**: Build a probe message with an optional attachment
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailprobe_mime::{Message, MessageBuilder};
//!
//! let raw = MessageBuilder::new()
//!     .from("sender@hisp-a.example")
//!     .to("inbox@hisp-b.example")
//!     .subject("T1-abc")
//!     .text_body("interoperability probe")
//!     .build()?;
//!
//! let parsed = Message::parse(&raw)?;
//! assert_eq!(parsed.subject().as_deref(), Some("T1-abc"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod builder;
mod error;
mod header;
mod message;

pub mod encoding;

pub use builder::{Attachment, MessageBuilder};
pub use error::{Error, Result};
pub use header::Headers;
pub use message::Message;
