//! # mailwarden-mailbox
//!
//! Minimal async IMAP4 client used by the MailWarden ingestion worker.
//!
//! The surface is deliberately small: connect (implicit TLS or plaintext),
//! authenticate, select a folder, list unseen messages, fetch the header
//! fields and text body of a message, and flag it seen. Everything else the
//! protocol offers is out of scope for mailbox polling.
//!
//! TLS is pure Rust (`tokio-rustls` with the `webpki-roots` trust store).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod command;
mod error;
mod message;
mod parser;
mod session;
mod stream;

pub use error::{Error, Result};
pub use message::RawMessage;
pub use session::Session;
pub use stream::{MailStream, connect};
