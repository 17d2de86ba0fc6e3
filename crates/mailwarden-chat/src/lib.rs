//! # mailwarden-chat
//!
//! Chat delivery client for MailWarden alert fan-out.
//!
//! Wraps the Bot HTTP API: one call, `send`, delivering rendered alert text
//! to a chat identifier, with failures classified into the retryable and
//! permanent kinds the dispatcher's backoff policy distinguishes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod error;

pub use client::{BotClient, escape_html};
pub use error::SendError;
