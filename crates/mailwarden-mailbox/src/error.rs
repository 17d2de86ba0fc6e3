//! Error types for the mailbox client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a mailbox server.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Authentication was rejected by the server.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned NO for a command.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD for a command.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Operation did not complete within the configured timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
