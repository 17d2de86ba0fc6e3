//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No active tenant matches the identifier or routing key.
    #[error("Unknown tenant: {0}")]
    UnknownTenant(String),

    /// A partition with this identifier is already provisioned.
    #[error("Partition already provisioned: {0}")]
    DuplicatePartition(String),

    /// Mailbox connection or protocol failure.
    #[error("Mailbox connection failed: {0}")]
    Connection(#[from] mailwarden_mailbox::Error),

    /// Chat delivery failure.
    #[error("Delivery failed: {0}")]
    Delivery(#[from] mailwarden_chat::SendError),

    /// Binding code does not exist or was already used.
    #[error("Binding code is invalid or already used")]
    InvalidCode,

    /// Binding code exists but its time-to-live has elapsed.
    #[error("Binding code has expired")]
    ExpiredCode,

    /// The chat is already actively bound to this tenant.
    #[error("Chat is already registered to this tenant")]
    AlreadyRegistered,

    /// The chat is bound to a different tenant.
    #[error("Chat is already bound to another tenant")]
    ChatAlreadyBound,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
