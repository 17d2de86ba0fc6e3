//! Mailbox configuration model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a mailbox configuration within a tenant partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailboxConfigId(pub i64);

impl std::fmt::Display for MailboxConfigId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tenant's mailbox connection settings, driving one ingestion worker.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Unique identifier (None for unsaved configurations).
    pub id: Option<MailboxConfigId>,
    /// Descriptive name, unique within the tenant.
    pub name: String,
    /// Server hostname.
    pub host: String,
    /// Server port (993 for implicit TLS).
    pub port: u16,
    /// Login username.
    pub username: String,
    /// Login password or app password.
    pub password: String,
    /// Use implicit TLS for the connection.
    pub use_tls: bool,
    /// Folder to poll.
    pub folder: String,
    /// Seconds between polls.
    pub poll_interval_secs: u32,
    /// Upper bound on messages processed per poll.
    pub max_per_poll: u32,
    /// Whether this configuration is polled at all.
    pub is_active: bool,
    /// When the last fully successful poll finished.
    pub last_checked: Option<DateTime<Utc>>,
}

impl MailboxConfig {
    /// Minimum allowed polling interval.
    pub const MIN_POLL_INTERVAL_SECS: u32 = 60;

    /// Create a new configuration with the usual defaults.
    #[must_use]
    pub fn new(name: &str, host: &str, username: &str, password: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            host: host.to_string(),
            port: 993,
            username: username.to_string(),
            password: password.to_string(),
            use_tls: true,
            folder: "INBOX".to_string(),
            poll_interval_secs: 300,
            max_per_poll: 50,
            is_active: true,
            last_checked: None,
        }
    }

    /// Whether a poll is due at `now`, given the configured interval.
    ///
    /// A configuration that has never been checked is always due.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.last_checked.is_none_or(|last| {
            let elapsed = now.signed_duration_since(last);
            elapsed.num_seconds() >= i64::from(self.effective_interval())
        })
    }

    /// The polling interval, clamped to the minimum.
    #[must_use]
    pub fn effective_interval(&self) -> u32 {
        self.poll_interval_secs.max(Self::MIN_POLL_INTERVAL_SECS)
    }
}
