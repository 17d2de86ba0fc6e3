//! Email record model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// Unique identifier for an email record within a tenant partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailId(pub i64);

impl std::fmt::Display for EmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Alert priority derived from keyword classification.
///
/// Ordering is fixed: high > medium > low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Urgent, page-someone material.
    High,
    /// Worth a prompt look.
    Medium,
    /// Everything else; also the tier when no keyword matches.
    #[default]
    Low,
}

impl Priority {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Numeric rank for tier comparisons (higher = more urgent).
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    /// Uppercase tag used in rendered alerts.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// Processing status of an email record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmailStatus {
    /// Persisted, dispatch not yet attempted.
    #[default]
    Pending,
    /// Assigned to a user for handling.
    Processing,
    /// At least one notification was delivered.
    Sent,
    /// Every eligible delivery failed permanently.
    Failed,
    /// No destination was eligible for this record.
    Ignored,
}

impl EmailStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "processing" => Self::Processing,
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            "ignored" => Self::Ignored,
            _ => Self::Pending,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Ignored => "ignored",
        }
    }
}

/// An email persisted in a tenant partition.
///
/// Created only by the ingestion worker; status and assignment are mutated
/// only by the dispatcher. Records are never deleted by the core.
#[derive(Debug, Clone)]
pub struct EmailRecord {
    /// Unique identifier (None for unsaved records).
    pub id: Option<EmailId>,
    /// Source-provided message identifier, unique within the tenant.
    pub message_id: String,
    /// Sender address.
    pub sender: String,
    /// Recipient address(es), comma-joined.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
    /// When the message was received by the mailbox.
    pub received_at: DateTime<Utc>,
    /// Derived alert priority.
    pub priority: Priority,
    /// Processing status.
    pub status: EmailStatus,
    /// User assigned to handle this record, if any.
    pub assigned_to: Option<UserId>,
    /// Error detail when dispatch permanently failed.
    pub error_message: Option<String>,
    /// When the alert was delivered.
    pub sent_at: Option<DateTime<Utc>>,
}

impl EmailRecord {
    /// Whether this record still awaits dispatch.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, EmailStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_roundtrip() {
        for priority in [Priority::High, Priority::Medium, Priority::Low] {
            assert_eq!(Priority::parse(priority.as_str()), priority);
        }
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High.rank() > Priority::Medium.rank());
        assert!(Priority::Medium.rank() > Priority::Low.rank());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            EmailStatus::Pending,
            EmailStatus::Processing,
            EmailStatus::Sent,
            EmailStatus::Failed,
            EmailStatus::Ignored,
        ] {
            assert_eq!(EmailStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_unknown_strings_fall_back() {
        assert_eq!(Priority::parse("critical"), Priority::Low);
        assert_eq!(EmailStatus::parse("bogus"), EmailStatus::Pending);
    }
}
