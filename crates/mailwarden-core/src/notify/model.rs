//! Notification message model types.

use chrono::{DateTime, Utc};

use crate::email::EmailId;
use crate::partition::TenantId;

/// Unique identifier for a notification message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(pub i64);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery status of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryStatus {
    /// Claimed, delivery not yet attempted.
    #[default]
    Pending,
    /// Delivered; the provider message id is recorded.
    Sent,
    /// Permanently failed; surfaced for manual inspection.
    Failed,
    /// A transient failure occurred; another attempt is coming.
    Retry,
}

impl DeliveryStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            "retry" => Self::Retry,
            _ => Self::Pending,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Retry => "retry",
        }
    }
}

/// A notification of one email to one chat destination.
///
/// At most one exists per (tenant, email, chat); the claim is made before
/// any delivery attempt, which is what keeps alerts from duplicating when
/// the dispatcher is triggered twice.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    /// Unique identifier (None for unsaved messages).
    pub id: Option<NotificationId>,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Originating email record in the tenant partition.
    pub email_id: EmailId,
    /// Destination chat identifier.
    pub chat_id: i64,
    /// Rendered alert text as sent.
    pub body: String,
    /// Delivery status.
    pub status: DeliveryStatus,
    /// Provider-assigned message id on success.
    pub provider_message_id: Option<i64>,
    /// Last delivery error.
    pub error_message: Option<String>,
    /// Number of delivery attempts beyond the first.
    pub retry_count: u32,
    /// When delivery succeeded.
    pub sent_at: Option<DateTime<Utc>>,
}
