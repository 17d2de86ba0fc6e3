//! Chat destination model types.

use crate::email::Priority;
use crate::partition::TenantId;

/// Kind of chat endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatKind {
    /// One-on-one chat.
    #[default]
    Private,
    /// Group chat.
    Group,
    /// Broadcast channel.
    Channel,
}

impl ChatKind {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "group" | "supergroup" => Self::Group,
            "channel" => Self::Channel,
            _ => Self::Private,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Channel => "channel",
        }
    }
}

/// Which alert priorities a destination accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertFilter {
    /// Every priority.
    #[default]
    All,
    /// Only high.
    High,
    /// Medium and above.
    Medium,
    /// Low and above (everything, under the fixed ordering).
    Low,
}

impl AlertFilter {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::All,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Whether a record at `priority` passes this filter.
    ///
    /// A tier accepts records at or above its own level; `All` accepts
    /// everything.
    #[must_use]
    pub const fn accepts(self, priority: Priority) -> bool {
        match self {
            Self::All => true,
            Self::High => priority.rank() >= Priority::High.rank(),
            Self::Medium => priority.rank() >= Priority::Medium.rank(),
            Self::Low => priority.rank() >= Priority::Low.rank(),
        }
    }
}

/// A chat endpoint bound to a tenant.
#[derive(Debug, Clone)]
pub struct ChatDestination {
    /// Surrogate row id (None for unsaved destinations).
    pub id: Option<i64>,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Provider chat identifier, unique system-wide.
    pub chat_id: i64,
    /// Human-readable name.
    pub name: String,
    /// Kind of endpoint.
    pub kind: ChatKind,
    /// Priority filter for email alerts.
    pub alert_filter: AlertFilter,
    /// Receive alerts for new emails.
    pub email_alerts: bool,
    /// Receive system/operational alerts.
    pub system_alerts: bool,
    /// Whether the destination receives anything at all.
    pub is_active: bool,
}

impl ChatDestination {
    /// Create an active destination with default alert settings.
    #[must_use]
    pub fn new(tenant_id: TenantId, chat_id: i64, name: &str, kind: ChatKind) -> Self {
        Self {
            id: None,
            tenant_id,
            chat_id,
            name: name.to_string(),
            kind,
            alert_filter: AlertFilter::All,
            email_alerts: true,
            system_alerts: false,
            is_active: true,
        }
    }

    /// Whether this destination should receive an email alert at `priority`.
    #[must_use]
    pub const fn wants_email_alert(&self, priority: Priority) -> bool {
        self.is_active && self.email_alerts && self.alert_filter.accepts(priority)
    }
}
