//! User model types.

use serde::{Deserialize, Serialize};

/// Unique identifier for a user within a tenant partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a user within their tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserRole {
    /// Manages the tenant's alert handling.
    Manager,
    /// Oversees day-to-day processing.
    Supervisor,
    /// Regular recipient.
    #[default]
    Client,
}

impl UserRole {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "manager" => Self::Manager,
            "supervisor" => Self::Supervisor,
            _ => Self::Client,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Supervisor => "supervisor",
            Self::Client => "client",
        }
    }
}

/// A user inside a tenant partition.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique identifier (None for unsaved users).
    pub id: Option<UserId>,
    /// Full name.
    pub name: String,
    /// Contact email, unique within the tenant. Binding codes target users
    /// through this value, never through a cross-partition foreign key.
    pub email: String,
    /// Phone number with country code, if known.
    pub phone: Option<String>,
    /// Bound chat identifier in the shared partition, if any.
    pub chat_id: Option<i64>,
    /// Role within the tenant.
    pub role: UserRole,
    /// Whether the user is active.
    pub is_active: bool,
    /// Whether the user may receive alerts at all.
    pub alerts_enabled: bool,
}

impl User {
    /// Create a new active user, not yet persisted.
    #[must_use]
    pub fn new(name: &str, email: &str, role: UserRole) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            email: email.to_lowercase(),
            phone: None,
            chat_id: None,
            role,
            is_active: true,
            alerts_enabled: true,
        }
    }

    /// Whether the user has a bound chat.
    #[must_use]
    pub const fn has_chat(&self) -> bool {
        self.chat_id.is_some()
    }
}
