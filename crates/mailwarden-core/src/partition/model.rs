//! Tenant model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub i64);

impl TenantId {
    /// Create a new tenant ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An isolated organization whose data lives in its own partition.
#[derive(Debug, Clone)]
pub struct Tenant {
    /// Unique identifier (None for unsaved tenants).
    pub id: Option<TenantId>,
    /// Partition identifier; also the tenant database file name stem.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Inbound routing domain, if mail is routed by domain.
    pub domain: Option<String>,
    /// Whether the tenant is active. Inactive tenants resolve to
    /// `UnknownTenant` and are skipped by every scheduled task.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Tenant {
    /// Create a new active tenant, not yet persisted.
    #[must_use]
    pub fn new(slug: &str, name: &str, domain: Option<&str>) -> Self {
        Self {
            id: None,
            slug: slug.to_lowercase(),
            name: name.to_string(),
            domain: domain.map(str::to_lowercase),
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }
}
