//! Chat destination storage in the shared partition.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

use super::model::{AlertFilter, ChatDestination, ChatKind};
use crate::Result;
use crate::partition::TenantId;

/// Repository for chat destinations.
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    /// Create a repository over the shared partition pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a destination and return it with its id assigned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails (including a chat
    /// identifier already bound elsewhere).
    pub async fn insert(&self, destination: &ChatDestination) -> Result<ChatDestination> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r"
            INSERT INTO chat_destinations
                (tenant_id, chat_id, name, kind, alert_filter, email_alerts,
                 system_alerts, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(destination.tenant_id.0)
        .bind(destination.chat_id)
        .bind(&destination.name)
        .bind(destination.kind.as_str())
        .bind(destination.alert_filter.as_str())
        .bind(destination.email_alerts)
        .bind(destination.system_alerts)
        .bind(destination.is_active)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let mut saved = destination.clone();
        saved.id = Some(result.last_insert_rowid());
        Ok(saved)
    }

    /// Fetch a destination by its system-wide chat identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_by_chat_id(&self, chat_id: i64) -> Result<Option<ChatDestination>> {
        let row = sqlx::query(
            r"
            SELECT id, tenant_id, chat_id, name, kind, alert_filter,
                   email_alerts, system_alerts, is_active
            FROM chat_destinations
            WHERE chat_id = ?
            ",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_destination))
    }

    /// List a tenant's destinations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_for_tenant(&self, tenant: TenantId) -> Result<Vec<ChatDestination>> {
        let rows = sqlx::query(
            r"
            SELECT id, tenant_id, chat_id, name, kind, alert_filter,
                   email_alerts, system_alerts, is_active
            FROM chat_destinations
            WHERE tenant_id = ?
            ORDER BY name
            ",
        )
        .bind(tenant.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_destination).collect())
    }

    /// List a tenant's destinations that take email alerts at all.
    ///
    /// The per-record priority filter is applied by the caller via
    /// [`ChatDestination::wants_email_alert`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_email_recipients(&self, tenant: TenantId) -> Result<Vec<ChatDestination>> {
        let rows = sqlx::query(
            r"
            SELECT id, tenant_id, chat_id, name, kind, alert_filter,
                   email_alerts, system_alerts, is_active
            FROM chat_destinations
            WHERE tenant_id = ? AND is_active = 1 AND email_alerts = 1
            ",
        )
        .bind(tenant.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_destination).collect())
    }

    /// List every destination across all tenants (reconciler sweep).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_all(&self) -> Result<Vec<ChatDestination>> {
        let rows = sqlx::query(
            r"
            SELECT id, tenant_id, chat_id, name, kind, alert_filter,
                   email_alerts, system_alerts, is_active
            FROM chat_destinations
            ORDER BY tenant_id, chat_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_destination).collect())
    }

    /// Insert a destination inside an open transaction (binding redemption).
    ///
    /// Returns the new row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn insert_on(
        conn: &mut sqlx::SqliteConnection,
        destination: &ChatDestination,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r"
            INSERT INTO chat_destinations
                (tenant_id, chat_id, name, kind, alert_filter, email_alerts,
                 system_alerts, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(destination.tenant_id.0)
        .bind(destination.chat_id)
        .bind(&destination.name)
        .bind(destination.kind.as_str())
        .bind(destination.alert_filter.as_str())
        .bind(destination.email_alerts)
        .bind(destination.system_alerts)
        .bind(destination.is_active)
        .bind(&now)
        .bind(&now)
        .execute(conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Reactivate an inactive destination inside an open transaction
    /// (binding redemption reusing an existing same-tenant row).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn reactivate_on(
        conn: &mut sqlx::SqliteConnection,
        destination: &ChatDestination,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE chat_destinations
            SET is_active = 1, name = ?, kind = ?, updated_at = ?
            WHERE chat_id = ? AND tenant_id = ?
            ",
        )
        .bind(&destination.name)
        .bind(destination.kind.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(destination.chat_id)
        .bind(destination.tenant_id.0)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Delete a destination by chat identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete_by_chat_id(&self, chat_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM chat_destinations WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Convert a database row to a `ChatDestination`.
fn row_to_destination(row: &SqliteRow) -> ChatDestination {
    ChatDestination {
        id: Some(row.get("id")),
        tenant_id: TenantId::new(row.get("tenant_id")),
        chat_id: row.get("chat_id"),
        name: row.get("name"),
        kind: ChatKind::parse(row.get("kind")),
        alert_filter: AlertFilter::parse(row.get("alert_filter")),
        email_alerts: row.get("email_alerts"),
        system_alerts: row.get("system_alerts"),
        is_active: row.get("is_active"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::partition::{PartitionStore, Tenant};

    async fn store_with_tenant() -> (PartitionStore, TenantId) {
        let store = PartitionStore::in_memory().await.unwrap();
        let tenant = store
            .create_tenant(Tenant::new("acme", "Acme", None))
            .await
            .unwrap();
        let id = tenant.id.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let (store, tenant) = store_with_tenant().await;
        let repo = ChatRepository::new(store.shared().clone());

        let saved = repo
            .insert(&ChatDestination::new(tenant, 100, "ops", ChatKind::Group))
            .await
            .unwrap();
        assert!(saved.id.is_some());

        let found = repo.get_by_chat_id(100).await.unwrap().unwrap();
        assert_eq!(found.tenant_id, tenant);
        assert_eq!(found.kind, ChatKind::Group);
    }

    #[tokio::test]
    async fn test_chat_id_unique_system_wide() {
        let (store, tenant) = store_with_tenant().await;
        let other = store
            .create_tenant(Tenant::new("beta", "Beta", None))
            .await
            .unwrap()
            .id
            .unwrap();
        let repo = ChatRepository::new(store.shared().clone());

        repo.insert(&ChatDestination::new(tenant, 100, "ops", ChatKind::Group))
            .await
            .unwrap();

        let err = repo
            .insert(&ChatDestination::new(other, 100, "dup", ChatKind::Group))
            .await;
        assert!(err.is_err(), "a chat may belong to at most one tenant");
    }

    #[tokio::test]
    async fn test_email_recipients_filtering() {
        let (store, tenant) = store_with_tenant().await;
        let repo = ChatRepository::new(store.shared().clone());

        repo.insert(&ChatDestination::new(tenant, 1, "active", ChatKind::Private))
            .await
            .unwrap();

        let mut muted = ChatDestination::new(tenant, 2, "muted", ChatKind::Private);
        muted.email_alerts = false;
        repo.insert(&muted).await.unwrap();

        let mut inactive = ChatDestination::new(tenant, 3, "inactive", ChatKind::Private);
        inactive.is_active = false;
        repo.insert(&inactive).await.unwrap();

        let recipients = repo.list_email_recipients(tenant).await.unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].chat_id, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, tenant) = store_with_tenant().await;
        let repo = ChatRepository::new(store.shared().clone());

        repo.insert(&ChatDestination::new(tenant, 100, "ops", ChatKind::Group))
            .await
            .unwrap();
        repo.delete_by_chat_id(100).await.unwrap();
        assert!(repo.get_by_chat_id(100).await.unwrap().is_none());
    }
}
