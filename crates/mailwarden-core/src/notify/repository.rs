//! Notification message storage in the shared partition.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

use super::model::{DeliveryStatus, NotificationId, NotificationMessage};
use crate::Result;
use crate::email::EmailId;
use crate::partition::TenantId;

/// Repository for notification messages.
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    /// Create a repository over the shared partition pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Claim the (email, chat) pair, creating the pending notification row.
    ///
    /// The UNIQUE(tenant, email, chat) constraint plus the conflict-ignoring
    /// insert make this the atomic at-most-once gate: a second trigger for
    /// the same pair gets `None` and must not deliver.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn claim(
        &self,
        tenant: TenantId,
        email: EmailId,
        chat_id: i64,
        body: &str,
    ) -> Result<Option<NotificationId>> {
        let result = sqlx::query(
            r"
            INSERT INTO notification_messages
                (tenant_id, email_id, chat_id, body, status, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?)
            ON CONFLICT(tenant_id, email_id, chat_id) DO NOTHING
            ",
        )
        .bind(tenant.0)
        .bind(email.0)
        .bind(chat_id)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(NotificationId(result.last_insert_rowid())))
    }

    /// Fetch a notification by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: NotificationId) -> Result<Option<NotificationMessage>> {
        let row = sqlx::query(
            r"
            SELECT id, tenant_id, email_id, chat_id, body, status,
                   provider_message_id, error_message, retry_count, sent_at
            FROM notification_messages
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_message))
    }

    /// List the notifications for one email record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_for_email(
        &self,
        tenant: TenantId,
        email: EmailId,
    ) -> Result<Vec<NotificationMessage>> {
        let rows = sqlx::query(
            r"
            SELECT id, tenant_id, email_id, chat_id, body, status,
                   provider_message_id, error_message, retry_count, sent_at
            FROM notification_messages
            WHERE tenant_id = ? AND email_id = ?
            ORDER BY chat_id
            ",
        )
        .bind(tenant.0)
        .bind(email.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_message).collect())
    }

    /// List a tenant's permanently failed notifications for manual follow-up.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_failed(&self, tenant: TenantId) -> Result<Vec<NotificationMessage>> {
        let rows = sqlx::query(
            r"
            SELECT id, tenant_id, email_id, chat_id, body, status,
                   provider_message_id, error_message, retry_count, sent_at
            FROM notification_messages
            WHERE tenant_id = ? AND status = 'failed'
            ORDER BY id
            ",
        )
        .bind(tenant.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_message).collect())
    }

    /// Mark a notification delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_sent(
        &self,
        id: NotificationId,
        provider_message_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE notification_messages
            SET status = 'sent', provider_message_id = ?, sent_at = ?
            WHERE id = ?
            ",
        )
        .bind(provider_message_id)
        .bind(sent_at.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a transient failure and count the retry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_retry(&self, id: NotificationId, error: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE notification_messages
            SET status = 'retry', error_message = ?, retry_count = retry_count + 1
            WHERE id = ?
            ",
        )
        .bind(error)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark a notification permanently failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_failed(&self, id: NotificationId, error: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE notification_messages
            SET status = 'failed', error_message = ?
            WHERE id = ?
            ",
        )
        .bind(error)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Convert a database row to a `NotificationMessage`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_message(row: &SqliteRow) -> NotificationMessage {
    NotificationMessage {
        id: Some(NotificationId(row.get("id"))),
        tenant_id: TenantId::new(row.get("tenant_id")),
        email_id: EmailId(row.get("email_id")),
        chat_id: row.get("chat_id"),
        body: row.get("body"),
        status: DeliveryStatus::parse(row.get("status")),
        provider_message_id: row.get("provider_message_id"),
        error_message: row.get("error_message"),
        retry_count: row.get::<i64, _>("retry_count") as u32,
        sent_at: row
            .get::<Option<String>, _>("sent_at")
            .and_then(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }),
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
        (store, tenant.id.unwrap())
    }

    #[tokio::test]
    async fn test_claim_is_at_most_once() {
        let (store, tenant) = store_with_tenant().await;
        let repo = NotificationRepository::new(store.shared().clone());

        let first = repo.claim(tenant, EmailId(1), 100, "alert").await.unwrap();
        assert!(first.is_some());

        let second = repo.claim(tenant, EmailId(1), 100, "alert").await.unwrap();
        assert!(second.is_none(), "one notification per (email, chat)");

        // A different chat for the same email is a separate claim.
        let other_chat = repo.claim(tenant, EmailId(1), 101, "alert").await.unwrap();
        assert!(other_chat.is_some());
    }

    #[tokio::test]
    async fn test_status_lifecycle() {
        let (store, tenant) = store_with_tenant().await;
        let repo = NotificationRepository::new(store.shared().clone());
        let id = repo
            .claim(tenant, EmailId(1), 100, "alert")
            .await
            .unwrap()
            .unwrap();

        repo.mark_retry(id, "rate limited").await.unwrap();
        repo.mark_retry(id, "rate limited").await.unwrap();
        let found = repo.get(id).await.unwrap().unwrap();
        assert_eq!(found.status, DeliveryStatus::Retry);
        assert_eq!(found.retry_count, 2);

        repo.mark_sent(id, 424_242, Utc::now()).await.unwrap();
        let found = repo.get(id).await.unwrap().unwrap();
        assert_eq!(found.status, DeliveryStatus::Sent);
        assert_eq!(found.provider_message_id, Some(424_242));
        assert!(found.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_listing() {
        let (store, tenant) = store_with_tenant().await;
        let repo = NotificationRepository::new(store.shared().clone());

        let id = repo
            .claim(tenant, EmailId(1), 100, "alert")
            .await
            .unwrap()
            .unwrap();
        repo.mark_failed(id, "forbidden").await.unwrap();

        let failed = repo.list_failed(tenant).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error_message.as_deref(), Some("forbidden"));
    }
}
