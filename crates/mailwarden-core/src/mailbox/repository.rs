//! Mailbox configuration storage within a tenant partition.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use super::model::{MailboxConfig, MailboxConfigId};
use crate::Result;
use crate::partition::TenantPartition;

/// Repository for mailbox configurations.
pub struct MailboxRepository {
    pool: SqlitePool,
}

impl MailboxRepository {
    /// Create a repository over a tenant partition.
    #[must_use]
    pub fn new(partition: &TenantPartition) -> Self {
        Self {
            pool: partition.pool().clone(),
        }
    }

    /// Insert a configuration and return it with its id assigned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails (including a
    /// duplicate configuration name).
    pub async fn insert(&self, config: &MailboxConfig) -> Result<MailboxConfig> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r"
            INSERT INTO mailbox_configs
                (name, host, port, username, password, use_tls, folder,
                 poll_interval_secs, max_per_poll, is_active, last_checked,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&config.name)
        .bind(&config.host)
        .bind(i64::from(config.port))
        .bind(&config.username)
        .bind(&config.password)
        .bind(config.use_tls)
        .bind(&config.folder)
        .bind(i64::from(config.poll_interval_secs))
        .bind(i64::from(config.max_per_poll))
        .bind(config.is_active)
        .bind(config.last_checked.map(|t| t.to_rfc3339()))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let mut saved = config.clone();
        saved.id = Some(MailboxConfigId(result.last_insert_rowid()));
        Ok(saved)
    }

    /// Fetch a configuration by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: MailboxConfigId) -> Result<Option<MailboxConfig>> {
        let row = sqlx::query(
            r"
            SELECT id, name, host, port, username, password, use_tls, folder,
                   poll_interval_secs, max_per_poll, is_active, last_checked
            FROM mailbox_configs
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_config))
    }

    /// List the configurations the scheduler should poll.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_active(&self) -> Result<Vec<MailboxConfig>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, host, port, username, password, use_tls, folder,
                   poll_interval_secs, max_per_poll, is_active, last_checked
            FROM mailbox_configs
            WHERE is_active = 1
            ORDER BY name
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_config).collect())
    }

    /// Record that a poll completed successfully at `checked_at`.
    ///
    /// Called only after both the connection and the fetch succeeded; a
    /// failed run leaves the previous value untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_checked(
        &self,
        id: MailboxConfigId,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE mailbox_configs
            SET last_checked = ?, updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(checked_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Convert a database row to a `MailboxConfig`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> MailboxConfig {
    MailboxConfig {
        id: Some(MailboxConfigId(row.get("id"))),
        name: row.get("name"),
        host: row.get("host"),
        port: row.get::<i64, _>("port") as u16,
        username: row.get("username"),
        password: row.get("password"),
        use_tls: row.get("use_tls"),
        folder: row.get("folder"),
        poll_interval_secs: row.get::<i64, _>("poll_interval_secs") as u32,
        max_per_poll: row.get::<i64, _>("max_per_poll") as u32,
        is_active: row.get("is_active"),
        last_checked: row
            .get::<Option<String>, _>("last_checked")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::partition::{PartitionStore, Tenant};

    async fn test_partition() -> (PartitionStore, TenantPartition) {
        let store = PartitionStore::in_memory().await.unwrap();
        let tenant = store
            .create_tenant(Tenant::new("acme", "Acme", None))
            .await
            .unwrap();
        let partition = store.resolve(tenant.id.unwrap()).await.unwrap();
        (store, partition)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (_store, partition) = test_partition().await;
        let repo = MailboxRepository::new(&partition);

        let saved = repo
            .insert(&MailboxConfig::new("main", "imap.example.com", "user", "pass"))
            .await
            .unwrap();
        let id = saved.id.unwrap();

        let found = repo.get(id).await.unwrap().unwrap();
        assert_eq!(found.host, "imap.example.com");
        assert_eq!(found.port, 993);
        assert!(found.last_checked.is_none());
    }

    #[tokio::test]
    async fn test_mark_checked() {
        let (_store, partition) = test_partition().await;
        let repo = MailboxRepository::new(&partition);

        let saved = repo
            .insert(&MailboxConfig::new("main", "imap.example.com", "user", "pass"))
            .await
            .unwrap();
        let id = saved.id.unwrap();

        let now = Utc::now();
        repo.mark_checked(id, now).await.unwrap();

        let found = repo.get(id).await.unwrap().unwrap();
        let checked = found.last_checked.unwrap();
        assert_eq!(checked.timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn test_list_active_skips_disabled() {
        let (_store, partition) = test_partition().await;
        let repo = MailboxRepository::new(&partition);

        repo.insert(&MailboxConfig::new("a", "h", "u", "p"))
            .await
            .unwrap();
        let mut disabled = MailboxConfig::new("b", "h", "u", "p");
        disabled.is_active = false;
        repo.insert(&disabled).await.unwrap();

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "a");
    }
}
