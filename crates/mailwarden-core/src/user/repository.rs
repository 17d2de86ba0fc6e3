//! User storage within a tenant partition.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use super::model::{User, UserId, UserRole};
use crate::Result;
use crate::partition::TenantPartition;

/// Repository for users.
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Create a repository over a tenant partition.
    #[must_use]
    pub fn new(partition: &TenantPartition) -> Self {
        Self {
            pool: partition.pool().clone(),
        }
    }

    /// Insert a user and return it with its id assigned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails (including a
    /// duplicate email).
    pub async fn insert(&self, user: &User) -> Result<User> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r"
            INSERT INTO users
                (name, email, phone, chat_id, role, is_active, alerts_enabled,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.chat_id)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.alerts_enabled)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let mut saved = user.clone();
        saved.id = Some(UserId(result.last_insert_rowid()));
        Ok(saved)
    }

    /// Fetch a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r"
            SELECT id, name, email, phone, chat_id, role, is_active, alerts_enabled
            FROM users
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_user))
    }

    /// Fetch a user by contact email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let normalized = email.to_lowercase();
        let row = sqlx::query(
            r"
            SELECT id, name, email, phone, chat_id, role, is_active, alerts_enabled
            FROM users
            WHERE email = ?
            ",
        )
        .bind(&normalized)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_user))
    }

    /// Whether any user in this partition references the chat.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn exists_with_chat(&self, chat_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS one FROM users WHERE chat_id = ? LIMIT 1")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    /// Set or clear a user's bound chat reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn set_chat(&self, id: UserId, chat_id: Option<i64>) -> Result<()> {
        sqlx::query(
            r"
            UPDATE users
            SET chat_id = ?, updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(chat_id)
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Clear the chat reference from every user pointing at `chat_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn clear_chat(&self, chat_id: i64) -> Result<()> {
        sqlx::query(
            r"
            UPDATE users
            SET chat_id = NULL, updated_at = ?
            WHERE chat_id = ?
            ",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a user row.
    ///
    /// Callers should go through [`super::UserDirectory::remove_user`], which
    /// runs the registered removal hooks first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete(&self, id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Convert a database row to a `User`.
fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: Some(UserId(row.get("id"))),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        chat_id: row.get("chat_id"),
        role: UserRole::parse(row.get("role")),
        is_active: row.get("is_active"),
        alerts_enabled: row.get("alerts_enabled"),
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
    async fn test_insert_and_lookup() {
        let (_store, partition) = test_partition().await;
        let repo = UserRepository::new(&partition);

        let saved = repo
            .insert(&User::new("Ana", "ana@acme.example", UserRole::Manager))
            .await
            .unwrap();

        let by_id = repo.get(saved.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(by_id.name, "Ana");

        let by_email = repo.get_by_email("ANA@acme.example").await.unwrap().unwrap();
        assert_eq!(by_email.id, saved.id);
    }

    #[tokio::test]
    async fn test_chat_reference() {
        let (_store, partition) = test_partition().await;
        let repo = UserRepository::new(&partition);
        let saved = repo
            .insert(&User::new("Ana", "ana@acme.example", UserRole::Client))
            .await
            .unwrap();
        let id = saved.id.unwrap();

        assert!(!repo.exists_with_chat(777).await.unwrap());

        repo.set_chat(id, Some(777)).await.unwrap();
        assert!(repo.exists_with_chat(777).await.unwrap());
        assert!(repo.get(id).await.unwrap().unwrap().has_chat());

        repo.set_chat(id, None).await.unwrap();
        assert!(!repo.exists_with_chat(777).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_store, partition) = test_partition().await;
        let repo = UserRepository::new(&partition);
        let saved = repo
            .insert(&User::new("Ana", "ana@acme.example", UserRole::Client))
            .await
            .unwrap();
        let id = saved.id.unwrap();

        repo.delete(id).await.unwrap();
        assert!(repo.get(id).await.unwrap().is_none());
    }
}
