//! Binding code storage in the shared partition.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, SqliteConnection};

use super::model::BindingCode;
use crate::Result;
use crate::partition::TenantId;

/// Repository for binding codes.
pub struct BindingRepository {
    pool: SqlitePool,
}

impl BindingRepository {
    /// Create a repository over the shared partition pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a freshly issued code unless its value collides.
    ///
    /// Returns the row id, or `None` on a value collision (the issuer
    /// regenerates and retries).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn insert_new(&self, code: &BindingCode) -> Result<Option<i64>> {
        let result = sqlx::query(
            r"
            INSERT INTO binding_codes
                (code, tenant_id, target_contact, created_at, expires_at, used)
            VALUES (?, ?, ?, ?, ?, 0)
            ON CONFLICT(code) DO NOTHING
            ",
        )
        .bind(&code.code)
        .bind(code.tenant_id.0)
        .bind(&code.target_contact)
        .bind(code.created_at.to_rfc3339())
        .bind(code.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(result.last_insert_rowid()))
    }

    /// Fetch a code by its value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<BindingCode>> {
        let row = sqlx::query(
            r"
            SELECT id, code, tenant_id, target_contact, created_at, expires_at,
                   used, used_at, redeemed_chat_id
            FROM binding_codes
            WHERE code = ?
            ",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_code))
    }

    /// Flip a code from unused to used, recording the redeeming chat.
    ///
    /// This is the compare-and-swap at the heart of single redemption: the
    /// `used = 0` guard means exactly one of any number of concurrent
    /// redemption attempts observes `rows_affected == 1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_used_on(
        conn: &mut SqliteConnection,
        code: &str,
        chat_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE binding_codes
            SET used = 1, used_at = ?, redeemed_chat_id = ?
            WHERE code = ? AND used = 0
            ",
        )
        .bind(at.to_rfc3339())
        .bind(chat_id)
        .bind(code)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Whether a used code exists proving this chat was intentionally bound
    /// to the tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn used_exists_for_chat(&self, tenant: TenantId, chat_id: i64) -> Result<bool> {
        let row = sqlx::query(
            r"
            SELECT 1 AS one FROM binding_codes
            WHERE tenant_id = ? AND redeemed_chat_id = ? AND used = 1
            LIMIT 1
            ",
        )
        .bind(tenant.0)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Delete every code (used or unused) redeemed by this chat.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete_redeemed_by(&self, tenant: TenantId, chat_id: i64) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM binding_codes
            WHERE tenant_id = ? AND redeemed_chat_id = ?
            ",
        )
        .bind(tenant.0)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete every code (used or unused) targeting a user contact.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete_targeting(&self, tenant: TenantId, contact: &str) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM binding_codes
            WHERE tenant_id = ? AND target_contact = ?
            ",
        )
        .bind(tenant.0)
        .bind(contact.to_lowercase())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Convert a database row to a `BindingCode`.
fn row_to_code(row: &SqliteRow) -> BindingCode {
    BindingCode {
        id: Some(row.get("id")),
        code: row.get("code"),
        tenant_id: TenantId::new(row.get("tenant_id")),
        target_contact: row.get("target_contact"),
        created_at: parse_timestamp(row.get("created_at")).unwrap_or(DateTime::UNIX_EPOCH),
        expires_at: parse_timestamp(row.get("expires_at")).unwrap_or(DateTime::UNIX_EPOCH),
        used: row.get("used"),
        used_at: row
            .get::<Option<String>, _>("used_at")
            .and_then(parse_timestamp),
        redeemed_chat_id: row.get("redeemed_chat_id"),
    }
}

/// Parse an RFC 3339 timestamp column.
fn parse_timestamp(value: String) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
