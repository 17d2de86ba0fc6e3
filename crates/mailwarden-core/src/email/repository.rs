//! Email record storage within a tenant partition.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use super::model::{EmailId, EmailRecord, EmailStatus, Priority};
use crate::Result;
use crate::partition::TenantPartition;
use crate::user::UserId;

/// Filters for listing email records.
#[derive(Debug, Clone, Default)]
pub struct EmailFilter {
    /// Only records in this status.
    pub status: Option<EmailStatus>,
    /// Only records at this priority.
    pub priority: Option<Priority>,
    /// Cap on returned rows (newest first).
    pub limit: Option<u32>,
}

/// Repository for email records.
pub struct EmailRepository {
    pool: SqlitePool,
}

impl EmailRepository {
    /// Create a repository over a tenant partition.
    #[must_use]
    pub fn new(partition: &TenantPartition) -> Self {
        Self {
            pool: partition.pool().clone(),
        }
    }

    /// Insert a record unless its message identifier is already present.
    ///
    /// This is the dedup point: the UNIQUE(message_id) constraint plus the
    /// conflict-ignoring insert make the check-and-write one atomic
    /// statement, so concurrent ingestion runs cannot both insert. Returns
    /// `None` when the identifier was already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn insert_if_absent(&self, record: &EmailRecord) -> Result<Option<EmailId>> {
        let result = sqlx::query(
            r"
            INSERT INTO email_records
                (message_id, sender, recipient, subject, body, received_at,
                 priority, status, assigned_to, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(message_id) DO NOTHING
            ",
        )
        .bind(&record.message_id)
        .bind(&record.sender)
        .bind(&record.recipient)
        .bind(&record.subject)
        .bind(&record.body)
        .bind(record.received_at.to_rfc3339())
        .bind(record.priority.as_str())
        .bind(record.status.as_str())
        .bind(record.assigned_to.map(|u| u.0))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(EmailId(result.last_insert_rowid())))
    }

    /// Fetch a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: EmailId) -> Result<Option<EmailRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, message_id, sender, recipient, subject, body, received_at,
                   priority, status, assigned_to, error_message, sent_at
            FROM email_records
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_record))
    }

    /// List records matching a filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, filter: &EmailFilter) -> Result<Vec<EmailRecord>> {
        let mut sql = String::from(
            r"
            SELECT id, message_id, sender, recipient, subject, body, received_at,
                   priority, status, assigned_to, error_message, sent_at
            FROM email_records
            WHERE 1 = 1
            ",
        );
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.priority.is_some() {
            sql.push_str(" AND priority = ?");
        }
        sql.push_str(" ORDER BY received_at DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(priority) = filter.priority {
            query = query.bind(priority.as_str());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(i64::from(limit));
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Mark a record delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_sent(&self, id: EmailId, sent_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r"
            UPDATE email_records
            SET status = 'sent', sent_at = ?
            WHERE id = ?
            ",
        )
        .bind(sent_at.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark a record permanently failed, recording the error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_failed(&self, id: EmailId, error: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE email_records
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

    /// Mark a record ignored (no eligible destination).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_ignored(&self, id: EmailId) -> Result<()> {
        sqlx::query("UPDATE email_records SET status = 'ignored' WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Assign a record to a user and move it to processing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn assign(&self, id: EmailId, user: UserId) -> Result<()> {
        sqlx::query(
            r"
            UPDATE email_records
            SET assigned_to = ?, status = 'processing'
            WHERE id = ?
            ",
        )
        .bind(user.0)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Convert a database row to an `EmailRecord`.
fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> EmailRecord {
    EmailRecord {
        id: Some(EmailId(row.get("id"))),
        message_id: row.get("message_id"),
        sender: row.get("sender"),
        recipient: row.get("recipient"),
        subject: row.get("subject"),
        body: row.get("body"),
        received_at: parse_timestamp(row.get("received_at")).unwrap_or(DateTime::UNIX_EPOCH),
        priority: Priority::parse(row.get("priority")),
        status: EmailStatus::parse(row.get("status")),
        assigned_to: row.get::<Option<i64>, _>("assigned_to").map(UserId),
        error_message: row.get("error_message"),
        sent_at: row
            .get::<Option<String>, _>("sent_at")
            .and_then(parse_timestamp),
    }
}

/// Parse an RFC 3339 timestamp column.
fn parse_timestamp(value: String) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
