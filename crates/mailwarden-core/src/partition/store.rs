//! The partition store: shared database plus one database per tenant.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::model::{Tenant, TenantId};
use crate::{Error, Result};

/// A handle to one tenant's isolated data context.
///
/// Every tenant-scoped repository takes one of these; nothing in the core
/// reads or writes tenant data without being handed a partition explicitly.
#[derive(Clone, Debug)]
pub struct TenantPartition {
    tenant_id: TenantId,
    pool: SqlitePool,
}

impl TenantPartition {
    /// The tenant this partition belongs to.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// The partition's connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Resolves tenant identifiers and routing keys to isolated data contexts.
///
/// Owns the shared database (tenants, chat destinations, binding codes,
/// notification messages) and lazily opens one pool per tenant database.
/// Partitions are provisioned with their empty schema at tenant creation.
pub struct PartitionStore {
    shared: SqlitePool,
    pools: RwLock<HashMap<i64, SqlitePool>>,
    /// None = in-memory mode, used by tests.
    data_dir: Option<PathBuf>,
}

impl PartitionStore {
    /// Opens (or creates) the store rooted at `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the shared
    /// database cannot be opened.
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let url = format!("sqlite:{}?mode=rwc", data_dir.join("shared.sqlite3").display());
        let shared = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self {
            shared,
            pools: RwLock::new(HashMap::new()),
            data_dir: Some(data_dir),
        };
        store.initialize_shared().await?;
        Ok(store)
    }

    /// Creates an in-memory store for testing. Each partition is its own
    /// in-memory database, so isolation behaves exactly as in file mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation
    /// fails.
    pub async fn in_memory() -> Result<Self> {
        let shared = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self {
            shared,
            pools: RwLock::new(HashMap::new()),
            data_dir: None,
        };
        store.initialize_shared().await?;
        Ok(store)
    }

    /// The shared partition's connection pool.
    #[must_use]
    pub const fn shared(&self) -> &SqlitePool {
        &self.shared
    }

    /// Provisions a new tenant: inserts the tenant row and creates its empty
    /// partition.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicatePartition`] if the slug is already
    /// provisioned.
    pub async fn create_tenant(&self, tenant: Tenant) -> Result<Tenant> {
        let now = Utc::now().to_rfc3339();

        let inserted = sqlx::query(
            r"
            INSERT INTO tenants (slug, name, domain, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO NOTHING
            ",
        )
        .bind(&tenant.slug)
        .bind(&tenant.name)
        .bind(&tenant.domain)
        .bind(tenant.is_active)
        .bind(&now)
        .bind(&now)
        .execute(&self.shared)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(Error::DuplicatePartition(tenant.slug));
        }

        let id = TenantId::new(inserted.last_insert_rowid());
        // Provision the partition now so the first resolve finds it ready.
        self.partition_pool(id, &tenant.slug).await?;
        info!(tenant = %id, slug = %tenant.slug, "tenant partition provisioned");

        self.get(id).await
    }

    /// Fetches a tenant row by id, active or not.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownTenant`] if no such tenant exists.
    pub async fn get(&self, id: TenantId) -> Result<Tenant> {
        let row = sqlx::query(
            r"
            SELECT id, slug, name, domain, is_active, created_at, updated_at
            FROM tenants
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.shared)
        .await?;

        row.as_ref()
            .map(row_to_tenant)
            .ok_or_else(|| Error::UnknownTenant(id.to_string()))
    }

    /// Resolves an active tenant to its partition handle.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownTenant`] if the tenant is missing or
    /// inactive.
    pub async fn resolve(&self, id: TenantId) -> Result<TenantPartition> {
        let tenant = self.get(id).await?;
        if !tenant.is_active {
            return Err(Error::UnknownTenant(id.to_string()));
        }

        let pool = self.partition_pool(id, &tenant.slug).await?;
        Ok(TenantPartition {
            tenant_id: id,
            pool,
        })
    }

    /// Resolves an active tenant by its inbound routing domain.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownTenant`] if no active tenant claims the
    /// domain.
    pub async fn resolve_by_domain(&self, domain: &str) -> Result<TenantPartition> {
        let normalized = domain.to_lowercase();
        let row = sqlx::query(
            r"
            SELECT id FROM tenants
            WHERE domain = ? AND is_active = 1
            ",
        )
        .bind(&normalized)
        .fetch_optional(&self.shared)
        .await?;

        let id = row
            .map(|r| TenantId::new(r.get("id")))
            .ok_or(Error::UnknownTenant(normalized))?;
        self.resolve(id).await
    }

    /// Lists all active tenants.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_active(&self) -> Result<Vec<Tenant>> {
        let rows = sqlx::query(
            r"
            SELECT id, slug, name, domain, is_active, created_at, updated_at
            FROM tenants
            WHERE is_active = 1
            ORDER BY slug
            ",
        )
        .fetch_all(&self.shared)
        .await?;

        Ok(rows.iter().map(row_to_tenant).collect())
    }

    /// Deprovisions a tenant: removes its shared-partition rows, the tenant
    /// row, and the partition itself. Destructive and irreversible, so the
    /// caller must pass `confirm: true`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Config`] when not confirmed, or
    /// [`Error::UnknownTenant`] if the tenant does not exist.
    pub async fn remove_tenant(&self, id: TenantId, confirm: bool) -> Result<()> {
        if !confirm {
            return Err(Error::Config(
                "tenant removal is irreversible and must be confirmed".to_string(),
            ));
        }
        let tenant = self.get(id).await?;

        for table in [
            "notification_messages",
            "binding_codes",
            "chat_destinations",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE tenant_id = ?"))
                .bind(id.0)
                .execute(&self.shared)
                .await?;
        }
        sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(id.0)
            .execute(&self.shared)
            .await?;

        if let Some(pool) = self.pools.write().await.remove(&id.0) {
            pool.close().await;
        }
        if let Some(dir) = &self.data_dir {
            let path = dir.join(partition_file(&tenant.slug));
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(tenant = %id, error = %e, "could not delete partition file");
                }
            }
        }

        info!(tenant = %id, slug = %tenant.slug, "tenant partition removed");
        Ok(())
    }

    /// Returns the pool for a tenant partition, opening and provisioning it
    /// on first use.
    async fn partition_pool(&self, id: TenantId, slug: &str) -> Result<SqlitePool> {
        if let Some(pool) = self.pools.read().await.get(&id.0) {
            return Ok(pool.clone());
        }

        let mut pools = self.pools.write().await;
        // Another task may have opened it while we waited for the lock.
        if let Some(pool) = pools.get(&id.0) {
            return Ok(pool.clone());
        }

        let pool = match &self.data_dir {
            Some(dir) => {
                let url = format!("sqlite:{}?mode=rwc", dir.join(partition_file(slug)).display());
                SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect(&url)
                    .await?
            }
            None => {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect("sqlite::memory:")
                    .await?
            }
        };

        initialize_tenant_schema(&pool).await?;
        pools.insert(id.0, pool.clone());
        Ok(pool)
    }

    /// Initialize the shared partition schema.
    async fn initialize_shared(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS tenants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                domain TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.shared)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chat_destinations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL UNIQUE,
                name TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL DEFAULT 'private',
                alert_filter TEXT NOT NULL DEFAULT 'all',
                email_alerts INTEGER NOT NULL DEFAULT 1,
                system_alerts INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.shared)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_chat_destinations_tenant
            ON chat_destinations(tenant_id, is_active)
            ",
        )
        .execute(&self.shared)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS binding_codes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                tenant_id INTEGER NOT NULL,
                target_contact TEXT,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                used INTEGER NOT NULL DEFAULT 0,
                used_at TEXT,
                redeemed_chat_id INTEGER
            )
            ",
        )
        .execute(&self.shared)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_binding_codes_chat
            ON binding_codes(tenant_id, redeemed_chat_id) WHERE redeemed_chat_id IS NOT NULL
            ",
        )
        .execute(&self.shared)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS notification_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL,
                email_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                body TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                provider_message_id INTEGER,
                error_message TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                sent_at TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(tenant_id, email_id, chat_id)
            )
            ",
        )
        .execute(&self.shared)
        .await?;

        Ok(())
    }
}

/// Tenant partition database file name.
fn partition_file(slug: &str) -> String {
    format!("tenant_{slug}.sqlite3")
}

/// Initialize a tenant partition schema.
async fn initialize_tenant_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS mailbox_configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            host TEXT NOT NULL,
            port INTEGER NOT NULL DEFAULT 993,
            username TEXT NOT NULL,
            password TEXT NOT NULL,
            use_tls INTEGER NOT NULL DEFAULT 1,
            folder TEXT NOT NULL DEFAULT 'INBOX',
            poll_interval_secs INTEGER NOT NULL DEFAULT 300,
            max_per_poll INTEGER NOT NULL DEFAULT 50,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_checked TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS email_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id TEXT NOT NULL UNIQUE,
            sender TEXT NOT NULL,
            recipient TEXT NOT NULL DEFAULT '',
            subject TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL DEFAULT '',
            received_at TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'low',
            status TEXT NOT NULL DEFAULT 'pending',
            assigned_to INTEGER,
            error_message TEXT,
            sent_at TEXT,
            created_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_email_records_status
        ON email_records(status)
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            phone TEXT,
            chat_id INTEGER,
            role TEXT NOT NULL DEFAULT 'client',
            is_active INTEGER NOT NULL DEFAULT 1,
            alerts_enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Convert a database row to a `Tenant`.
fn row_to_tenant(row: &sqlx::sqlite::SqliteRow) -> Tenant {
    Tenant {
        id: Some(TenantId::new(row.get("id"))),
        slug: row.get("slug"),
        name: row.get("name"),
        domain: row.get("domain"),
        is_active: row.get("is_active"),
        created_at: parse_timestamp(row.get("created_at")),
        updated_at: parse_timestamp(row.get("updated_at")),
    }
}

/// Parse an RFC 3339 timestamp column.
fn parse_timestamp(value: String) -> Option<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(&value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_resolve_tenant() {
        let store = PartitionStore::in_memory().await.unwrap();
        let tenant = store
            .create_tenant(Tenant::new("acme", "Acme", Some("mail.acme.example")))
            .await
            .unwrap();

        let id = tenant.id.unwrap();
        let partition = store.resolve(id).await.unwrap();
        assert_eq!(partition.tenant_id(), id);
    }

    #[tokio::test]
    async fn test_duplicate_partition_rejected() {
        let store = PartitionStore::in_memory().await.unwrap();
        store
            .create_tenant(Tenant::new("acme", "Acme", None))
            .await
            .unwrap();

        let err = store
            .create_tenant(Tenant::new("acme", "Acme Again", None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicatePartition(_)));
    }

    #[tokio::test]
    async fn test_unknown_tenant() {
        let store = PartitionStore::in_memory().await.unwrap();
        let err = store.resolve(TenantId::new(42)).await.unwrap_err();
        assert!(matches!(err, Error::UnknownTenant(_)));
    }

    #[tokio::test]
    async fn test_resolve_by_domain() {
        let store = PartitionStore::in_memory().await.unwrap();
        let tenant = store
            .create_tenant(Tenant::new("acme", "Acme", Some("mail.acme.example")))
            .await
            .unwrap();

        let partition = store.resolve_by_domain("Mail.Acme.Example").await.unwrap();
        assert_eq!(partition.tenant_id(), tenant.id.unwrap());

        let err = store.resolve_by_domain("nobody.example").await.unwrap_err();
        assert!(matches!(err, Error::UnknownTenant(_)));
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let store = PartitionStore::in_memory().await.unwrap();
        let a = store
            .create_tenant(Tenant::new("a", "Tenant A", None))
            .await
            .unwrap();
        let b = store
            .create_tenant(Tenant::new("b", "Tenant B", None))
            .await
            .unwrap();

        let pa = store.resolve(a.id.unwrap()).await.unwrap();
        let pb = store.resolve(b.id.unwrap()).await.unwrap();

        sqlx::query("INSERT INTO users (name, email, created_at, updated_at) VALUES ('x', 'x@a', '', '')")
            .execute(pa.pool())
            .await
            .unwrap();

        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM users")
            .fetch_one(pb.pool())
            .await
            .unwrap()
            .get("n");
        assert_eq!(count, 0, "tenant B must not see tenant A's rows");
    }

    #[tokio::test]
    async fn test_remove_tenant_requires_confirmation() {
        let store = PartitionStore::in_memory().await.unwrap();
        let tenant = store
            .create_tenant(Tenant::new("acme", "Acme", None))
            .await
            .unwrap();
        let id = tenant.id.unwrap();

        let err = store.remove_tenant(id, false).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        store.remove_tenant(id, true).await.unwrap();
        let err = store.resolve(id).await.unwrap_err();
        assert!(matches!(err, Error::UnknownTenant(_)));
    }
}
