//! Orphan reconciler.
//!
//! Periodic sweep over every chat destination: a destination with no live
//! owning binding (no user referencing it, no used binding code proving it
//! was bound on purpose) is deleted so alerts stop flowing to stale chats.
//! Read-only with respect to email and notification records.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::binding::BindingRepository;
use crate::chat::ChatRepository;
use crate::partition::{PartitionStore, TenantId};
use crate::user::UserRepository;
use crate::{Error, Result};

/// A destination flagged (and possibly removed) by a sweep.
#[derive(Debug, Clone)]
pub struct OrphanChat {
    /// Tenant the destination was bound to.
    pub tenant_id: TenantId,
    /// Chat identifier.
    pub chat_id: i64,
    /// Destination name, for the report.
    pub name: String,
}

/// Result of one reconciliation sweep.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Destinations examined.
    pub scanned: usize,
    /// Destinations with no live owning binding.
    pub orphans: Vec<OrphanChat>,
    /// Destinations actually deleted (0 in dry-run mode).
    pub removed: usize,
}

/// The orphan destination sweeper.
pub struct Reconciler {
    store: Arc<PartitionStore>,
}

impl Reconciler {
    /// Create a reconciler over the partition store.
    #[must_use]
    pub const fn new(store: Arc<PartitionStore>) -> Self {
        Self { store }
    }

    /// Run one sweep. With `dry_run`, orphans are reported but kept.
    ///
    /// Destinations of missing or inactive tenants are skipped, not
    /// deleted; their partitions are unreachable, so ownership cannot be
    /// verified.
    ///
    /// # Errors
    ///
    /// Returns an error if a database operation fails.
    pub async fn run(&self, dry_run: bool) -> Result<ReconcileOutcome> {
        let chats = ChatRepository::new(self.store.shared().clone());
        let codes = BindingRepository::new(self.store.shared().clone());

        let mut outcome = ReconcileOutcome::default();
        for destination in chats.list_all().await? {
            outcome.scanned += 1;

            let partition = match self.store.resolve(destination.tenant_id).await {
                Ok(partition) => partition,
                Err(Error::UnknownTenant(_)) => {
                    debug!(
                        tenant = %destination.tenant_id,
                        chat = destination.chat_id,
                        "tenant missing or inactive; skipping destination"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            let user_owned = UserRepository::new(&partition)
                .exists_with_chat(destination.chat_id)
                .await?;
            let code_redeemed = codes
                .used_exists_for_chat(destination.tenant_id, destination.chat_id)
                .await?;
            if user_owned || code_redeemed {
                continue;
            }

            warn!(
                tenant = %destination.tenant_id,
                chat = destination.chat_id,
                name = %destination.name,
                dry_run,
                "orphaned chat destination"
            );
            if !dry_run {
                chats.delete_by_chat_id(destination.chat_id).await?;
                outcome.removed += 1;
            }
            outcome.orphans.push(OrphanChat {
                tenant_id: destination.tenant_id,
                chat_id: destination.chat_id,
                name: destination.name,
            });
        }

        info!(
            scanned = outcome.scanned,
            orphans = outcome.orphans.len(),
            removed = outcome.removed,
            dry_run,
            "reconciliation sweep finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::binding::BindingManager;
    use crate::chat::{ChatDestination, ChatKind};
    use crate::partition::Tenant;
    use crate::user::{User, UserRepository, UserRole};

    async fn setup() -> (Arc<PartitionStore>, TenantId) {
        let store = Arc::new(PartitionStore::in_memory().await.unwrap());
        let tenant = store
            .create_tenant(Tenant::new("acme", "Acme", None))
            .await
            .unwrap()
            .id
            .unwrap();
        (store, tenant)
    }

    #[tokio::test]
    async fn test_orphan_removed_bound_kept() {
        let (store, tenant) = setup().await;
        let chats = ChatRepository::new(store.shared().clone());

        // A destination created directly with no user and no code history.
        chats
            .insert(&ChatDestination::new(tenant, 1, "stale", ChatKind::Group))
            .await
            .unwrap();

        // A destination properly bound through a redeemed code.
        let manager = BindingManager::new(store.clone());
        let code = manager.issue_code(tenant, None).await.unwrap();
        manager
            .redeem_code(&code.code, 2, "bound", ChatKind::Group)
            .await
            .unwrap();

        // A destination owned by a user's chat reference.
        chats
            .insert(&ChatDestination::new(tenant, 3, "user-owned", ChatKind::Private))
            .await
            .unwrap();
        let partition = store.resolve(tenant).await.unwrap();
        let users = UserRepository::new(&partition);
        let mut user = User::new("Ana", "ana@acme.example", UserRole::Client);
        user.chat_id = Some(3);
        users.insert(&user).await.unwrap();

        let outcome = Reconciler::new(store.clone()).run(false).await.unwrap();
        assert_eq!(outcome.scanned, 3);
        assert_eq!(outcome.orphans.len(), 1);
        assert_eq!(outcome.orphans[0].chat_id, 1);
        assert_eq!(outcome.removed, 1);

        assert!(chats.get_by_chat_id(1).await.unwrap().is_none());
        assert!(chats.get_by_chat_id(2).await.unwrap().is_some());
        assert!(chats.get_by_chat_id(3).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_deleting() {
        let (store, tenant) = setup().await;
        let chats = ChatRepository::new(store.shared().clone());
        chats
            .insert(&ChatDestination::new(tenant, 1, "stale", ChatKind::Group))
            .await
            .unwrap();

        let outcome = Reconciler::new(store.clone()).run(true).await.unwrap();
        assert_eq!(outcome.orphans.len(), 1);
        assert_eq!(outcome.removed, 0);
        assert!(chats.get_by_chat_id(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_inactive_tenant_destinations_skipped() {
        let (store, tenant) = setup().await;
        let chats = ChatRepository::new(store.shared().clone());
        chats
            .insert(&ChatDestination::new(tenant, 1, "stale", ChatKind::Group))
            .await
            .unwrap();

        sqlx::query("UPDATE tenants SET is_active = 0 WHERE id = ?")
            .bind(tenant.0)
            .execute(store.shared())
            .await
            .unwrap();

        let outcome = Reconciler::new(store.clone()).run(false).await.unwrap();
        assert_eq!(outcome.orphans.len(), 0);
        assert!(chats.get_by_chat_id(1).await.unwrap().is_some());
    }
}
