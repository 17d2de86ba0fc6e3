//! User deletion with lifecycle hooks.
//!
//! Cleanup that must accompany a user's removal (today: unlinking their chat
//! binding) is registered as a hook rather than hard-wired here, so the user
//! module stays ignorant of the binding lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::model::{User, UserId};
use super::repository::UserRepository;
use crate::Result;
use crate::partition::TenantPartition;

/// Observer invoked before a user row is deleted.
#[async_trait]
pub trait UserRemovalHook: Send + Sync {
    /// Called with the user about to be removed. Runs before the row is
    /// deleted; an error aborts the removal.
    async fn on_user_removed(&self, partition: &TenantPartition, user: &User) -> Result<()>;
}

/// Deletes users, running every registered removal hook first.
#[derive(Default)]
pub struct UserDirectory {
    hooks: Vec<Arc<dyn UserRemovalHook>>,
}

impl UserDirectory {
    /// Create a directory with no hooks registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a removal hook.
    pub fn register_hook(&mut self, hook: Arc<dyn UserRemovalHook>) {
        self.hooks.push(hook);
    }

    /// Remove a user, cascading through the registered hooks.
    ///
    /// Removing an unknown user is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook or the deletion itself fails; the user row
    /// is left in place when a hook fails.
    pub async fn remove_user(&self, partition: &TenantPartition, id: UserId) -> Result<()> {
        let repo = UserRepository::new(partition);
        let Some(user) = repo.get(id).await? else {
            return Ok(());
        };

        for hook in &self.hooks {
            hook.on_user_removed(partition, &user).await?;
        }

        repo.delete(id).await?;
        info!(tenant = %partition.tenant_id(), user = %id, "user removed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::partition::{PartitionStore, Tenant};
    use crate::user::UserRole;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UserRemovalHook for CountingHook {
        async fn on_user_removed(
            &self,
            _partition: &TenantPartition,
            _user: &User,
        ) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hooks_run_before_delete() {
        let store = PartitionStore::in_memory().await.unwrap();
        let tenant = store
            .create_tenant(Tenant::new("acme", "Acme", None))
            .await
            .unwrap();
        let partition = store.resolve(tenant.id.unwrap()).await.unwrap();

        let repo = UserRepository::new(&partition);
        let user = repo
            .insert(&User::new("Ana", "ana@acme.example", UserRole::Client))
            .await
            .unwrap();
        let id = user.id.unwrap();

        let hook = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
        });
        let mut directory = UserDirectory::new();
        directory.register_hook(hook.clone());

        directory.remove_user(&partition, id).await.unwrap();
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
        assert!(repo.get(id).await.unwrap().is_none());

        // Removing again is a no-op and does not re-run hooks.
        directory.remove_user(&partition, id).await.unwrap();
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    }
}
