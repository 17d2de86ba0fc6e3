//! Administrative collaborator surface.
//!
//! The only operations external tooling (admin panels, provisioning
//! wizards) may use to affect core state. Everything else in the core is
//! reached through the scheduled pipeline, never mutated from outside.

use std::sync::Arc;

use crate::binding::{BindingCode, BindingManager};
use crate::chat::{ChatDestination, ChatKind, ChatRepository};
use crate::email::{EmailFilter, EmailRecord, EmailRepository};
use crate::partition::{PartitionStore, TenantId};
use crate::user::{UserDirectory, UserId, UserRepository};
use crate::Result;

/// Facade over the core for out-of-scope admin tooling.
pub struct AdminApi {
    store: Arc<PartitionStore>,
    bindings: Arc<BindingManager>,
    users: UserDirectory,
}

impl AdminApi {
    /// Create the surface. The binding manager is registered as a user
    /// removal hook, so deleting a user through [`Self::user_directory`]
    /// cascades to their chat binding.
    #[must_use]
    pub fn new(store: Arc<PartitionStore>) -> Self {
        let bindings = Arc::new(BindingManager::new(store.clone()));
        let mut users = UserDirectory::new();
        users.register_hook(bindings.clone());
        Self {
            store,
            bindings,
            users,
        }
    }

    /// Issue a binding code for a tenant, optionally targeting a user
    /// contact.
    ///
    /// # Errors
    ///
    /// See [`BindingManager::issue_code`].
    pub async fn issue_code(
        &self,
        tenant: TenantId,
        user_contact: Option<&str>,
    ) -> Result<BindingCode> {
        self.bindings.issue_code(tenant, user_contact).await
    }

    /// Redeem a binding code for a chat.
    ///
    /// # Errors
    ///
    /// See [`BindingManager::redeem_code`].
    pub async fn redeem_code(
        &self,
        code: &str,
        chat_id: i64,
        chat_name: &str,
        kind: ChatKind,
    ) -> Result<ChatDestination> {
        self.bindings.redeem_code(code, chat_id, chat_name, kind).await
    }

    /// Unlink a user's chat binding, freeing them to re-register. The user
    /// row itself stays.
    ///
    /// Unlinking a user with no binding, or an unknown user, is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant cannot be resolved or a database
    /// operation fails.
    pub async fn unlink_user(&self, tenant: TenantId, user: UserId) -> Result<()> {
        let partition = self.store.resolve(tenant).await?;
        let Some(user) = UserRepository::new(&partition).get(user).await? else {
            return Ok(());
        };
        self.bindings.unlink_user(&partition, &user).await
    }

    /// List a tenant's email records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant cannot be resolved or the query fails.
    pub async fn list_emails(
        &self,
        tenant: TenantId,
        filter: &EmailFilter,
    ) -> Result<Vec<EmailRecord>> {
        let partition = self.store.resolve(tenant).await?;
        EmailRepository::new(&partition).list(filter).await
    }

    /// List a tenant's chat destinations.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant cannot be resolved or the query fails.
    pub async fn list_chat_destinations(&self, tenant: TenantId) -> Result<Vec<ChatDestination>> {
        // Resolving first keeps the active-tenant rule uniform across the
        // surface even though destinations live in the shared partition.
        self.store.resolve(tenant).await?;
        ChatRepository::new(self.store.shared().clone())
            .list_for_tenant(tenant)
            .await
    }

    /// The user directory, with the binding cascade hook registered.
    /// Provisioning tooling deletes users through this.
    #[must_use]
    pub const fn user_directory(&self) -> &UserDirectory {
        &self.users
    }
}
