//! Binding lifecycle manager: issue, redeem, unlink, cascade.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::model::{BindingCode, generate_code};
use super::repository::BindingRepository;
use crate::chat::{ChatDestination, ChatKind, ChatRepository};
use crate::partition::{PartitionStore, TenantId, TenantPartition};
use crate::user::{User, UserRemovalHook, UserRepository};
use crate::{Error, Result};

/// Attempts at generating a collision-free code before giving up.
const MAX_GENERATION_ATTEMPTS: u32 = 8;

/// Issues, redeems, and revokes binding codes, and removes chat bindings
/// when their owning user goes away.
pub struct BindingManager {
    store: Arc<PartitionStore>,
}

impl BindingManager {
    /// Create a manager over the partition store.
    #[must_use]
    pub const fn new(store: Arc<PartitionStore>) -> Self {
        Self { store }
    }

    fn codes(&self) -> BindingRepository {
        BindingRepository::new(self.store.shared().clone())
    }

    fn chats(&self) -> ChatRepository {
        ChatRepository::new(self.store.shared().clone())
    }

    /// Issue a fresh code for a tenant, optionally targeting a user contact.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownTenant`] for a missing or inactive tenant,
    /// or [`Error::Config`] if code generation keeps colliding.
    pub async fn issue_code(
        &self,
        tenant: TenantId,
        target_contact: Option<&str>,
    ) -> Result<BindingCode> {
        // Only active tenants hand out codes.
        self.store.resolve(tenant).await?;

        let codes = self.codes();
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let mut issued = BindingCode::issue(generate_code(), tenant, target_contact, Utc::now());
            if let Some(id) = codes.insert_new(&issued).await? {
                issued.id = Some(id);
                info!(tenant = %tenant, code = %issued.code, "binding code issued");
                return Ok(issued);
            }
            // Value collision with an existing code; roll again.
        }

        Err(Error::Config(
            "could not generate a collision-free binding code".to_string(),
        ))
    }

    /// Redeem a code for a chat, creating (or reusing) the destination.
    ///
    /// The unused-to-used flip and the destination write happen in one
    /// transaction; of two concurrent redemptions of the same code, exactly
    /// one succeeds and the other observes the code as used.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidCode`], [`Error::ExpiredCode`],
    /// [`Error::ChatAlreadyBound`], or [`Error::AlreadyRegistered`] per the
    /// redemption rules; the code stays unused on every failure except the
    /// lost race.
    pub async fn redeem_code(
        &self,
        code: &str,
        chat_id: i64,
        chat_name: &str,
        kind: ChatKind,
    ) -> Result<ChatDestination> {
        let codes = self.codes();
        let Some(record) = codes.get_by_code(code).await? else {
            return Err(Error::InvalidCode);
        };
        if record.used {
            return Err(Error::InvalidCode);
        }
        if record.is_expired(Utc::now()) {
            return Err(Error::ExpiredCode);
        }

        let existing = self.chats().get_by_chat_id(chat_id).await?;
        if let Some(bound) = &existing {
            if bound.tenant_id != record.tenant_id {
                return Err(Error::ChatAlreadyBound);
            }
            if bound.is_active {
                return Err(Error::AlreadyRegistered);
            }
        }

        let mut destination = match existing {
            Some(inactive) => ChatDestination {
                name: chat_name.to_string(),
                kind,
                is_active: true,
                ..inactive
            },
            None => ChatDestination::new(record.tenant_id, chat_id, chat_name, kind),
        };

        let mut tx = self.store.shared().begin().await?;
        let claimed = BindingRepository::mark_used_on(&mut tx, code, chat_id, Utc::now()).await?;
        if !claimed {
            // Lost a race with a concurrent redemption.
            tx.rollback().await?;
            return Err(Error::InvalidCode);
        }
        if destination.id.is_some() {
            ChatRepository::reactivate_on(&mut tx, &destination).await?;
        } else {
            destination.id = Some(ChatRepository::insert_on(&mut tx, &destination).await?);
        }
        tx.commit().await?;

        self.link_target_user(&record, chat_id).await?;

        info!(
            tenant = %record.tenant_id,
            chat = chat_id,
            code = %record.code,
            "binding code redeemed"
        );
        Ok(destination)
    }

    /// Remove a chat binding: the destination, every associated code, and
    /// any user references to the chat. The user is then free to register
    /// again with a freshly issued code.
    ///
    /// # Errors
    ///
    /// Returns an error if a database operation fails.
    pub async fn unlink_chat(&self, tenant: TenantId, chat_id: i64) -> Result<()> {
        self.chats().delete_by_chat_id(chat_id).await?;
        self.codes().delete_redeemed_by(tenant, chat_id).await?;

        match self.store.resolve(tenant).await {
            Ok(partition) => UserRepository::new(&partition).clear_chat(chat_id).await?,
            // An inactive tenant has no reachable partition; its user rows
            // go away with the partition itself.
            Err(Error::UnknownTenant(_)) => {}
            Err(e) => return Err(e),
        }

        info!(tenant = %tenant, chat = chat_id, "chat binding removed");
        Ok(())
    }

    /// Remove a user's chat binding and every code that could re-create it:
    /// codes redeemed by the bound chat and codes targeting the user's
    /// contact, used or not.
    ///
    /// # Errors
    ///
    /// Returns an error if a database operation fails.
    pub async fn unlink_user(&self, partition: &TenantPartition, user: &User) -> Result<()> {
        let tenant = partition.tenant_id();

        if let Some(chat_id) = user.chat_id {
            self.chats().delete_by_chat_id(chat_id).await?;
            self.codes().delete_redeemed_by(tenant, chat_id).await?;
            UserRepository::new(partition).clear_chat(chat_id).await?;
        }
        self.codes().delete_targeting(tenant, &user.email).await?;

        info!(tenant = %tenant, user = %user.email, "user chat binding removed");
        Ok(())
    }

    /// Resolve the code's target contact in the tenant partition and point
    /// the user at the new chat. An unresolved contact binds the chat to
    /// the tenant only.
    async fn link_target_user(&self, record: &BindingCode, chat_id: i64) -> Result<()> {
        let Some(contact) = &record.target_contact else {
            return Ok(());
        };

        let partition = self.store.resolve(record.tenant_id).await?;
        let users = UserRepository::new(&partition);
        match users.get_by_email(contact).await? {
            Some(user) => {
                if let Some(id) = user.id {
                    users.set_chat(id, Some(chat_id)).await?;
                }
            }
            None => {
                warn!(
                    tenant = %record.tenant_id,
                    contact = %contact,
                    "binding code target contact not found; chat bound to tenant only"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserRemovalHook for BindingManager {
    async fn on_user_removed(&self, partition: &TenantPartition, user: &User) -> Result<()> {
        self.unlink_user(partition, user).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::binding::model::CODE_TTL_DAYS;
    use crate::partition::Tenant;
    use crate::user::{UserDirectory, UserRole};
    use chrono::Duration;

    async fn setup() -> (Arc<PartitionStore>, TenantId, BindingManager) {
        let store = Arc::new(PartitionStore::in_memory().await.unwrap());
        let tenant = store
            .create_tenant(Tenant::new("acme", "Acme", None))
            .await
            .unwrap()
            .id
            .unwrap();
        let manager = BindingManager::new(store.clone());
        (store, tenant, manager)
    }

    #[tokio::test]
    async fn test_issue_and_redeem() {
        let (store, tenant, manager) = setup().await;

        let issued = manager.issue_code(tenant, None).await.unwrap();
        assert_eq!(issued.expires_at - issued.created_at, Duration::days(CODE_TTL_DAYS));

        let destination = manager
            .redeem_code(&issued.code, 500, "ops chat", ChatKind::Group)
            .await
            .unwrap();
        assert_eq!(destination.tenant_id, tenant);
        assert_eq!(destination.chat_id, 500);
        assert!(destination.is_active);

        let chats = ChatRepository::new(store.shared().clone());
        assert!(chats.get_by_chat_id(500).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_redeem_unknown_code() {
        let (_store, _tenant, manager) = setup().await;
        let err = manager
            .redeem_code("NOSUCHCD", 500, "x", ChatKind::Private)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCode));
    }

    #[tokio::test]
    async fn test_redeem_twice_fails_second_time() {
        let (_store, tenant, manager) = setup().await;
        let issued = manager.issue_code(tenant, None).await.unwrap();

        manager
            .redeem_code(&issued.code, 500, "x", ChatKind::Private)
            .await
            .unwrap();
        let err = manager
            .redeem_code(&issued.code, 501, "y", ChatKind::Private)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCode));
    }

    #[tokio::test]
    async fn test_expired_code_left_unused() {
        let (store, tenant, manager) = setup().await;

        // Issue a code whose expiry is already in the past.
        let codes = BindingRepository::new(store.shared().clone());
        let mut stale = BindingCode::issue(
            "EXPIRED2".to_string(),
            tenant,
            None,
            Utc::now() - Duration::days(CODE_TTL_DAYS + 1),
        );
        stale.id = codes.insert_new(&stale).await.unwrap();

        let err = manager
            .redeem_code("EXPIRED2", 500, "x", ChatKind::Private)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExpiredCode));

        let found = codes.get_by_code("EXPIRED2").await.unwrap().unwrap();
        assert!(!found.used, "an expired redemption must not consume the code");
    }

    #[tokio::test]
    async fn test_chat_bound_to_other_tenant_rejected() {
        let (store, tenant, manager) = setup().await;
        let other = store
            .create_tenant(Tenant::new("beta", "Beta", None))
            .await
            .unwrap()
            .id
            .unwrap();

        let first = manager.issue_code(tenant, None).await.unwrap();
        manager
            .redeem_code(&first.code, 500, "x", ChatKind::Private)
            .await
            .unwrap();

        let second = manager.issue_code(other, None).await.unwrap();
        let err = manager
            .redeem_code(&second.code, 500, "x", ChatKind::Private)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChatAlreadyBound));

        // The code survives for a different chat.
        let codes = BindingRepository::new(store.shared().clone());
        assert!(!codes.get_by_code(&second.code).await.unwrap().unwrap().used);
    }

    #[tokio::test]
    async fn test_same_tenant_duplicate_rejected() {
        let (_store, tenant, manager) = setup().await;

        let first = manager.issue_code(tenant, None).await.unwrap();
        manager
            .redeem_code(&first.code, 500, "x", ChatKind::Private)
            .await
            .unwrap();

        let second = manager.issue_code(tenant, None).await.unwrap();
        let err = manager
            .redeem_code(&second.code, 500, "x", ChatKind::Private)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered));
    }

    #[tokio::test]
    async fn test_concurrent_redemptions_single_winner() {
        let (store, tenant, manager) = setup().await;
        let manager = Arc::new(manager);
        let issued = manager.issue_code(tenant, None).await.unwrap();

        let mut handles = Vec::new();
        for chat_id in [600_i64, 601, 602, 603] {
            let manager = manager.clone();
            let code = issued.code.clone();
            handles.push(tokio::spawn(async move {
                manager.redeem_code(&code, chat_id, "racer", ChatKind::Private).await
            }));
        }

        let mut successes = 0;
        let mut invalid = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(Error::InvalidCode) => invalid += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(successes, 1, "exactly one concurrent redemption wins");
        assert_eq!(invalid, 3);

        let chats = ChatRepository::new(store.shared().clone());
        assert_eq!(chats.list_for_tenant(tenant).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_target_user_linked_on_redemption() {
        let (store, tenant, manager) = setup().await;
        let partition = store.resolve(tenant).await.unwrap();
        let users = UserRepository::new(&partition);
        let user = users
            .insert(&User::new("Ana", "ana@acme.example", UserRole::Manager))
            .await
            .unwrap();

        let issued = manager
            .issue_code(tenant, Some("ana@acme.example"))
            .await
            .unwrap();
        manager
            .redeem_code(&issued.code, 700, "ana", ChatKind::Private)
            .await
            .unwrap();

        let linked = users.get(user.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(linked.chat_id, Some(700));
    }

    #[tokio::test]
    async fn test_unresolved_target_contact_is_permitted() {
        let (_store, tenant, manager) = setup().await;

        let issued = manager
            .issue_code(tenant, Some("nobody@acme.example"))
            .await
            .unwrap();
        // Binds to the tenant only; no error.
        let destination = manager
            .redeem_code(&issued.code, 701, "chat", ChatKind::Private)
            .await
            .unwrap();
        assert_eq!(destination.tenant_id, tenant);
    }

    #[tokio::test]
    async fn test_user_deletion_cascades_through_hook() {
        let (store, tenant, manager) = setup().await;
        let manager = Arc::new(manager);
        let partition = store.resolve(tenant).await.unwrap();

        let users = UserRepository::new(&partition);
        let user = users
            .insert(&User::new("Ana", "ana@acme.example", UserRole::Manager))
            .await
            .unwrap();

        let issued = manager
            .issue_code(tenant, Some("ana@acme.example"))
            .await
            .unwrap();
        manager
            .redeem_code(&issued.code, 800, "ana", ChatKind::Private)
            .await
            .unwrap();

        // An unused code targeting the same contact must also be swept.
        let spare = manager
            .issue_code(tenant, Some("ana@acme.example"))
            .await
            .unwrap();

        let mut directory = UserDirectory::new();
        directory.register_hook(manager.clone());
        directory
            .remove_user(&partition, user.id.unwrap())
            .await
            .unwrap();

        let chats = ChatRepository::new(store.shared().clone());
        assert!(chats.get_by_chat_id(800).await.unwrap().is_none());

        let codes = BindingRepository::new(store.shared().clone());
        assert!(codes.get_by_code(&issued.code).await.unwrap().is_none());
        assert!(codes.get_by_code(&spare.code).await.unwrap().is_none());
        assert!(users.get(user.id.unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unlink_frees_chat_for_reregistration() {
        let (_store, tenant, manager) = setup().await;

        let issued = manager.issue_code(tenant, None).await.unwrap();
        manager
            .redeem_code(&issued.code, 900, "ops", ChatKind::Group)
            .await
            .unwrap();

        manager.unlink_chat(tenant, 900).await.unwrap();

        // A fresh code can bind the same chat again.
        let again = manager.issue_code(tenant, None).await.unwrap();
        let destination = manager
            .redeem_code(&again.code, 900, "ops", ChatKind::Group)
            .await
            .unwrap();
        assert!(destination.is_active);
    }
}
