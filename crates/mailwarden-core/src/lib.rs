//! # mailwarden-core
//!
//! Core pipeline for `MailWarden`, the multi-tenant mail-to-chat alert
//! router.
//!
//! This crate provides:
//! - **Tenant partitions** - one isolated `SQLite` database per tenant,
//!   resolved through explicit handles
//! - **Mailbox ingestion** - scheduled, single-flight polling with
//!   deduplication and keyword priority classification
//! - **Chat binding lifecycle** - one-time expiring codes linking chats to
//!   tenants, with cascade on user removal
//! - **Notification dispatch** - event-driven, at-most-once delivery per
//!   (email, chat) with bounded retries
//! - **Orphan reconciliation** - sweeping destinations whose owning binding
//!   is gone

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod binding;
pub mod chat;
pub mod email;
mod error;
pub mod mailbox;
pub mod notify;
pub mod partition;
pub mod service;
pub mod user;

pub use binding::{BindingCode, BindingManager, BindingRepository};
pub use chat::{AlertFilter, ChatDestination, ChatKind, ChatRepository};
pub use email::{EmailFilter, EmailId, EmailRecord, EmailRepository, EmailStatus, Priority, PriorityKeywords};
pub use error::{Error, Result};
pub use mailbox::{MailboxConfig, MailboxConfigId, MailboxRepository};
pub use notify::{DeliveryStatus, NotificationId, NotificationMessage, NotificationRepository};
pub use partition::{PartitionStore, Tenant, TenantId, TenantPartition};
pub use service::{
    AdminApi, ChatDelivery, DispatchOutcome, Dispatcher, EmailEvent, ImapSource, IngestOutcome,
    IngestWorker, MailboxConnection, MailboxSource, OrphanChat, ReconcileOutcome, Reconciler,
    RetryPolicy, render_alert,
};
pub use user::{User, UserDirectory, UserId, UserRemovalHook, UserRepository, UserRole};
