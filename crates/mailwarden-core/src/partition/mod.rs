//! Tenant partition management.
//!
//! Every tenant owns one isolated SQLite database; a single shared database
//! holds the cross-tenant entities (tenants, chat destinations, binding
//! codes, notification messages). All tenant-scoped access goes through a
//! [`TenantPartition`] handle resolved from the [`PartitionStore`].

mod model;
mod store;

pub use model::{Tenant, TenantId};
pub use store::{PartitionStore, TenantPartition};
