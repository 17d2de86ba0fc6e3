//! Email records: the tenant-scoped output of mailbox ingestion.

mod classify;
mod model;
mod repository;

pub use classify::PriorityKeywords;
pub use model::{EmailId, EmailRecord, EmailStatus, Priority};
pub use repository::{EmailFilter, EmailRepository};
