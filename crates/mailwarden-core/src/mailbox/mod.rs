//! Mailbox configuration management.

mod model;
mod repository;

pub use model::{MailboxConfig, MailboxConfigId};
pub use repository::MailboxRepository;
