//! Chat binding lifecycle: one-time codes linking a chat to a tenant.

mod manager;
mod model;
mod repository;

pub use manager::BindingManager;
pub use model::{BindingCode, CODE_LENGTH, CODE_TTL_DAYS, generate_code};
pub use repository::BindingRepository;
