//! Notification messages: one row per (email, chat) delivery attempt chain.

mod model;
mod repository;

pub use model::{DeliveryStatus, NotificationId, NotificationMessage};
pub use repository::NotificationRepository;
