//! Core services: the pipeline stages and the admin collaborator surface.

mod admin;
mod dispatch;
mod ingest;
mod reconcile;

pub use admin::AdminApi;
pub use dispatch::{ChatDelivery, DispatchOutcome, Dispatcher, RetryPolicy, render_alert};
pub use ingest::{
    EmailEvent, ImapSource, IngestOutcome, IngestWorker, MailboxConnection, MailboxSource,
};
pub use reconcile::{OrphanChat, ReconcileOutcome, Reconciler};
