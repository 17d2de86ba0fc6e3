//! `MailWarden` - multi-tenant mail-to-chat alert daemon.
//!
//! Polls each tenant's mailbox on its configured schedule, classifies and
//! deduplicates incoming mail, and fans alerts out to the tenant's bound
//! chat destinations.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod scheduler;
mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailwarden_chat::BotClient;
use mailwarden_core::{Dispatcher, ImapSource, IngestWorker, PartitionStore, Reconciler};

use settings::Settings;

/// Backlog of email events between ingestion and dispatch.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailwarden=info,mailwarden_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings_path = Settings::resolve_path();
    let settings = Settings::load(&settings_path)?;
    info!(config = %settings_path.display(), "starting MailWarden");

    let store = Arc::new(
        PartitionStore::open(&settings.data_dir)
            .await
            .context("opening partition store")?,
    );
    let delivery = BotClient::new(&settings.bot_token).context("building chat client")?;

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let worker = Arc::new(IngestWorker::new(
        store.clone(),
        ImapSource::new(),
        settings.keywords.clone(),
        events_tx,
    ));
    let dispatcher = Dispatcher::new(store.clone(), delivery);
    let reconciler = Reconciler::new(store.clone());

    let dispatch_task = tokio::spawn(async move { dispatcher.run(events_rx).await });
    let scheduler_task = tokio::spawn(scheduler::run_ingest_scheduler(
        store.clone(),
        worker,
        Duration::from_secs(settings.scheduler_tick_secs),
    ));
    let reconcile_task = tokio::spawn(scheduler::run_reconciler(
        reconciler,
        Duration::from_secs(settings.reconcile_interval_secs),
        settings.reconcile_dry_run,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("shutdown signal received; stopping");

    scheduler_task.abort();
    reconcile_task.abort();
    dispatch_task.abort();

    Ok(())
}
