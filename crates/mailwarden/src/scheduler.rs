//! Scheduling loops: mailbox polling and reconciliation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use mailwarden_core::{
    IngestWorker, MailboxRepository, MailboxSource, PartitionStore, Reconciler,
};

/// Periodically scans every active tenant's mailbox configurations and
/// spawns a poll for each one that is due.
///
/// Configurations are re-read from the partitions on every tick, so edits
/// made through admin tooling take effect without a restart. Overlap
/// protection lives in the worker (single-flight per configuration); a
/// trigger landing on a busy configuration is dropped there.
pub async fn run_ingest_scheduler<S>(
    store: Arc<PartitionStore>,
    worker: Arc<IngestWorker<S>>,
    tick: Duration,
) where
    S: MailboxSource + 'static,
{
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let tenants = match store.list_active().await {
            Ok(tenants) => tenants,
            Err(e) => {
                error!(error = %e, "could not list tenants");
                continue;
            }
        };

        for tenant in tenants {
            let Some(tenant_id) = tenant.id else { continue };
            let partition = match store.resolve(tenant_id).await {
                Ok(partition) => partition,
                Err(e) => {
                    error!(tenant = %tenant_id, error = %e, "could not resolve partition");
                    continue;
                }
            };

            let configs = match MailboxRepository::new(&partition).list_active().await {
                Ok(configs) => configs,
                Err(e) => {
                    error!(tenant = %tenant_id, error = %e, "could not list mailbox configurations");
                    continue;
                }
            };

            for config in configs {
                let Some(config_id) = config.id else { continue };
                if !config.is_due(Utc::now()) {
                    continue;
                }
                debug!(tenant = %tenant_id, config = %config.name, "poll due");

                let worker = worker.clone();
                tokio::spawn(async move {
                    // Failures abort only this mailbox's run; other tenants
                    // and configurations are unaffected.
                    if let Err(e) = worker.run_once(tenant_id, config_id).await {
                        error!(
                            tenant = %tenant_id,
                            config = %config_id,
                            error = %e,
                            "mailbox poll failed"
                        );
                    }
                });
            }
        }
    }
}

/// Runs the orphan reconciler on its own schedule.
pub async fn run_reconciler(reconciler: Reconciler, interval: Duration, dry_run: bool) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The immediate first tick would sweep during startup; skip it.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = reconciler.run(dry_run).await {
            error!(error = %e, "reconciliation sweep failed");
        }
    }
}
