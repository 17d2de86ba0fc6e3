//! Mailbox ingestion worker.
//!
//! One scheduled task per mailbox configuration: connect, fetch unseen,
//! deduplicate, classify, persist, and emit an event per new record for the
//! dispatcher. Runs are single-flight per configuration; a trigger that
//! finds the previous run still going is dropped, not queued.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use mailwarden_mailbox::{RawMessage, Session};

use crate::email::{EmailId, EmailRecord, EmailRepository, EmailStatus, PriorityKeywords};
use crate::mailbox::{MailboxConfig, MailboxConfigId, MailboxRepository};
use crate::partition::{PartitionStore, TenantId, TenantPartition};
use crate::{Error, Result};

/// Default bound on the mailbox connect handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default bound on each mailbox command.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Emitted after each successful, atomic email record write. Consuming this
/// event is the only path that triggers notification delivery.
#[derive(Debug, Clone, Copy)]
pub struct EmailEvent {
    /// Tenant owning the new record.
    pub tenant_id: TenantId,
    /// The new record in that tenant's partition.
    pub email_id: EmailId,
}

/// An open mailbox connection scoped to one poll.
#[async_trait]
pub trait MailboxConnection: Send {
    /// Returns unseen messages, newest last, at most `max` of them.
    async fn unseen(
        &mut self,
        max: u32,
    ) -> std::result::Result<Vec<RawMessage>, mailwarden_mailbox::Error>;

    /// Flags a message processed so the next poll skips it server-side.
    async fn acknowledge(
        &mut self,
        uid: u32,
    ) -> std::result::Result<(), mailwarden_mailbox::Error>;

    /// Ends the connection cleanly.
    async fn close(self: Box<Self>) -> std::result::Result<(), mailwarden_mailbox::Error>;
}

/// Opens mailbox connections for configurations. The seam that lets tests
/// drive the worker without a server.
#[async_trait]
pub trait MailboxSource: Send + Sync {
    /// Connects and authenticates a session for one poll.
    async fn open(
        &self,
        config: &MailboxConfig,
    ) -> std::result::Result<Box<dyn MailboxConnection>, mailwarden_mailbox::Error>;
}

/// Production source backed by the IMAP client crate.
pub struct ImapSource {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl ImapSource {
    /// Create a source with the default timeouts.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl Default for ImapSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailboxSource for ImapSource {
    async fn open(
        &self,
        config: &MailboxConfig,
    ) -> std::result::Result<Box<dyn MailboxConnection>, mailwarden_mailbox::Error> {
        let mut session = Session::connect(
            &config.host,
            config.port,
            config.use_tls,
            self.connect_timeout,
        )
        .await?;
        session.set_command_timeout(self.command_timeout);
        session.login(&config.username, &config.password).await?;
        session.select(&config.folder).await?;
        Ok(Box::new(ImapConnection { session }))
    }
}

struct ImapConnection {
    session: Session,
}

#[async_trait]
impl MailboxConnection for ImapConnection {
    async fn unseen(
        &mut self,
        max: u32,
    ) -> std::result::Result<Vec<RawMessage>, mailwarden_mailbox::Error> {
        let mut uids = self.session.search_unseen().await?;

        let max = max as usize;
        if uids.len() > max {
            // Keep the most recent; the rest stay unseen for the next poll.
            debug!(total = uids.len(), max, "bounding poll batch");
            uids = uids.split_off(uids.len() - max);
        }

        let mut messages = Vec::with_capacity(uids.len());
        for uid in uids {
            messages.push(self.session.fetch(uid).await?);
        }
        Ok(messages)
    }

    async fn acknowledge(
        &mut self,
        uid: u32,
    ) -> std::result::Result<(), mailwarden_mailbox::Error> {
        self.session.mark_seen(uid).await
    }

    async fn close(self: Box<Self>) -> std::result::Result<(), mailwarden_mailbox::Error> {
        self.session.logout().await
    }
}

/// Counters from one ingestion run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOutcome {
    /// Messages the server handed back.
    pub fetched: usize,
    /// New email records written.
    pub created: usize,
    /// Messages skipped because their identifier was already present.
    pub duplicates: usize,
}

/// The per-tenant ingestion worker.
pub struct IngestWorker<S> {
    store: Arc<PartitionStore>,
    source: S,
    keywords: PriorityKeywords,
    events: mpsc::Sender<EmailEvent>,
    in_flight: Mutex<HashMap<(i64, i64), Arc<Mutex<()>>>>,
}

impl<S: MailboxSource> IngestWorker<S> {
    /// Create a worker.
    #[must_use]
    pub fn new(
        store: Arc<PartitionStore>,
        source: S,
        keywords: PriorityKeywords,
        events: mpsc::Sender<EmailEvent>,
    ) -> Self {
        Self {
            store,
            source,
            keywords,
            events,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run one poll for a configuration.
    ///
    /// Returns `Ok(None)` when the run was skipped: a previous run for the
    /// same configuration is still in flight, or the configuration is
    /// disabled. The configuration's last-checked timestamp moves only when
    /// the whole run succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] on any network or auth failure, leaving
    /// no partial state; other errors come from the partition store or the
    /// database.
    pub async fn run_once(
        &self,
        tenant: TenantId,
        config_id: MailboxConfigId,
    ) -> Result<Option<IngestOutcome>> {
        let slot = {
            let mut map = self.in_flight.lock().await;
            map.entry((tenant.0, config_id.0))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let Ok(_guard) = slot.try_lock() else {
            debug!(%tenant, config = %config_id, "poll already in flight; dropping trigger");
            return Ok(None);
        };

        let partition = self.store.resolve(tenant).await?;
        let mailboxes = MailboxRepository::new(&partition);
        let Some(config) = mailboxes.get(config_id).await? else {
            return Err(Error::Config(format!(
                "mailbox configuration {config_id} not found in tenant {tenant}"
            )));
        };
        if !config.is_active {
            debug!(%tenant, config = %config_id, "configuration disabled; skipping");
            return Ok(None);
        }

        let outcome = self.process(&partition, &config).await?;
        mailboxes.mark_checked(config_id, Utc::now()).await?;

        info!(
            %tenant,
            config = %config.name,
            fetched = outcome.fetched,
            created = outcome.created,
            duplicates = outcome.duplicates,
            "mailbox poll finished"
        );
        Ok(Some(outcome))
    }

    /// Connect, fetch, classify, and persist one batch.
    async fn process(
        &self,
        partition: &TenantPartition,
        config: &MailboxConfig,
    ) -> Result<IngestOutcome> {
        let mut connection = self.source.open(config).await?;
        let messages = connection.unseen(config.max_per_poll).await?;

        let emails = EmailRepository::new(partition);
        let mut outcome = IngestOutcome {
            fetched: messages.len(),
            ..IngestOutcome::default()
        };

        for message in messages {
            let priority = self.keywords.classify(&message.subject, &message.body);
            let record = EmailRecord {
                id: None,
                message_id: message.message_id.clone(),
                sender: message.sender.clone(),
                recipient: message.recipients.join(", "),
                subject: message.subject.clone(),
                body: message.body.clone(),
                received_at: message.received_at,
                priority,
                status: EmailStatus::Pending,
                assigned_to: None,
                error_message: None,
                sent_at: None,
            };

            // One atomic insert both checks and writes; a duplicate
            // identifier is skipped silently (idempotent re-poll).
            match emails.insert_if_absent(&record).await? {
                Some(email_id) => {
                    outcome.created += 1;
                    debug!(
                        tenant = %partition.tenant_id(),
                        email = %email_id,
                        priority = priority.as_str(),
                        "email record created"
                    );
                    let event = EmailEvent {
                        tenant_id: partition.tenant_id(),
                        email_id,
                    };
                    if self.events.send(event).await.is_err() {
                        warn!("dispatcher channel closed; alert not queued");
                    }
                }
                None => {
                    outcome.duplicates += 1;
                    debug!(
                        tenant = %partition.tenant_id(),
                        message_id = %message.message_id,
                        "duplicate message skipped"
                    );
                }
            }

            if let Err(e) = connection.acknowledge(message.uid).await {
                warn!(uid = message.uid, error = %e, "could not flag message seen");
            }
        }

        if let Err(e) = connection.close().await {
            debug!(error = %e, "mailbox logout failed");
        }
        Ok(outcome)
    }
}
