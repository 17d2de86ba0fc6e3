//! Notification dispatcher.
//!
//! Consumes email events, resolves the tenant's eligible chat destinations,
//! claims one notification per (email, chat) pair, and delivers with a
//! bounded retry/backoff policy. This event path is the only trigger of
//! delivery anywhere in the system.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use mailwarden_chat::{BotClient, SendError, escape_html};

use super::ingest::EmailEvent;
use crate::chat::ChatRepository;
use crate::email::{EmailRecord, EmailRepository};
use crate::notify::{NotificationId, NotificationRepository};
use crate::partition::PartitionStore;
use crate::Result;

/// Characters of body preview included in a rendered alert.
const PREVIEW_CHARS: usize = 200;

/// Sends rendered alert text to a chat. The seam that lets tests observe
/// deliveries without a provider.
#[async_trait]
pub trait ChatDelivery: Send + Sync {
    /// Deliver `text` to `chat_id`, returning the provider message id.
    async fn send(&self, chat_id: i64, text: &str) -> std::result::Result<i64, SendError>;
}

#[async_trait]
impl ChatDelivery for BotClient {
    async fn send(&self, chat_id: i64, text: &str) -> std::result::Result<i64, SendError> {
        BotClient::send(self, chat_id, text).await
    }
}

/// Bounded retry policy for transient delivery failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total delivery attempts per notification (first try included).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay after a failed `attempt` (1-based). A provider retry-after
    /// hint overrides the doubling schedule.
    #[must_use]
    pub fn delay_after(&self, attempt: u32, hint: Option<u64>) -> Duration {
        hint.map_or_else(
            || self.base_delay * 2_u32.saturating_pow(attempt.saturating_sub(1)),
            Duration::from_secs,
        )
    }
}

/// Counters from dispatching one email event.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOutcome {
    /// Destinations whose filters accepted the record.
    pub eligible: usize,
    /// Notifications delivered.
    pub delivered: usize,
    /// Notifications that exhausted retries or failed permanently.
    pub failed: usize,
    /// Pairs skipped because a notification already existed.
    pub skipped: usize,
}

/// The event-driven notification dispatcher.
pub struct Dispatcher<D> {
    store: Arc<PartitionStore>,
    delivery: D,
    retry: RetryPolicy,
}

impl<D: ChatDelivery> Dispatcher<D> {
    /// Create a dispatcher with the default retry policy.
    #[must_use]
    pub fn new(store: Arc<PartitionStore>, delivery: D) -> Self {
        Self {
            store,
            delivery,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Consume events until the channel closes. Dispatch errors are logged
    /// and never tear down the loop.
    pub async fn run(&self, mut events: mpsc::Receiver<EmailEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.dispatch(&event).await {
                error!(
                    tenant = %event.tenant_id,
                    email = %event.email_id,
                    error = %e,
                    "dispatch failed"
                );
            }
        }
        info!("email event channel closed; dispatcher stopping");
    }

    /// Dispatch one email event.
    ///
    /// Re-triggering for the same email is harmless: every (email, chat)
    /// pair that already has a notification is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant cannot be resolved or a database
    /// operation fails; individual delivery failures are recorded on the
    /// notification rows instead.
    pub async fn dispatch(&self, event: &EmailEvent) -> Result<DispatchOutcome> {
        let partition = self.store.resolve(event.tenant_id).await?;
        let emails = EmailRepository::new(&partition);
        let Some(email) = emails.get(event.email_id).await? else {
            warn!(tenant = %event.tenant_id, email = %event.email_id, "event for unknown email record");
            return Ok(DispatchOutcome::default());
        };

        let chats = ChatRepository::new(self.store.shared().clone());
        let destinations: Vec<_> = chats
            .list_email_recipients(event.tenant_id)
            .await?
            .into_iter()
            .filter(|d| d.wants_email_alert(email.priority))
            .collect();

        if destinations.is_empty() {
            debug!(tenant = %event.tenant_id, email = %event.email_id, "no eligible destination");
            emails.mark_ignored(event.email_id).await?;
            return Ok(DispatchOutcome::default());
        }

        let notifications = NotificationRepository::new(self.store.shared().clone());
        let body = render_alert(&email);
        let mut outcome = DispatchOutcome {
            eligible: destinations.len(),
            ..DispatchOutcome::default()
        };

        for destination in &destinations {
            // Claim the pair before any send; a pair that is already
            // claimed was handled by an earlier trigger.
            let Some(notification_id) = notifications
                .claim(event.tenant_id, event.email_id, destination.chat_id, &body)
                .await?
            else {
                outcome.skipped += 1;
                debug!(
                    tenant = %event.tenant_id,
                    email = %event.email_id,
                    chat = destination.chat_id,
                    "notification already exists; skipping"
                );
                continue;
            };

            if self
                .deliver(&notifications, notification_id, destination.chat_id, &body)
                .await?
            {
                outcome.delivered += 1;
            } else {
                outcome.failed += 1;
            }
        }

        if outcome.delivered > 0 {
            emails.mark_sent(event.email_id, Utc::now()).await?;
        } else if outcome.failed > 0 {
            emails
                .mark_failed(event.email_id, "all notification deliveries failed")
                .await?;
        }
        // All pairs skipped: an earlier trigger owns the record's status.

        info!(
            tenant = %event.tenant_id,
            email = %event.email_id,
            eligible = outcome.eligible,
            delivered = outcome.delivered,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "email dispatched"
        );
        Ok(outcome)
    }

    /// Attempt delivery with bounded retries. Returns whether it was sent.
    async fn deliver(
        &self,
        notifications: &NotificationRepository,
        id: NotificationId,
        chat_id: i64,
        body: &str,
    ) -> Result<bool> {
        for attempt in 1..=self.retry.max_attempts {
            match self.delivery.send(chat_id, body).await {
                Ok(provider_id) => {
                    notifications.mark_sent(id, provider_id, Utc::now()).await?;
                    return Ok(true);
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let hint = match &err {
                        SendError::RateLimited { retry_after } => *retry_after,
                        _ => None,
                    };
                    notifications.mark_retry(id, &err.to_string()).await?;
                    let delay = self.retry.delay_after(attempt, hint);
                    warn!(
                        chat = chat_id,
                        notification = %id,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "delivery failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    // Permanent failure, or retries exhausted. Forbidden and
                    // NotFound point at a dead destination; the reconciler
                    // will pick it up if its owning binding is gone too.
                    let failure = crate::Error::from(err);
                    notifications.mark_failed(id, &failure.to_string()).await?;
                    error!(
                        chat = chat_id,
                        notification = %id,
                        error = %failure,
                        "delivery permanently failed"
                    );
                    return Ok(false);
                }
            }
        }
        Ok(false)
    }
}

/// Render the fixed-format alert for an email record.
///
/// Priority tag, sender, subject, received timestamp, and a bounded body
/// preview, in the provider's HTML parse mode.
#[must_use]
pub fn render_alert(email: &EmailRecord) -> String {
    let emoji = match email.priority {
        crate::email::Priority::High => "\u{1f534}",
        crate::email::Priority::Medium => "\u{1f7e1}",
        crate::email::Priority::Low => "\u{1f7e2}",
    };
    let sender = if email.sender.is_empty() {
        "(unknown sender)".to_string()
    } else {
        escape_html(&email.sender)
    };
    let subject = if email.subject.is_empty() {
        "(no subject)".to_string()
    } else {
        escape_html(&email.subject)
    };

    let mut text = format!(
        "{emoji} <b>New email - {} priority</b>\n\n\
         <b>From:</b> {sender}\n\
         <b>Subject:</b> {subject}\n\
         <b>Received:</b> {}",
        email.priority.tag(),
        email.received_at.format("%H:%M:%S %d/%m/%Y"),
    );

    if !email.body.is_empty() {
        let preview: String = email.body.chars().take(PREVIEW_CHARS).collect();
        let ellipsis = if email.body.chars().count() > PREVIEW_CHARS {
            "..."
        } else {
            ""
        };
        text.push_str(&format!(
            "\n\n<b>Preview:</b>\n<i>{}{ellipsis}</i>",
            escape_html(&preview)
        ));
    }

    text
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::email::{EmailId, EmailStatus, Priority};

    fn email(priority: Priority, body: &str) -> EmailRecord {
        EmailRecord {
            id: Some(EmailId(1)),
            message_id: "m1".to_string(),
            sender: "ops <ops@example.com>".to_string(),
            recipient: "alerts@acme.example".to_string(),
            subject: "urgente pedido".to_string(),
            body: body.to_string(),
            received_at: Utc::now(),
            priority,
            status: EmailStatus::Pending,
            assigned_to: None,
            error_message: None,
            sent_at: None,
        }
    }

    #[test]
    fn test_render_contains_fields() {
        let text = render_alert(&email(Priority::High, "cuerpo del mensaje"));
        assert!(text.contains("HIGH"));
        assert!(text.contains("ops &lt;ops@example.com&gt;"));
        assert!(text.contains("urgente pedido"));
        assert!(text.contains("Preview:"));
    }

    #[test]
    fn test_render_truncates_preview() {
        let long_body = "x".repeat(500);
        let text = render_alert(&email(Priority::Low, &long_body));
        assert!(text.contains(&format!("{}...", "x".repeat(PREVIEW_CHARS))));
        assert!(!text.contains(&"x".repeat(PREVIEW_CHARS + 1)));
    }

    #[test]
    fn test_render_empty_body_has_no_preview() {
        let text = render_alert(&email(Priority::Medium, ""));
        assert!(!text.contains("Preview:"));
    }

    #[test]
    fn test_retry_delays_double() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_after(1, None), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2, None), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3, None), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_honors_provider_hint() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1, Some(11)), Duration::from_secs(11));
    }
}
