//! Raw message representation handed to the ingestion worker.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::parser;

/// A message fetched from the mailbox, reduced to the fields the alert
/// pipeline consumes.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Server-side UID within the selected folder.
    pub uid: u32,
    /// Stable unique identifier: the `Message-ID` header, or a digest of
    /// sender/subject/date when the header is missing.
    pub message_id: String,
    /// Sender address (raw `From:` value).
    pub sender: String,
    /// Recipient addresses (raw `To:` value, comma-split).
    pub recipients: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    /// Assembles a message from the fetched header block, body text, and
    /// the FETCH segment carrying INTERNALDATE.
    #[must_use]
    pub fn from_parts(uid: u32, header_block: &str, body: String, fetch_segment: &str) -> Self {
        let fields = parser::header_fields(header_block);

        let sender = parser::header_value(&fields, "From")
            .unwrap_or_default()
            .to_string();
        let subject = parser::header_value(&fields, "Subject")
            .unwrap_or_default()
            .to_string();
        let recipients = parser::header_value(&fields, "To")
            .map(|to| {
                to.split(',')
                    .map(|addr| addr.trim().to_string())
                    .filter(|addr| !addr.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let date_header = parser::header_value(&fields, "Date").unwrap_or_default();
        let received_at = parser::parse_date_header(date_header)
            .or_else(|| parser::parse_internal_date(fetch_segment))
            .unwrap_or_else(Utc::now);

        let message_id = parser::header_value(&fields, "Message-ID")
            .map(|id| id.trim_matches(['<', '>']).to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| derive_message_id(&sender, &subject, date_header));

        Self {
            uid,
            message_id,
            sender,
            recipients,
            subject,
            body,
            received_at,
        }
    }
}

/// Derives a stable identifier for messages without a `Message-ID` header.
///
/// Must be identical across runs for the same message, since it is the dedup
/// key in the tenant partition.
#[must_use]
pub fn derive_message_id(sender: &str, subject: &str, date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sender.as_bytes());
    hasher.update([0]);
    hasher.update(subject.as_bytes());
    hasher.update([0]);
    hasher.update(date.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256:");
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
