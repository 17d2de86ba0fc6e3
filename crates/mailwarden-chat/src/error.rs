//! Delivery failure classification.

use thiserror::Error;

/// A failed send, classified for the dispatcher's retry policy.
///
/// `Forbidden` and `NotFound` mean the destination itself is bad (bot kicked
/// from the chat, chat deleted) and must not be retried; the destination is
/// a candidate for reconciliation. `RateLimited` and `Unknown` are transient
/// and retried under backoff.
#[derive(Debug, Error)]
pub enum SendError {
    /// The provider throttled the request.
    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited {
        /// Seconds to wait before retrying, when the provider says.
        retry_after: Option<u64>,
    },

    /// The bot may not post to this chat.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The chat does not exist (anymore).
    #[error("chat not found: {0}")]
    NotFound(String),

    /// Transport error or an unrecognised provider response.
    #[error("delivery failed: {0}")]
    Unknown(String),
}

impl SendError {
    /// Whether retrying can possibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unknown(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(SendError::RateLimited { retry_after: None }.is_retryable());
        assert!(SendError::Unknown("boom".into()).is_retryable());
        assert!(!SendError::Forbidden("kicked".into()).is_retryable());
        assert!(!SendError::NotFound("gone".into()).is_retryable());
    }
}
