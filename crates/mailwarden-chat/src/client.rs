//! Bot HTTP API client.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error};

use crate::SendError;

/// Default request timeout, matching the provider's long-poll ceiling.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Chat delivery client backed by the Bot HTTP API.
///
/// One instance serves every tenant; the chat identifier routes the message.
#[derive(Debug, Clone)]
pub struct BotClient {
    http: reqwest::Client,
    base_url: String,
}

/// Successful `sendMessage` payload.
#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Throttling details attached to 429 responses.
#[derive(Debug, Default, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// Envelope every Bot API response arrives in.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    result: Option<SentMessage>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

impl BotClient {
    /// Creates a client for the given bot token.
    ///
    /// # Errors
    ///
    /// Returns the underlying builder error if the HTTP client cannot be
    /// constructed.
    pub fn new(token: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: format!("https://api.telegram.org/bot{token}"),
        })
    }

    /// Creates a client pointed at an arbitrary endpoint, for tests.
    #[must_use]
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Sends `text` (HTML parse mode) to `chat_id`.
    ///
    /// Returns the provider-assigned message id on success.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] classified for the retry policy.
    pub async fn send(&self, chat_id: i64, text: &str) -> Result<i64, SendError> {
        let url = format!("{}/sendMessage", self.base_url);
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SendError::Unknown(e.to_string()))?;

        let status = response.status().as_u16();
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| SendError::Unknown(format!("unreadable response: {e}")))?;

        if body.ok {
            if let Some(sent) = body.result {
                debug!(chat_id, message_id = sent.message_id, "message delivered");
                return Ok(sent.message_id);
            }
            return Err(SendError::Unknown("ok response without result".to_string()));
        }

        let failure = classify_failure(status, &body);
        error!(chat_id, status, %failure, "message delivery failed");
        Err(failure)
    }
}

/// Maps a failed response onto the dispatcher's failure taxonomy.
fn classify_failure(status: u16, body: &ApiResponse) -> SendError {
    let description = body
        .description
        .clone()
        .unwrap_or_else(|| format!("HTTP {status}"));

    match status {
        429 => SendError::RateLimited {
            retry_after: body.parameters.as_ref().and_then(|p| p.retry_after),
        },
        401 | 403 => SendError::Forbidden(description),
        404 => SendError::NotFound(description),
        400 if description.to_lowercase().contains("chat not found") => {
            SendError::NotFound(description)
        }
        _ => SendError::Unknown(description),
    }
}

/// Escapes text for the HTML parse mode.
///
/// Only the three structural characters need escaping; the provider rejects
/// messages with unbalanced angle brackets otherwise.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn api_error(description: &str, retry_after: Option<u64>) -> ApiResponse {
        ApiResponse {
            ok: false,
            result: None,
            description: Some(description.to_string()),
            parameters: retry_after.map(|s| ResponseParameters {
                retry_after: Some(s),
            }),
        }
    }

    #[test]
    fn test_classify_rate_limited() {
        let err = classify_failure(429, &api_error("Too Many Requests", Some(7)));
        match err {
            SendError::RateLimited { retry_after } => assert_eq!(retry_after, Some(7)),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_forbidden() {
        let err = classify_failure(403, &api_error("bot was kicked from the group chat", None));
        assert!(matches!(err, SendError::Forbidden(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_chat_not_found() {
        let err = classify_failure(400, &api_error("Bad Request: chat not found", None));
        assert!(matches!(err, SendError::NotFound(_)));

        let err = classify_failure(404, &api_error("Not Found", None));
        assert!(matches!(err, SendError::NotFound(_)));
    }

    #[test]
    fn test_classify_unknown_is_retryable() {
        let err = classify_failure(502, &api_error("Bad Gateway", None));
        assert!(matches!(err, SendError::Unknown(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_response_envelope_parses() {
        let body: ApiResponse =
            serde_json::from_str(r#"{"ok":true,"result":{"message_id":99}}"#).unwrap();
        assert!(body.ok);
        assert_eq!(body.result.unwrap().message_id, 99);

        let body: ApiResponse = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":12}}"#,
        )
        .unwrap();
        assert!(!body.ok);
        assert_eq!(body.parameters.unwrap().retry_after, Some(12));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<b>1 & 2</b>"),
            "&lt;b&gt;1 &amp; 2&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }
}
