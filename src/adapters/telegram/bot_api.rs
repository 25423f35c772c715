//! Implements ChatChannel over the Telegram Bot API (HTTPS + JSON).
//!
//! Rate limits surface as `FloodWait` with the server-provided wait; the retry
//! decision belongs to the caller.

use crate::adapters::telegram::mapper::Update;
use crate::domain::{DomainError, TextFormat};
use crate::ports::ChatChannel;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bot API envelope: `{"ok": true, "result": ...}` or
/// `{"ok": false, "error_code": 429, "description": ..., "parameters": {"retry_after": 5}}`.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// Telegram Bot API client. Shared via Arc between the poller and every sender.
pub struct BotApiClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl BotApiClient {
    /// `api_url`: Bot API root, e.g. "https://api.telegram.org".
    pub fn new(api_url: &str, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T, DomainError> {
        let response = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            // Strip the URL: it embeds the bot token.
            .map_err(|e| DomainError::Channel(format!("{method}: {}", e.without_url())))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DomainError::Channel(format!("{method}: {}", e.without_url())))?;

        let envelope: ApiResponse<T> = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(DomainError::Channel(format!("{method}: HTTP {status}")));
            }
            Err(e) => {
                return Err(DomainError::Delivery(format!(
                    "{method}: undecodable response: {e}"
                )));
            }
        };

        if envelope.ok {
            return envelope
                .result
                .ok_or_else(|| DomainError::Delivery(format!("{method}: ok without result")));
        }

        if let Some(seconds) = envelope.parameters.and_then(|p| p.retry_after) {
            warn!(method, seconds, "Bot API rate limit");
            return Err(DomainError::FloodWait { seconds });
        }

        Err(DomainError::Channel(format!(
            "{method}: {} {}",
            envelope.error_code.unwrap_or(status.as_u16() as i64),
            envelope.description.unwrap_or_default()
        )))
    }

    /// Check the token and return the bot's own identity.
    pub async fn get_me(&self) -> Result<BotUser, DomainError> {
        self.call("getMe", &serde_json::json!({}), REQUEST_TIMEOUT)
            .await
    }

    /// Long-poll for updates with `update_id >= offset`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, DomainError> {
        let mut body = serde_json::json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "channel_post"],
        });
        if let Some(offset) = offset {
            body["offset"] = serde_json::json!(offset);
        }
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &body,
                Duration::from_secs(timeout_secs) + REQUEST_TIMEOUT,
            )
            .await?;
        debug!(count = updates.len(), "received updates");
        Ok(updates)
    }
}

#[async_trait]
impl ChatChannel for BotApiClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
    ) -> Result<(), DomainError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if format == TextFormat::Markdown {
            body["parse_mode"] = serde_json::json!("Markdown");
        }
        let _sent: serde_json::Value = self.call("sendMessage", &body, REQUEST_TIMEOUT).await?;
        debug!(chat_id, len = text.chars().count(), "message sent");
        Ok(())
    }
}
