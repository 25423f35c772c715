//! Anthropic Messages API adapter.
//!
//! Implements `AiPort`: one user-turn prompt in, the first text block out.
//! Parsing the model's answer is the caller's business.

use crate::domain::DomainError;
use crate::ports::AiPort;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl AnthropicAdapter {
    /// # Arguments
    /// * `api_url` - Messages endpoint (e.g., "https://api.anthropic.com/v1/messages")
    /// * `api_key` - Anthropic API key
    /// * `model` - Model name (e.g., "claude-sonnet-4-20250514")
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            model,
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait::async_trait]
impl AiPort for AnthropicAdapter {
    async fn complete(&self, prompt: &str) -> Result<String, DomainError> {
        info!(
            model = %self.model,
            prompt_len = prompt.len(),
            "sending prompt to AI"
        );

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| DomainError::Ai(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %text, "AI API returned error");
            return Err(DomainError::Ai(format!(
                "API error {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Ai(format!("Failed to parse API response: {}", e)))?;

        let text = body
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| DomainError::Ai("No text content returned".to_string()))?;

        debug!(raw_len = text.len(), "received AI response");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn adapter(server: &mockito::Server) -> AnthropicAdapter {
        AnthropicAdapter::new(
            format!("{}/v1/messages", server.url()),
            "sk-test".to_string(),
            "claude-test".to_string(),
        )
    }

    #[tokio::test]
    async fn test_complete_returns_first_text_block() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "claude-test",
                "max_tokens": 4096,
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"msg_1","type":"message","content":[{"type":"text","text":"{\"questions\":[]}"}]}"#,
            )
            .create_async()
            .await;

        let text = adapter(&server).complete("hello").await.unwrap();
        assert_eq!(text, r#"{"questions":[]}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_maps_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body(r#"{"type":"error","error":{"type":"overloaded_error"}}"#)
            .create_async()
            .await;

        let err = adapter(&server).complete("hello").await.unwrap_err();
        match err {
            DomainError::Ai(msg) => {
                assert!(msg.contains("529"));
                assert!(msg.contains("overloaded_error"));
            }
            other => panic!("expected Ai error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_complete_without_text_block_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":[]}"#)
            .create_async()
            .await;

        let err = adapter(&server).complete("hello").await.unwrap_err();
        assert!(matches!(err, DomainError::Ai(_)));
    }
}
