//! Analysis client. Turns a message window into an `AnalysisResult` via the AI port.
//!
//! Question detection, categorization and answer linkage are left to the model;
//! this side only builds the prompt and validates the JSON that comes back.
//! No retries here: a failed call fails the chat's report for this run.

use crate::adapters::ai::messages_to_csv;
use crate::domain::{AnalysisResult, DomainError, Message};
use crate::ports::{AiPort, Clock, MessageRepository};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct AnalysisClient {
    ai: Arc<dyn AiPort>,
    messages: Arc<dyn MessageRepository>,
    clock: Arc<dyn Clock>,
}

impl AnalysisClient {
    pub fn new(
        ai: Arc<dyn AiPort>,
        messages: Arc<dyn MessageRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ai,
            messages,
            clock,
        }
    }

    /// Analyze a message sequence. Empty input returns a zero-valued result without
    /// calling the model. Unparsable model output is an error, never an empty result.
    pub async fn analyze(&self, messages: &[Message]) -> Result<AnalysisResult, DomainError> {
        if messages.is_empty() {
            return Ok(AnalysisResult::empty());
        }

        let mut ordered: Vec<Message> = messages.to_vec();
        ordered.sort_by_key(|m| (m.sent_at, m.message_id));

        info!(messages = ordered.len(), "analyzing messages");

        let table = messages_to_csv(&ordered)?;
        let raw = self.ai.complete(&build_prompt(&table)).await?;
        debug!(
            raw = %raw.chars().take(500).collect::<String>(),
            "AI raw response"
        );

        let clean_json = sanitize_json(&raw);
        let parsed: AnalysisResult = serde_json::from_str(&clean_json).map_err(|e| {
            warn!(
                error = %e,
                json = %clean_json.chars().take(200).collect::<String>(),
                "JSON parse failed"
            );
            DomainError::Ai(format!("Invalid JSON response from model: {}", e))
        })?;

        if !parsed.is_consistent() {
            warn!(
                reported_total = parsed.summary.total_questions,
                listed = parsed.questions.len(),
                "model summary disagrees with question list; recomputing"
            );
        }
        let result = parsed.normalized();

        info!(
            total = result.summary.total_questions,
            answered = result.summary.answered,
            unanswered = result.summary.unanswered,
            "analysis complete"
        );
        Ok(result)
    }

    /// Analyze the trailing 24 hours of one chat. `None` when the window is empty.
    pub async fn analyze_chat_last_24h(
        &self,
        chat_id: i64,
    ) -> Result<Option<AnalysisResult>, DomainError> {
        let now = self.clock.now();
        let mut window = self.messages.get_messages_last_24h(chat_id, now).await?;
        if window.is_empty() {
            info!(chat_id, "no messages in the last 24 hours");
            return Ok(None);
        }
        window.reverse();
        self.analyze(&window).await.map(Some)
    }

    /// Analyze `start <= sent_at < end` of one chat. `None` when the window is empty.
    pub async fn analyze_period(
        &self,
        chat_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<AnalysisResult>, DomainError> {
        let window = self
            .messages
            .get_messages_between(chat_id, start, end)
            .await?;
        if window.is_empty() {
            info!(chat_id, %start, %end, "no messages in period");
            return Ok(None);
        }
        self.analyze(&window).await.map(Some)
    }
}

fn build_prompt(table: &str) -> String {
    format!(
        r#"Analyze the following Telegram messages and identify:

1. Questions: messages that ask for information or clarification.
   - Categorize each as technical, business, or other.
   - Keep the message id and text.
   - Skip rhetorical questions and pleasantries.

2. Answers: messages that respond to a question.
   - Link each answer to the question it addresses by message id.
   - Response time runs from the question's time to the first substantive answer's time, in minutes.

3. Summary statistics: total questions, answered vs unanswered, average response time.

Messages (semicolon-separated, oldest first):
{table}
Guidelines:
- Treat a multi-part question as one question unless the parts are clearly separate.
- Link answers using context and timing.

Respond with ONLY valid JSON, no explanations, no markdown, no code fences, in exactly this shape:
{{
  "questions": [
    {{
      "message_id": 123,
      "text": "question text",
      "category": "technical|business|other",
      "is_answered": true,
      "answer_message_id": 124,
      "response_time_minutes": 15.5
    }}
  ],
  "answers": [
    {{
      "message_id": 124,
      "text": "answer text",
      "answers_to_message_id": 123
    }}
  ],
  "summary": {{
    "total_questions": 1,
    "answered": 1,
    "unanswered": 0,
    "avg_response_time_minutes": 15.5
  }}
}}"#
    )
}

/// Sanitize JSON response from LLM.
///
/// LLMs sometimes wrap JSON in markdown code blocks or add prose around it.
fn sanitize_json(raw_text: &str) -> String {
    let trimmed = raw_text.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        let without_prefix = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end_idx) = without_prefix.rfind("```") {
            return without_prefix[..end_idx].trim().to_string();
        }
        return without_prefix.trim().to_string();
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return trimmed[start..=end].to_string();
        }
    }

    trimmed.to_string()
}
