//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{
    Chat, DomainError, IncomingMessage, Message, NewReport, Report, TextFormat,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Chat registry. Whitelist of chats; every call re-queries the store.
#[async_trait::async_trait]
pub trait ChatRepository: Send + Sync {
    /// Insert the chat, or rename an existing one. Either way the chat ends up enabled.
    async fn upsert_chat(&self, chat_id: i64, name: &str) -> Result<Chat, DomainError>;

    async fn get_chat(&self, chat_id: i64) -> Result<Option<Chat>, DomainError>;

    async fn list_enabled(&self) -> Result<Vec<Chat>, DomainError>;

    async fn list_all(&self) -> Result<Vec<Chat>, DomainError>;

    /// Returns the updated chat, or `None` if the chat is unknown.
    async fn set_enabled(&self, chat_id: i64, enabled: bool)
    -> Result<Option<Chat>, DomainError>;

    /// Hard delete: reports first, then messages, then the chat row.
    async fn delete_chat(&self, chat_id: i64) -> Result<bool, DomainError>;

    async fn is_enabled(&self, chat_id: i64) -> Result<bool, DomainError> {
        Ok(self.get_chat(chat_id).await?.is_some_and(|c| c.enabled))
    }

    /// Soft delete.
    async fn unregister(&self, chat_id: i64) -> Result<Option<Chat>, DomainError> {
        self.set_enabled(chat_id, false).await
    }
}

/// Message store. Append-only log queried by chat and time window.
#[async_trait::async_trait]
pub trait MessageRepository: Send + Sync {
    /// Store a message. A duplicate `(chat_id, message_id)` leaves the existing row untouched
    /// and returns it.
    async fn save_message(&self, message: &IncomingMessage) -> Result<Message, DomainError>;

    /// Messages with `since <= sent_at < until`, oldest first.
    async fn get_messages_between(
        &self,
        chat_id: i64,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Message>, DomainError>;

    async fn get_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Option<Message>, DomainError>;

    /// Delete every message (all chats) sent before `cutoff`. Returns rows removed.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError>;

    async fn count_messages(&self, chat_id: Option<i64>) -> Result<u64, DomainError>;

    /// Trailing 24h window ending at `now`, most recent first.
    async fn get_messages_last_24h(
        &self,
        chat_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>, DomainError> {
        let mut messages = self
            .get_messages_between(chat_id, now - Duration::hours(24), now + Duration::seconds(1))
            .await?;
        messages.reverse();
        Ok(messages)
    }
}

/// Report store. `chat_ref` is the registry row id (`Chat::id`).
#[async_trait::async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create_report(&self, report: &NewReport) -> Result<Report, DomainError>;

    async fn get_report(&self, report_id: i64) -> Result<Option<Report>, DomainError>;

    async fn get_by_chat_and_date(
        &self,
        chat_ref: i64,
        report_date: NaiveDate,
    ) -> Result<Option<Report>, DomainError>;

    /// Most recent first.
    async fn get_recent_by_chat(
        &self,
        chat_ref: i64,
        limit: u32,
    ) -> Result<Vec<Report>, DomainError>;

    async fn mark_sent(
        &self,
        report_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<Option<Report>, DomainError>;

    async fn delete_report(&self, report_id: i64) -> Result<bool, DomainError>;

    /// Delete one chat's reports dated before `before`.
    async fn delete_reports_before(
        &self,
        chat_ref: i64,
        before: NaiveDate,
    ) -> Result<u64, DomainError>;

    /// Delete reports of every chat dated before `before`.
    async fn delete_all_reports_before(&self, before: NaiveDate) -> Result<u64, DomainError>;
}

/// Language-model completion. Takes a prompt, returns the model's free text.
#[async_trait::async_trait]
pub trait AiPort: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, DomainError>;
}

/// Outbound messaging channel.
///
/// Errors carry the delivery outcome: `FloodWait` (rate limited), `Channel` (generic,
/// retryable), anything else is fatal.
#[async_trait::async_trait]
pub trait ChatChannel: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
    ) -> Result<(), DomainError>;
}

/// Wall-clock source. Injected so reports and windows are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
