//! Domain entities. Pure data structures for the core business.
//!
//! No Telegram or IO types here; adapters map into these.
//! Timestamps are unix seconds (UTC).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A whitelisted chat. `chat_id` is the platform id (negative for groups/channels),
/// `id` is the registry row id referenced by reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub chat_id: i64,
    pub name: String,
    pub enabled: bool,
    pub created_at: i64,
}

/// A stored message from a whitelisted chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub message_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub text: String,
    pub sent_at: i64,
    /// Emoji -> count. Never populated by ingestion yet.
    pub reactions: Option<BTreeMap<String, u32>>,
    pub created_at: i64,
}

impl Message {
    /// Sender label used in prompts: display name, or the numeric id when the name is blank.
    pub fn sender_label(&self) -> String {
        if self.sender_name.trim().is_empty() {
            format!("User {}", self.sender_id)
        } else {
            self.sender_name.clone()
        }
    }
}

/// An inbound text message, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub text: String,
    pub sent_at: i64,
}

/// Persisted outcome of one report. `sent_at` stays `None` until delivery is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: i64,
    pub chat_ref: i64,
    pub report_date: NaiveDate,
    pub questions_count: u32,
    pub answered_count: u32,
    pub unanswered_count: u32,
    pub avg_response_time_minutes: Option<f64>,
    pub report_text: Option<String>,
    pub sent_at: Option<i64>,
    pub created_at: i64,
}

/// Fields needed to create a report row.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub chat_ref: i64,
    pub report_date: NaiveDate,
    pub questions_count: u32,
    pub answered_count: u32,
    pub unanswered_count: u32,
    pub avg_response_time_minutes: Option<f64>,
    pub report_text: Option<String>,
    pub sent_at: Option<i64>,
}

/// Rendering mode requested from the outbound channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Markdown,
}

/// What the update transport hands to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundUpdate {
    Text(IncomingMessage),
    Command(CommandInvocation),
}

/// A `/command arg1 arg2` sent in some chat.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInvocation {
    pub chat_id: i64,
    pub chat_title: String,
    pub chat_kind: String,
    pub user_id: Option<i64>,
    /// Lowercase command name without the leading `/` or `@botname` suffix.
    pub command: String,
    pub args: Vec<String>,
}
