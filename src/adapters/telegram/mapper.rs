//! Bot API wire types and their mapping to domain updates.
//!
//! Only the fields the bot reads are modelled; everything else in the JSON is ignored.

use crate::domain::{CommandInvocation, InboundUpdate, IncomingMessage};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub channel_post: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub date: i64,
    pub chat: TgChat,
    #[serde(default)]
    pub from: Option<TgUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl TgUser {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

impl TgChat {
    /// Title for groups/channels, the username or first name for private chats.
    pub fn display_name(&self) -> String {
        self.title
            .clone()
            .or_else(|| self.username.clone())
            .or_else(|| self.first_name.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Map one Bot API update. Returns `None` for anything that is not a text message
/// (joins, media, edits, reactions).
pub fn update_to_domain(update: &Update) -> Option<InboundUpdate> {
    let msg = update.message.as_ref().or(update.channel_post.as_ref())?;
    let text = msg.text.as_deref()?;

    if let Some((command, args)) = parse_command(text) {
        return Some(InboundUpdate::Command(CommandInvocation {
            chat_id: msg.chat.id,
            chat_title: msg.chat.display_name(),
            chat_kind: msg.chat.kind.clone(),
            user_id: msg.from.as_ref().map(|u| u.id),
            command,
            args,
        }));
    }

    let (sender_id, sender_name) = match &msg.from {
        Some(user) => (user.id, user.full_name()),
        None => (0, "Unknown".to_string()),
    };

    Some(InboundUpdate::Text(IncomingMessage {
        chat_id: msg.chat.id,
        message_id: msg.message_id,
        sender_id,
        sender_name,
        text: text.to_string(),
        sent_at: msg.date,
    }))
}

/// `/Add_Chat@my_bot -100 Team` → (`add_chat`, [`-100`, `Team`]).
fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
    let rest = text.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }
    Some((name.to_lowercase(), parts.map(String::from).collect()))
}
