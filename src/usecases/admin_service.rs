//! Admin command surface for the chat whitelist.
//!
//! Every privileged operation starts with `authorize`; the reply text for each
//! outcome is rendered here so the transport only has to send it.

use crate::domain::{Chat, CommandInvocation, DomainError, TextFormat};
use crate::ports::ChatRepository;
use crate::usecases::report_formatter::escape_markdown;
use chrono::DateTime;
use std::sync::Arc;
use tracing::{error, info, warn};

/// One message to send back to the chat the command came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub format: TextFormat,
}

impl Reply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Plain,
        }
    }

    fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Markdown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddedChat {
    pub chat: Chat,
    /// False when an existing entry was renamed/re-enabled.
    pub created: bool,
    /// Positive ids are private chats; accepted, but probably a mistake.
    pub suspicious_id: bool,
}

pub struct AdminService {
    chats: Arc<dyn ChatRepository>,
    admin_user_id: Option<i64>,
}

impl AdminService {
    pub fn new(chats: Arc<dyn ChatRepository>, admin_user_id: Option<i64>) -> Self {
        Self {
            chats,
            admin_user_id,
        }
    }

    /// Guard for privileged commands. With no administrator configured nobody passes.
    pub fn authorize(&self, user_id: Option<i64>) -> Result<(), DomainError> {
        match (user_id, self.admin_user_id) {
            (Some(caller), Some(admin)) if caller == admin => Ok(()),
            _ => {
                warn!(?user_id, "unauthorized admin command attempt");
                Err(DomainError::Unauthorized { user_id })
            }
        }
    }

    /// Register (or rename and re-enable) a chat.
    pub async fn add_chat(
        &self,
        user_id: Option<i64>,
        chat_id_arg: &str,
        name: &str,
    ) -> Result<AddedChat, DomainError> {
        self.authorize(user_id)?;
        let chat_id = parse_chat_id(chat_id_arg)?;
        let name = name.trim().trim_matches('"').trim();
        if name.is_empty() {
            return Err(DomainError::Registry("chat name must not be empty".to_string()));
        }

        let suspicious_id = chat_id > 0;
        if suspicious_id {
            warn!(chat_id, "adding chat with a positive id");
        }

        let created = self.chats.get_chat(chat_id).await?.is_none();
        let chat = self.chats.upsert_chat(chat_id, name).await?;
        info!(chat_id, name, created, admin_id = ?user_id, "admin registered chat");

        Ok(AddedChat {
            chat,
            created,
            suspicious_id,
        })
    }

    /// Soft delete.
    pub async fn remove_chat(
        &self,
        user_id: Option<i64>,
        chat_id_arg: &str,
    ) -> Result<Chat, DomainError> {
        self.authorize(user_id)?;
        let chat_id = parse_chat_id(chat_id_arg)?;
        let chat = self
            .chats
            .unregister(chat_id)
            .await?
            .ok_or_else(|| DomainError::Registry(format!("Chat not found: {chat_id}")))?;
        info!(chat_id, name = %chat.name, admin_id = ?user_id, "admin removed chat");
        Ok(chat)
    }

    /// Enabled chats only.
    pub async fn list_chats(&self, user_id: Option<i64>) -> Result<Vec<Chat>, DomainError> {
        self.authorize(user_id)?;
        self.chats.list_enabled().await
    }

    /// Route a command to its operation and render the replies.
    /// Unknown commands produce no reply.
    pub async fn handle_command(&self, cmd: &CommandInvocation) -> Vec<Reply> {
        match cmd.command.as_str() {
            "start" => vec![Reply::plain(
                "Bot is running and monitoring configured chats.",
            )],
            "get_chat_id" => vec![chat_info(cmd)],
            "admin" => match self.authorize(cmd.user_id) {
                Ok(()) => vec![Reply::markdown(HELP_TEXT)],
                Err(e) => vec![error_reply("admin", &e)],
            },
            "add_chat" => self.add_chat_command(cmd).await,
            "remove_chat" => self.remove_chat_command(cmd).await,
            "list_chats" => match self.list_chats(cmd.user_id).await {
                Ok(chats) => vec![render_chat_list(&chats)],
                Err(e) => vec![error_reply("list_chats", &e)],
            },
            _ => Vec::new(),
        }
    }

    async fn add_chat_command(&self, cmd: &CommandInvocation) -> Vec<Reply> {
        if let Err(e) = self.authorize(cmd.user_id) {
            return vec![error_reply("add_chat", &e)];
        }
        if cmd.args.len() < 2 {
            return vec![Reply::plain(
                "❌ Usage: /add_chat <chat_id> <chat_name>\n\n\
                 Example: /add_chat -1001234567890 \"Partner Channel\"\n\n\
                 Use /get_chat_id to find chat IDs",
            )];
        }

        let name = cmd.args[1..].join(" ");
        match self.add_chat(cmd.user_id, &cmd.args[0], &name).await {
            Ok(added) => {
                let mut replies = Vec::new();
                if added.suspicious_id {
                    replies.push(Reply::plain(format!(
                        "⚠️ Warning: chat_id should typically be negative for groups/channels.\n\
                         Received: {}\n\n\
                         Adding it anyway. Use /get_chat_id to verify.",
                        added.chat.chat_id
                    )));
                }
                let (headline, tail) = if added.created {
                    (
                        "✅ Chat added to whitelist:",
                        "\n\nBot will now collect messages from this chat.",
                    )
                } else {
                    ("✅ Chat updated in whitelist:", "")
                };
                replies.push(Reply::markdown(format!(
                    "{headline}\n\nChat ID: `{}`\nName: {}\nStatus: Enabled{tail}",
                    added.chat.chat_id,
                    escape_markdown(&added.chat.name)
                )));
                replies
            }
            Err(e) => vec![error_reply("add_chat", &e)],
        }
    }

    async fn remove_chat_command(&self, cmd: &CommandInvocation) -> Vec<Reply> {
        if let Err(e) = self.authorize(cmd.user_id) {
            return vec![error_reply("remove_chat", &e)];
        }
        if cmd.args.len() != 1 {
            return vec![Reply::plain(
                "❌ Usage: /remove_chat <chat_id>\n\n\
                 Example: /remove_chat -1001234567890\n\n\
                 Use /list_chats to see chat IDs",
            )];
        }

        match self.remove_chat(cmd.user_id, &cmd.args[0]).await {
            Ok(chat) => vec![Reply::markdown(format!(
                "✅ Chat removed from whitelist:\n\n\
                 Chat ID: `{}`\nName: {}\nStatus: Disabled\n\n\
                 Bot will no longer collect messages from this chat.",
                chat.chat_id,
                escape_markdown(&chat.name)
            ))],
            Err(e) => vec![error_reply("remove_chat", &e)],
        }
    }
}

fn parse_chat_id(arg: &str) -> Result<i64, DomainError> {
    arg.trim().parse::<i64>().map_err(|_| {
        DomainError::Registry(format!(
            "Invalid chat_id: '{arg}'. Chat ID must be a number (usually negative for groups/channels)"
        ))
    })
}

fn error_reply(command: &str, e: &DomainError) -> Reply {
    match e {
        DomainError::Unauthorized { .. } => Reply::plain("⛔️ Access denied. Admin only command."),
        DomainError::Registry(msg) => Reply::plain(format!("❌ {msg}")),
        other => {
            error!(command, error = %other, "admin command failed");
            Reply::plain(format!(
                "❌ Error running /{command}: {other}\n\nPlease contact the administrator."
            ))
        }
    }
}

fn chat_info(cmd: &CommandInvocation) -> Reply {
    info!(chat_id = cmd.chat_id, chat_type = %cmd.chat_kind, user_id = ?cmd.user_id, "chat id requested");
    Reply::markdown(format!(
        "🆔 *Chat Information:*\n\n\
         Chat ID: `{id}`\n\
         Chat Name: {name}\n\
         Chat Type: {kind}\n\n\
         📝 *Admin Command Example:*\n\
         `/add_chat {id} \"{raw}\"`",
        id = cmd.chat_id,
        name = escape_markdown(&cmd.chat_title),
        kind = cmd.chat_kind,
        raw = cmd.chat_title.replace('`', "'"),
    ))
}

fn render_chat_list(chats: &[Chat]) -> Reply {
    if chats.is_empty() {
        return Reply::plain(
            "📭 No whitelisted chats found.\n\nUse /add_chat to add a chat to the whitelist.",
        );
    }
    let mut text = String::from("📋 *Whitelisted Chats:*\n");
    for chat in chats {
        let added = DateTime::from_timestamp(chat.created_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| chat.created_at.to_string());
        text.push_str(&format!(
            "\n• {}\n  ID: `{}`\n  Added: {}\n",
            escape_markdown(&chat.name),
            chat.chat_id,
            added
        ));
    }
    Reply::markdown(text)
}

const HELP_TEXT: &str = "🔧 *Admin Commands*

*Whitelist Management:*
• `/add_chat <chat_id> <name>` - Add chat to whitelist
• `/remove_chat <chat_id>` - Remove chat from whitelist
• `/list_chats` - Show all whitelisted chats
• `/get_chat_id` - Show current chat ID

*How to add a channel:*
1. Send `/get_chat_id` in the channel you want to monitor
2. Copy the chat ID from the response
3. Use `/add_chat` with the chat ID and a name

*Note:* Only the configured admin can use these commands.";
