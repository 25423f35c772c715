//! Ingestion. Stores text messages from whitelisted chats, drops everything else.

use crate::domain::IncomingMessage;
use crate::ports::{ChatRepository, MessageRepository};
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored,
    /// Chat unknown or disabled.
    Ignored,
    /// Whitelist lookup or insert failed; the message is dropped.
    Failed,
}

pub struct MessageCollector {
    chats: Arc<dyn ChatRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl MessageCollector {
    pub fn new(chats: Arc<dyn ChatRepository>, messages: Arc<dyn MessageRepository>) -> Self {
        Self { chats, messages }
    }

    /// Never fails: errors are logged and reported as `Failed`.
    pub async fn handle_message(&self, message: IncomingMessage) -> IngestOutcome {
        let chat_id = message.chat_id;
        let message_id = message.message_id;

        match self.chats.is_enabled(chat_id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(chat_id, "ignoring message from non-whitelisted chat");
                return IngestOutcome::Ignored;
            }
            Err(e) => {
                error!(chat_id, message_id, error = %e, "whitelist lookup failed");
                return IngestOutcome::Failed;
            }
        }

        match self.messages.save_message(&message).await {
            Ok(saved) => {
                info!(
                    chat_id,
                    message_id,
                    sender = %saved.sender_name,
                    "message collected"
                );
                IngestOutcome::Stored
            }
            Err(e) => {
                error!(chat_id, message_id, error = %e, "failed to store message");
                IngestOutcome::Failed
            }
        }
    }
}
