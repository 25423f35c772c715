//! Routes inbound updates: text to the collector, commands to the admin service.

use crate::domain::InboundUpdate;
use crate::ports::{ChatChannel, UpdateHandler};
use crate::usecases::admin_service::AdminService;
use crate::usecases::message_collector::MessageCollector;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct UpdateDispatcher {
    collector: Arc<MessageCollector>,
    admin: Arc<AdminService>,
    channel: Arc<dyn ChatChannel>,
}

impl UpdateDispatcher {
    pub fn new(
        collector: Arc<MessageCollector>,
        admin: Arc<AdminService>,
        channel: Arc<dyn ChatChannel>,
    ) -> Self {
        Self {
            collector,
            admin,
            channel,
        }
    }
}

#[async_trait::async_trait]
impl UpdateHandler for UpdateDispatcher {
    async fn handle_update(&self, update: InboundUpdate) {
        match update {
            InboundUpdate::Text(message) => {
                let outcome = self.collector.handle_message(message).await;
                debug!(?outcome, "text update handled");
            }
            InboundUpdate::Command(cmd) => {
                for reply in self.admin.handle_command(&cmd).await {
                    if let Err(e) = self
                        .channel
                        .send_message(cmd.chat_id, &reply.text, reply.format)
                        .await
                    {
                        warn!(chat_id = cmd.chat_id, command = %cmd.command, error = %e, "failed to send command reply");
                    }
                }
            }
        }
    }
}
