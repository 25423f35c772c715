//! Telegram Bot API adapter: outbound channel, update mapping, long polling.

pub mod bot_api;
pub mod mapper;
pub mod poller;

pub use bot_api::BotApiClient;
pub use poller::UpdatePoller;
