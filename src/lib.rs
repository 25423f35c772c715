//! tg-digest: collects messages from whitelisted Telegram chats and delivers a daily
//! AI question/answer digest, with Hexagonal Architecture.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
