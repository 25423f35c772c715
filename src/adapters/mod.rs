//! Infrastructure adapters. Implement outbound ports.
//!
//! Telegram Bot API, libsql, Anthropic, HTTP liveness. Map errors to DomainError.

pub mod ai;
pub mod http;
pub mod persistence;
pub mod telegram;
