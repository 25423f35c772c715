//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    /// Missing or invalid startup configuration. Fatal before any job runs.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed chat identifier or registry input from the admin surface.
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Unauthorized: user {user_id:?} is not the administrator")]
    Unauthorized { user_id: Option<i64> },

    #[error("AI analysis failed: {0}")]
    Ai(String),

    /// FloodWait error: the outbound channel asked us to wait `seconds` before retrying.
    #[error("FloodWait: retry after {seconds} seconds")]
    FloodWait { seconds: u64 },

    /// Generic outbound channel failure (rejected request, timeout). Retryable.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Unexpected delivery failure, or retries exhausted. Not retried.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Repository error: {0}")]
    Repo(String),
}
