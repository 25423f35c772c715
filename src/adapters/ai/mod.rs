//! AI adapter module. Implements AiPort for LLM integration.

pub mod anthropic_adapter;
pub mod prompt;

pub use anthropic_adapter::AnthropicAdapter;
pub use prompt::messages_to_csv;
