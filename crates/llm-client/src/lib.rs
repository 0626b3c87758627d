//! OpenAI chat-completions client for structured insight generation.

pub mod client;
pub mod types;

pub use client::{LlmClient, LlmConfig};
pub use types::{schema_instructions, LlmError, ModelExecution, ModelTier, Operation};
