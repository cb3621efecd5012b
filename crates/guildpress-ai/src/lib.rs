//! LLM plumbing shared by the processing pipeline: the chat-completion
//! driver and its retry policy, token budgeting, prompt templates,
//! response validation, anonymization, and usage accounting.

pub mod anonymize;
pub mod budget;
pub mod client;
pub mod error;
pub mod prompt;
pub mod retry;
pub mod usage;
pub mod validate;

pub use anonymize::{Anonymizer, PromptMessage};
pub use client::{ChatClient, CompletionRequest, CompletionResponse, HttpChatClient};
pub use error::AiError;
pub use prompt::PromptStore;
pub use retry::RetryPolicy;
pub use usage::{UsageTotals, UsageTracker};
