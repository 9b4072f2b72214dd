//! Completion provider boundary.
//!
//! The runtime never talks to a model API directly. It hands the
//! conversation and the tool definitions to a [`CompletionProvider`] and gets
//! back a raw structured payload, which [`parse_response`](super::parse_response)
//! turns into text and tool calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::session::Message;
use crate::tools::ToolDefinition;

/// Per-request generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Anything that can turn a conversation into the next assistant payload.
///
/// The returned value has the shape
/// `{"response": "...", "reasoning": "...", "tool_calls": [{"id", "name", "input"}]}`;
/// `usage.input_tokens` and `usage.output_tokens` are read when present.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<Value>;

    /// Short provider name used in logs.
    fn name(&self) -> &str;
}
