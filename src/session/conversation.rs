//! In-memory conversation history owned by one agent.

use crate::tools::ToolResult;

use super::types::{ContentBlock, Message, MessageContent, Role};

/// Ordered, role-tagged conversation history.
///
/// At most one system message exists and, when present, it is at index 0.
/// Messages are never edited after they are appended; compression replaces
/// the whole history through [`replace`](Self::replace).
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system prompt, replacing any existing one.
    pub fn add_system(&mut self, text: &str) {
        self.messages.retain(|m| !m.is_system());
        self.messages.insert(0, Message::system(text));
    }

    pub fn add_user(&mut self, content: impl Into<MessageContent>) {
        self.messages.push(Message::user(content));
    }

    /// Append an assistant message. Plain strings become a single text block.
    pub fn add_assistant(&mut self, content: impl Into<MessageContent>) {
        let content = match content.into() {
            MessageContent::Text(text) => MessageContent::Blocks(vec![ContentBlock::text(text)]),
            blocks => blocks,
        };
        self.messages.push(Message::new(Role::Assistant, content));
    }

    /// Append every result as one user message of `tool_result` blocks,
    /// in the order given.
    pub fn add_tool_results(&mut self, results: &[ToolResult]) {
        if results.is_empty() {
            return;
        }
        let blocks = results
            .iter()
            .map(|r| ContentBlock::ToolResult {
                tool_use_id: r.tool_call_id.clone(),
                content: r.content.clone(),
                is_error: r.is_error.then_some(true),
            })
            .collect::<Vec<_>>();
        self.messages.push(Message::user(blocks));
    }

    /// Replay an existing message through the append operations above.
    pub fn append(&mut self, message: Message) {
        match message.role {
            Role::System => self.add_system(&message.text()),
            Role::User => self.add_user(message.content),
            Role::Assistant => self.add_assistant(message.content),
        }
    }

    /// Copy of the current history.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Swap in a new history, e.g. after compression or when resuming.
    ///
    /// A system message that is not first is moved to the front; extra ones
    /// are dropped.
    pub fn replace(&mut self, messages: Vec<Message>) {
        let system = messages.iter().rev().find(|m| m.is_system()).cloned();
        self.messages = messages.into_iter().filter(|m| !m.is_system()).collect();
        if let Some(system) = system {
            self.messages.insert(0, system);
        }
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn system_prompt(&self) -> Option<String> {
        self.messages.first().filter(|m| m.is_system()).map(Message::text)
    }
}
