//! Session types for Conductor
//!
//! This module defines the conversation data model: roles, content blocks and
//! messages, plus the persisted session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt (at most one, always first)
    System,
    /// Message from the user, also carries tool results
    User,
    /// Message from the assistant
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One block of structured message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },
    /// A request from the assistant to call a tool.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// The outcome of an earlier `ToolUse`, always inside a user message.
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

impl ContentBlock {
    /// Create a text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Characters this block contributes to the token estimate.
    pub(crate) fn char_len(&self) -> usize {
        match self {
            ContentBlock::Text { text } => text.chars().count(),
            ContentBlock::ToolUse { input, .. } => input.to_string().chars().count(),
            ContentBlock::ToolResult { content, .. } => content.chars().count(),
        }
    }
}

/// Message content: either a bare string or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        MessageContent::Blocks(blocks)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// Text or structured content
    pub content: MessageContent,
}

impl Message {
    /// Create a message with the given role and content.
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a new system message.
    ///
    /// # Example
    /// ```
    /// use conductor::session::{Message, Role};
    ///
    /// let msg = Message::system("You are a helpful assistant");
    /// assert_eq!(msg.role, Role::System);
    /// ```
    pub fn system(text: &str) -> Self {
        Self::new(Role::System, text)
    }

    /// Create a new user message.
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Check if this is a system message.
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Concatenated text of the message, ignoring tool blocks.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Structured blocks of this message (empty for bare-string content).
    pub fn blocks(&self) -> &[ContentBlock] {
        match &self.content {
            MessageContent::Text(_) => &[],
            MessageContent::Blocks(blocks) => blocks,
        }
    }

    /// Check if this message carries at least one `tool_use` block.
    pub fn has_tool_use(&self) -> bool {
        self.blocks()
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    /// Characters this message contributes to the token estimate.
    pub(crate) fn char_len(&self) -> usize {
        match &self.content {
            MessageContent::Text(text) => text.chars().count(),
            MessageContent::Blocks(blocks) => blocks.iter().map(ContentBlock::char_len).sum(),
        }
    }

    /// Serialized content, used as a dedup key.
    pub(crate) fn content_key(&self) -> String {
        serde_json::to_string(&self.content).unwrap_or_default()
    }
}

/// Counters stored alongside a persisted session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub message_count: usize,
    pub turn_count: usize,
    pub tool_call_count: usize,
}

/// A persisted conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session identifier
    pub session_id: String,
    /// Model used by the agent that produced the session
    #[serde(default)]
    pub model: String,
    /// Full conversation history
    pub messages: Vec<Message>,
    /// When this session was created
    pub created_at: DateTime<Utc>,
    /// When this session was last saved
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl SessionRecord {
    /// Create a new record stamped with the current time.
    pub fn new(session_id: &str, model: &str, messages: Vec<Message>) -> Self {
        let now = Utc::now();
        let metadata = SessionMetadata {
            message_count: messages.len(),
            turn_count: messages.iter().filter(|m| m.role == Role::Assistant).count(),
            tool_call_count: messages
                .iter()
                .flat_map(|m| m.blocks())
                .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
                .count(),
        };
        Self {
            session_id: session_id.to_string(),
            model: model.to_string(),
            messages,
            created_at: now,
            last_updated: now,
            metadata,
        }
    }
}

/// Summary row returned by `SessionManager::list`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub model: String,
    pub last_updated: DateTime<Utc>,
    pub message_count: usize,
}
