//! Context-window accounting and compression.
//!
//! Token counts are estimated, not measured: the character length of all
//! text, tool inputs and tool results divided by four. Compression is lossy.
//! Older messages are replaced by a single summary line and only the recent
//! window survives verbatim.

use serde::Serialize;
use tracing::debug;

use crate::session::{Message, Role};

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Non-system messages kept verbatim by [`ContextManager::compress`].
pub const KEEP_RECENT: usize = 10;

/// Fraction of the context window that triggers compression.
pub const COMPRESSION_THRESHOLD: f64 = 0.8;

/// Result of [`ContextManager::get_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    pub message_count: usize,
    pub estimated_tokens: usize,
    /// Whether `compress` would change the history right now.
    pub compressed: bool,
}

/// Estimates conversation size and compresses it past the threshold.
#[derive(Debug, Clone, Copy)]
pub struct ContextManager {
    max_context_length: usize,
    enabled: bool,
}

impl ContextManager {
    pub fn new(max_context_length: usize, enabled: bool) -> Self {
        Self {
            max_context_length,
            enabled,
        }
    }

    pub fn max_context_length(&self) -> usize {
        self.max_context_length
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `ceil(total characters / 4)`.
    pub fn estimate_tokens(&self, messages: &[Message]) -> usize {
        let chars: usize = messages.iter().map(Message::char_len).sum();
        chars.div_ceil(CHARS_PER_TOKEN)
    }

    pub fn needs_compression(&self, messages: &[Message]) -> bool {
        if !self.enabled {
            return false;
        }
        let threshold = self.max_context_length as f64 * COMPRESSION_THRESHOLD;
        self.estimate_tokens(messages) as f64 > threshold
    }

    /// Compressed copy of `messages`, or an unchanged copy when below the
    /// threshold.
    ///
    /// Output order: system message (if any), summary (only when something
    /// was elided), the last [`KEEP_RECENT`] non-system messages.
    pub fn compress(&self, messages: &[Message]) -> Vec<Message> {
        if !self.needs_compression(messages) {
            return messages.to_vec();
        }

        let before = self.estimate_tokens(messages);
        let system = messages.iter().find(|m| m.is_system());
        let others: Vec<&Message> = messages.iter().filter(|m| !m.is_system()).collect();
        let split = others.len().saturating_sub(KEEP_RECENT);
        let (old, recent) = others.split_at(split);

        let mut compressed = Vec::with_capacity(recent.len() + 2);
        compressed.extend(system.cloned());
        if !old.is_empty() {
            compressed.push(Message::new(
                Role::User,
                format!(
                    "[Previous conversation summary: {} messages were exchanged. Earlier tool calls and responses have been omitted.]",
                    old.len()
                ),
            ));
        }
        compressed.extend(recent.iter().map(|m| (*m).clone()));

        debug!(
            before_messages = messages.len(),
            after_messages = compressed.len(),
            before_tokens = before,
            after_tokens = self.estimate_tokens(&compressed),
            "Compressed conversation context"
        );
        compressed
    }

    pub fn get_stats(&self, messages: &[Message]) -> ContextStats {
        ContextStats {
            message_count: messages.len(),
            estimated_tokens: self.estimate_tokens(messages),
            compressed: self.needs_compression(messages),
        }
    }
}
