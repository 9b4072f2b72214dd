//! Moving slices of context between independent conversations.
//!
//! Agents never share a [`ConversationStore`]; they copy messages. These
//! helpers pick, filter and merge the copies.

use std::collections::HashSet;

use tracing::debug;

use crate::session::{ConversationStore, Message, Role};

/// Options for [`share`].
#[derive(Debug, Clone)]
pub struct ShareOptions {
    pub include_system: bool,
    /// Trailing messages kept after filtering
    pub max_messages: usize,
    /// Roles to keep; `None` keeps every role
    pub filter_by_role: Option<Vec<Role>>,
}

impl Default for ShareOptions {
    fn default() -> Self {
        Self {
            include_system: true,
            max_messages: 10,
            filter_by_role: None,
        }
    }
}

/// Options for [`merge`].
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Keep only the first occurrence of each (role, content) pair
    pub deduplicate: bool,
    pub max_messages: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            deduplicate: true,
            max_messages: 20,
        }
    }
}

/// All system messages followed by the last `max_messages` others.
pub fn extract_relevant(messages: &[Message], max_messages: usize) -> Vec<Message> {
    let (system, others): (Vec<&Message>, Vec<&Message>) =
        messages.iter().partition(|m| m.is_system());
    system
        .into_iter()
        .chain(tail(&others, max_messages).iter().copied())
        .cloned()
        .collect()
}

/// Replay a filtered tail of `from` into `into` through its append
/// operations, so the target keeps its own invariants. Returns the number of
/// messages replayed.
pub fn share(from: &[Message], into: &mut ConversationStore, options: &ShareOptions) -> usize {
    let selected: Vec<&Message> = from
        .iter()
        .filter(|m| {
            options
                .filter_by_role
                .as_ref()
                .map_or(true, |roles| roles.is_empty() || roles.contains(&m.role))
        })
        .filter(|m| options.include_system || !m.is_system())
        .collect();

    let selected = tail(&selected, options.max_messages);
    for message in selected {
        into.append((*message).clone());
    }
    debug!(count = selected.len(), "Shared messages between conversations");
    selected.len()
}

/// Concatenate `contexts` in order, optionally dropping repeated
/// (role, content) pairs, and keep the trailing `max_messages`.
pub fn merge(contexts: &[Vec<Message>], options: &MergeOptions) -> Vec<Message> {
    let mut seen = HashSet::new();
    let merged: Vec<&Message> = contexts
        .iter()
        .flatten()
        .filter(|m| !options.deduplicate || seen.insert((m.role, m.content_key())))
        .collect();
    tail(&merged, options.max_messages)
        .iter()
        .map(|m| (*m).clone())
        .collect()
}

/// One-line count of user messages, assistant messages and assistant
/// messages that requested tools.
pub fn summarize(messages: &[Message]) -> String {
    let user = messages.iter().filter(|m| m.role == Role::User).count();
    let assistant = messages.iter().filter(|m| m.role == Role::Assistant);
    let assistant_count = assistant.clone().count();
    let with_tools = assistant.filter(|m| m.has_tool_use()).count();
    format!(
        "Context summary: {} user messages, {} assistant messages, {} with tool calls",
        user, assistant_count, with_tools
    )
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}
