//! Conductor - agent orchestration runtime
//!
//! A reasoning loop over an injected completion provider, a name-keyed tool
//! registry that local and MCP-backed tools share, context compression and
//! sharing, and a sub-agent manager for parallel and dependency-ordered work.

pub mod agent;
pub mod config;
pub mod error;
pub mod providers;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{Agent, AgentOptions, AgentResult, SubAgentManager, Task};
pub use config::Config;
pub use error::{ConductorError, Result};
pub use providers::{ChatOptions, CompletionProvider};
pub use session::{ConversationStore, Message, Role, SessionManager};
pub use tools::{Tool, ToolCall, ToolDefinition, ToolResult};
