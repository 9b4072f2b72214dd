//! Agent module - Reasoning loop, context handling and sub-agent scheduling
//!
//! This module provides:
//!
//! - [`Agent`]: one conversation plus one tool registry, running a fresh
//!   [`ReasoningLoop`] for every query
//! - [`ReasoningLoop`]: the turn-based provider/tool state machine
//! - [`ContextManager`]: token estimation and lossy compression
//! - [`sharing`]: copying filtered context between conversations
//! - [`SubAgentManager`]: named sub-agents, parallel and dependency-ordered
//!   task execution
//! - [`MetricsTracker`] and [`BudgetManager`]: usage counters and ceilings
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌───────────────┐     ┌────────────────────┐
//! │ SubAgentManager │────>│     Agent     │────>│ CompletionProvider │
//! │ (named agents)  │     │ ReasoningLoop │     │    (injected)      │
//! └─────────────────┘     └───────────────┘     └────────────────────┘
//!                            │          │
//!                            ▼          ▼
//!                  ┌──────────────┐  ┌──────────────┐
//!                  │ Conversation │  │ ToolExecutor │──> local tools
//!                  │    Store     │  │   Registry   │──> MCP servers
//!                  └──────────────┘  └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use conductor::agent::{Agent, AgentOptions};
//! use conductor::tools::EchoTool;
//!
//! async fn run(provider: Arc<dyn conductor::providers::CompletionProvider>) {
//!     let options = AgentOptions::new("my-model", "api-key").with_system_prompt("Be brief.");
//!     let mut agent = Agent::new(options, provider).unwrap();
//!     agent.register_tool(Arc::new(EchoTool)).await.unwrap();
//!
//!     let result = agent.query("Say hello through the echo tool").await;
//!     println!("{}", result.final_response);
//! }
//! ```

pub mod budget;
mod context;
mod instance;
mod r#loop;
pub mod metrics;
pub mod sharing;
mod subagent;

pub use budget::{BudgetManager, BudgetStatus, BudgetUsage};
pub use context::{ContextManager, ContextStats, CHARS_PER_TOKEN, COMPRESSION_THRESHOLD, KEEP_RECENT};
pub use instance::{Agent, AgentOptions};
pub use metrics::{Metrics, MetricsTracker};
pub use r#loop::{AgentResult, LoopHooks, LoopOptions, LoopState, ReasoningLoop, TurnResult};
pub use sharing::{MergeOptions, ShareOptions};
pub use subagent::{SubAgentManager, SubAgentOptions, Task, TaskResult};
