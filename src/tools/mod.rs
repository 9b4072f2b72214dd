//! Tools module - Tool capability model for the reasoning loop
//!
//! This module provides the infrastructure for defining, registering and
//! executing tools requested by the completion provider.
//!
//! # Overview
//!
//! - `Tool` trait: The interface that all tools implement, local or remote
//! - `ToolRegistry`: Name-unique registry of tools
//! - `ToolExecutor`: Validates input, runs tools and folds failures into results
//! - `ToolPermissions`: Allow/block policy applied before execution
//! - `mcp`: Client side of the MCP protocol and the wrapper that exposes
//!   remote tools through the `Tool` trait
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use conductor::tools::{EchoTool, ToolCall, ToolExecutor, ToolRegistry};
//! use serde_json::json;
//! use tokio::sync::RwLock;
//!
//! # tokio_test::block_on(async {
//! let mut registry = ToolRegistry::new();
//! registry.register(Arc::new(EchoTool)).unwrap();
//! let executor = ToolExecutor::new(Arc::new(RwLock::new(registry)));
//!
//! let result = executor
//!     .execute(&ToolCall::new("c1", "echo", json!({"message": "Hello!"})))
//!     .await;
//! assert_eq!(result.content, "Hello!");
//! # });
//! ```

mod executor;
pub mod mcp;
mod permissions;
mod registry;
mod types;

pub use executor::ToolExecutor;
pub use permissions::{PermissionStrategy, ToolPermissions};
pub use registry::ToolRegistry;
pub use types::{InputSchema, Tool, ToolCall, ToolDefinition, ToolResult};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;

/// A simple echo tool for testing purposes.
///
/// This tool echoes back any message provided to it.
///
/// # Example
///
/// ```rust
/// use conductor::tools::{Tool, EchoTool};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let result = EchoTool.execute(json!({"message": "Hello"})).await;
/// assert_eq!(result.unwrap(), json!("Hello"));
/// # });
/// ```
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().required_property(
            "message",
            json!({
                "type": "string",
                "description": "The message to echo"
            }),
        )
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let message = input
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");
        Ok(Value::String(message.to_string()))
    }
}
