//! MCP tool wrapper - adapts a remote MCP tool to the `Tool` trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::client::McpClient;
use super::protocol::RemoteTool;
use crate::error::Result;
use crate::tools::{InputSchema, Tool};

/// Wraps a single MCP tool as a local `Tool` implementation.
pub struct McpToolWrapper {
    /// Tool name as exposed to the agent: `server:tool`.
    tool_name: String,
    /// Server the tool lives on.
    server: String,
    /// The original tool name on the MCP server (without prefix).
    remote_name: String,
    description: String,
    input_schema: InputSchema,
    /// Shared reference to the MCP client.
    client: Arc<McpClient>,
}

impl McpToolWrapper {
    /// Create a wrapper for a tool discovered on `server`.
    pub fn new(server: &str, tool: &RemoteTool, client: Arc<McpClient>) -> Self {
        Self {
            tool_name: format!("{}:{}", server, tool.name),
            server: server.to_string(),
            remote_name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: InputSchema::from_value(&tool.input_schema),
            client,
        }
    }

    /// Get the remote (unprefixed) tool name.
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

#[async_trait]
impl Tool for McpToolWrapper {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> InputSchema {
        self.input_schema.clone()
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        self.client
            .call_tool(&self.server, &self.remote_name, input)
            .await
    }
}
