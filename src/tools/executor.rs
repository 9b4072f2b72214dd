//! Tool executor
//!
//! Dispatches tool calls against a shared registry. Every failure mode (unknown
//! tool, schema violation, error returned by the body, panic inside the body,
//! per-call timeout) becomes an error [`ToolResult`]; nothing escapes as `Err`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{ToolCall, ToolRegistry, ToolResult};

/// Executes tool calls against a registry.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<RwLock<ToolRegistry>>,
    timeout: Option<Duration>,
}

impl ToolExecutor {
    /// Create an executor over a shared registry.
    pub fn new(registry: Arc<RwLock<ToolRegistry>>) -> Self {
        Self {
            registry,
            timeout: None,
        }
    }

    /// Cap the run time of each individual call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The registry this executor dispatches against.
    pub fn registry(&self) -> Arc<RwLock<ToolRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Execute one call.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        // Clone the Arc out so the read lock is not held across the tool body.
        let tool = {
            let registry = self.registry.read().await;
            registry.get(&call.name)
        };

        let Some(tool) = tool else {
            warn!(tool = %call.name, "Tool not found");
            return ToolResult::error(&call.id, format!("Tool not found: {}", call.name));
        };

        if let Err(e) = tool.input_schema().validate(&call.input) {
            debug!(tool = %call.name, error = %e, "Tool input rejected");
            return ToolResult::error(&call.id, e.to_string());
        }

        let start = Instant::now();
        let body = AssertUnwindSafe(tool.execute(call.input.clone())).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, body).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(tool = %call.name, timeout_ms = limit.as_millis() as u64, "Tool timed out");
                    return ToolResult::error(
                        &call.id,
                        format!("Tool '{}' timed out after {}ms", call.name, limit.as_millis()),
                    );
                }
            },
            None => body.await,
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(value)) => {
                info!(tool = %call.name, duration_ms, "Tool executed successfully");
                ToolResult::success(&call.id, render(value))
            }
            Ok(Err(e)) => {
                error!(tool = %call.name, error = %e, duration_ms, "Tool execution failed");
                ToolResult::error(&call.id, e.to_string())
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                error!(tool = %call.name, error = %message, duration_ms, "Tool panicked");
                ToolResult::error(&call.id, message)
            }
        }
    }

    /// Execute all calls concurrently. Results follow the order of `calls`.
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| self.execute(call))).await
    }

    /// Execute calls one at a time, in order.
    pub async fn execute_all_sequential(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call).await);
        }
        results
    }
}

/// Strings pass through untouched, everything else is pretty printed JSON.
fn render(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConductorError, Result};
    use crate::tools::{EchoTool, InputSchema, Tool};
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn input_schema(&self) -> InputSchema {
            InputSchema::new()
        }
        async fn execute(&self, _input: Value) -> Result<Value> {
            Err(ConductorError::Tool("disk on fire".into()))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "panic"
        }
        fn description(&self) -> &str {
            "Panics"
        }
        fn input_schema(&self) -> InputSchema {
            InputSchema::new()
        }
        async fn execute(&self, _input: Value) -> Result<Value> {
            panic!("unexpected state");
        }
    }

    struct JsonTool;

    #[async_trait]
    impl Tool for JsonTool {
        fn name(&self) -> &str {
            "json"
        }
        fn description(&self) -> &str {
            "Returns structured data"
        }
        fn input_schema(&self) -> InputSchema {
            InputSchema::new().deny_unknown()
        }
        async fn execute(&self, _input: Value) -> Result<Value> {
            Ok(json!({"files": ["a", "b"]}))
        }
    }

    struct SlowTool(u64);

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        fn input_schema(&self) -> InputSchema {
            InputSchema::new()
        }
        async fn execute(&self, input: Value) -> Result<Value> {
            tokio::time::sleep(Duration::from_millis(self.0)).await;
            Ok(input)
        }
    }

    async fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        registry.register(Arc::new(FailingTool)).unwrap();
        registry.register(Arc::new(PanickingTool)).unwrap();
        registry.register(Arc::new(JsonTool)).unwrap();
        registry.register(Arc::new(SlowTool(200))).unwrap();
        ToolExecutor::new(Arc::new(RwLock::new(registry)))
    }

    #[tokio::test]
    async fn test_execute_success() {
        let exec = executor().await;
        let result = exec
            .execute(&ToolCall::new("c1", "echo", json!({"message": "hi"})))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.tool_call_id, "c1");
        assert_eq!(result.content, "hi");
    }

    #[tokio::test]
    async fn test_execute_not_found_is_result() {
        let exec = executor().await;
        let result = exec.execute(&ToolCall::new("c1", "missing", json!({}))).await;
        assert!(result.is_error);
        assert!(result.content.contains("not found"));
    }

    #[tokio::test]
    async fn test_execute_missing_field() {
        let exec = executor().await;
        let result = exec.execute(&ToolCall::new("c1", "echo", json!({}))).await;
        assert!(result.is_error);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Missing required field: message")
        );
    }

    #[tokio::test]
    async fn test_execute_unexpected_field() {
        let exec = executor().await;
        let result = exec
            .execute(&ToolCall::new("c1", "json", json!({"extra": true})))
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("Unexpected field: extra"));
    }

    #[tokio::test]
    async fn test_execute_tool_error_captured() {
        let exec = executor().await;
        let result = exec.execute(&ToolCall::new("c1", "fail", json!({}))).await;
        assert!(result.is_error);
        assert!(result.content.contains("disk on fire"));
    }

    #[tokio::test]
    async fn test_execute_panic_captured() {
        let exec = executor().await;
        let result = exec.execute(&ToolCall::new("c1", "panic", json!({}))).await;
        assert!(result.is_error);
        assert!(result.content.contains("unexpected state"));
    }

    #[tokio::test]
    async fn test_execute_renders_json() {
        let exec = executor().await;
        let result = exec.execute(&ToolCall::new("c1", "json", json!({}))).await;
        assert!(!result.is_error);
        assert_eq!(
            result.content,
            serde_json::to_string_pretty(&json!({"files": ["a", "b"]})).unwrap()
        );
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let exec = executor().await.with_timeout(Duration::from_millis(20));
        let result = exec.execute(&ToolCall::new("c1", "slow", json!({}))).await;
        assert!(result.is_error);
        assert!(result.content.contains("timed out"));
    }

    #[tokio::test]
    async fn test_execute_all_preserves_order() {
        let exec = executor().await;
        let calls = vec![
            ToolCall::new("a", "slow", json!({"n": 1})),
            ToolCall::new("b", "missing", json!({})),
            ToolCall::new("c", "echo", json!({"message": "fast"})),
            ToolCall::new("d", "fail", json!({})),
        ];
        let results = exec.execute_all(&calls).await;
        let ids: Vec<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(!results[0].is_error);
        assert!(results[1].is_error);
        assert_eq!(results[2].content, "fast");
        assert!(results[3].is_error);
    }

    #[tokio::test]
    async fn test_execute_all_sequential_preserves_order() {
        let exec = executor().await;
        let calls = vec![
            ToolCall::new("x", "echo", json!({"message": "1"})),
            ToolCall::new("y", "fail", json!({})),
            ToolCall::new("z", "echo", json!({"message": "3"})),
        ];
        let results = exec.execute_all_sequential(&calls).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content, "1");
        assert!(results[1].is_error);
        assert_eq!(results[2].content, "3");
    }
}
