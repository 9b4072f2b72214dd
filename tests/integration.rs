//! Integration tests for Conductor
//!
//! These tests drive a full `Agent` against a scripted completion provider
//! and an in-process MCP transport: reasoning loop scenarios, remote tools,
//! session persistence, sub-agents and dependency scheduling.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::sync::{mpsc, Mutex};

use conductor::agent::{LoopState, SubAgentOptions, TaskResult};
use conductor::session::{ContentBlock, Role};
use conductor::tools::mcp::{Envelope, Transport};
use conductor::tools::{EchoTool, InputSchema, Tool};
use conductor::{
    Agent, AgentOptions, ChatOptions, CompletionProvider, ConductorError, Config, Message,
    SessionManager, SubAgentManager, Task, ToolDefinition,
};

// ============================================================================
// Mock provider and tools
// ============================================================================

/// Replays canned payloads in order; the last one repeats.
struct ScriptedProvider {
    replies: StdMutex<VecDeque<Value>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            replies: StdMutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        _options: &ChatOptions,
    ) -> conductor::Result<Value> {
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        Ok(reply.unwrap_or_else(|| json!({"response": ""})))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Answers `done: <last user text>` and records every prompt it sees. Prompts
/// containing "fail" produce a provider error.
#[derive(Default)]
struct EchoPromptProvider {
    seen: StdMutex<Vec<String>>,
}

#[async_trait]
impl CompletionProvider for EchoPromptProvider {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _options: &ChatOptions,
    ) -> conductor::Result<Value> {
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(Message::text)
            .unwrap_or_default();
        self.seen.lock().unwrap().push(prompt.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;
        if prompt.contains("fail") {
            return Err(ConductorError::Provider(format!("cannot handle '{}'", prompt)));
        }
        Ok(json!({"response": format!("done: {}", prompt)}))
    }

    fn name(&self) -> &str {
        "echo-prompt"
    }
}

struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file"
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().required_property("path", json!({"type": "string"}))
    }

    async fn execute(&self, _input: Value) -> conductor::Result<Value> {
        Ok(json!("CONTENTS"))
    }
}

fn options() -> AgentOptions {
    AgentOptions::new("test-model", "test-key").with_system_prompt("S")
}

fn tool_call(id: &str, name: &str, input: Value) -> Value {
    json!({"id": id, "name": name, "input": input})
}

// ============================================================================
// Reasoning loop scenarios
// ============================================================================

#[tokio::test]
async fn test_simple_turn() {
    let provider = ScriptedProvider::new(vec![json!({"response": "hi", "tool_calls": []})]);
    let mut agent = Agent::new(options(), provider).unwrap();

    let result = agent.query("hello").await;

    assert_eq!(result.final_response, "hi");
    assert_eq!(result.turns.len(), 1);
    assert_eq!(result.state, LoopState::Completed);
    assert!(!result.truncated);
    assert_eq!(agent.message_count(), 3);
}

#[tokio::test]
async fn test_one_tool_round_trip() {
    let provider = ScriptedProvider::new(vec![
        json!({
            "response": "reading",
            "tool_calls": [tool_call("c1", "read_file", json!({"path": "a.txt"}))]
        }),
        json!({"response": "done", "tool_calls": []}),
    ]);
    let mut agent = Agent::new(options(), provider).unwrap();
    agent.register_tool(Arc::new(ReadFileTool)).await.unwrap();

    let result = agent.query("read a.txt").await;

    assert_eq!(result.final_response, "done");
    assert_eq!(result.turns.len(), 2);
    assert_eq!(result.tool_calls.len(), 1);

    let tool_result = agent
        .messages()
        .iter()
        .flat_map(|m| m.blocks().to_vec())
        .find_map(|b| match b {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => Some((tool_use_id, content)),
            _ => None,
        });
    assert_eq!(
        tool_result,
        Some(("c1".to_string(), "CONTENTS".to_string()))
    );
}

#[tokio::test]
async fn test_unknown_tool_does_not_stop_loop() {
    let provider = ScriptedProvider::new(vec![
        json!({"response": "", "tool_calls": [tool_call("c1", "missing", json!({}))]}),
        json!({"response": "recovered"}),
    ]);
    let mut agent = Agent::new(options(), provider).unwrap();

    let result = agent.query("go").await;

    assert!(result.is_success());
    assert_eq!(result.final_response, "recovered");
    let first = result.turns[0].tool_results.as_ref().unwrap();
    assert!(first[0].is_error);
    assert!(first[0].content.contains("not found"));
}

#[tokio::test]
async fn test_max_turns_truncates() {
    let provider = ScriptedProvider::new(vec![json!({
        "response": "again",
        "tool_calls": [tool_call("c1", "echo", json!({"message": "x"}))]
    })]);
    let mut agent = Agent::new(options().with_max_turns(4), provider).unwrap();
    agent.register_tool(Arc::new(EchoTool)).await.unwrap();

    let result = agent.query("loop forever").await;

    assert_eq!(result.turns.len(), 4);
    assert!(result.truncated);
    assert_eq!(result.state, LoopState::MaxTurnsReached);
    assert!(matches!(result.error, Some(ConductorError::MaxTurnsReached(4))));
}

#[tokio::test]
async fn test_malformed_payload_fails_without_losing_history() {
    let provider = ScriptedProvider::new(vec![json!("not an object")]);
    let mut agent = Agent::new(options(), provider).unwrap();

    let result = agent.query("hello").await;

    assert!(result.is_failure());
    assert!(matches!(
        result.error,
        Some(ConductorError::MalformedResponse(_))
    ));
    assert_eq!(agent.message_count(), 2);
    assert_eq!(agent.messages()[1].text(), "hello");
}

// ============================================================================
// In-process MCP server
// ============================================================================

/// Answers the MCP handshake and serves one `read_file` tool.
struct InProcessServer {
    outbound: Mutex<Option<mpsc::Sender<Envelope>>>,
    inbound: Mutex<mpsc::Receiver<Envelope>>,
    connected: AtomicBool,
}

impl InProcessServer {
    fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel(16);
        Arc::new(Self {
            outbound: Mutex::new(Some(tx)),
            inbound: Mutex::new(rx),
            connected: AtomicBool::new(true),
        })
    }

    fn answer(method: &str, params: &Value) -> Value {
        match method {
            "initialize" => json!({"serverInfo": {"name": "files", "version": "1.0"}}),
            "tools/list" => json!({"tools": [{
                "name": "read_file",
                "description": "Read a file",
                "inputSchema": {"type": "object", "required": ["path"]}
            }]}),
            "resources/list" => json!({"resources": [{"uri": "file:///a.txt", "name": "a"}]}),
            "prompts/list" => json!({"prompts": []}),
            "tools/call" => {
                let path = params["arguments"]["path"].as_str().unwrap_or("?");
                json!({"content": format!("CONTENTS of {}", path)})
            }
            _ => Value::Null,
        }
    }
}

#[async_trait]
impl Transport for InProcessServer {
    async fn send(&self, envelope: &Envelope) -> conductor::Result<()> {
        let (Some(id), Some(method)) = (envelope.id.clone(), envelope.method.as_deref()) else {
            return Ok(());
        };
        let params = envelope.params.clone().unwrap_or(Value::Null);
        let reply = Envelope::response(id, Self::answer(method, &params));
        if let Some(tx) = self.outbound.lock().await.as_ref() {
            let _ = tx.send(reply).await;
        }
        Ok(())
    }

    async fn receive(&self) -> Option<Envelope> {
        self.inbound.lock().await.recv().await
    }

    async fn close(&self) -> conductor::Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.outbound.lock().await.take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn test_remote_tool_through_agent() {
    let provider = ScriptedProvider::new(vec![
        json!({
            "response": "",
            "tool_calls": [{"name": "files:read_file", "arguments": "{\"path\": \"a.txt\"}"}]
        }),
        json!({"response": "remote done"}),
    ]);
    let mut agent = Agent::new(options(), provider).unwrap();
    agent
        .connect_mcp_transport("files", InProcessServer::new(), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(agent.is_mcp_connected("files").await);
    assert_eq!(agent.tool_names().await, vec!["files:read_file".to_string()]);

    let result = agent.query("read it").await;
    assert_eq!(result.final_response, "remote done");
    let results = result.turns[0].tool_results.as_ref().unwrap();
    assert!(!results[0].is_error);
    assert_eq!(results[0].content, "CONTENTS of a.txt");
    // generated id is carried through to the result
    assert_eq!(results[0].tool_call_id, result.tool_calls[0].id);

    agent.shutdown().await;
    assert!(!agent.is_mcp_connected("files").await);
}

#[tokio::test]
async fn test_connect_transport_twice_is_noop() {
    let provider = ScriptedProvider::new(vec![json!({"response": ""})]);
    let mut agent = Agent::new(options(), provider).unwrap();
    agent
        .connect_mcp_transport("files", InProcessServer::new(), Duration::from_secs(5))
        .await
        .unwrap();
    agent
        .connect_mcp_transport("files", InProcessServer::new(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(agent.tool_names().await.len(), 1);
    assert_eq!(agent.connected_mcp_servers().await, vec!["files".to_string()]);
}

// ============================================================================
// Sessions and configuration
// ============================================================================

#[tokio::test]
async fn test_agent_from_config_persists_sessions() {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.agent.api_key = "test-key".into();
    config.sessions.persist = true;
    config.sessions.directory = Some(dir.path().to_string_lossy().into_owned());
    config.retry.enabled = false;

    let provider = ScriptedProvider::new(vec![json!({"response": "stored"})]);
    let mut agent = Agent::from_config(&config, provider).unwrap();
    agent.query("keep me").await;

    let sessions = SessionManager::new(&config);
    let record = sessions.load(agent.session_id()).await.unwrap();
    assert_eq!(record.messages.len(), 2);
    assert_eq!(record.metadata.turn_count, 1);
}

#[test]
fn test_agent_from_config_requires_key() {
    let provider = ScriptedProvider::new(vec![json!({})]);
    let err = Agent::from_config(&Config::default(), provider).err().unwrap();
    assert!(matches!(err, ConductorError::Config(_)));
}

// ============================================================================
// Sub-agents
// ============================================================================

async fn parent_with_history(provider: Arc<EchoPromptProvider>) -> Arc<Mutex<Agent>> {
    let mut parent = Agent::new(options(), provider).unwrap();
    for i in 0..4 {
        parent.query(&format!("parent question {}", i)).await;
    }
    Arc::new(Mutex::new(parent))
}

#[tokio::test]
async fn test_create_sub_agent_inherits_recent_context() {
    let provider = Arc::new(EchoPromptProvider::default());
    let parent = parent_with_history(provider).await;
    let mut manager = SubAgentManager::new(parent);

    let child = manager
        .create_sub_agent(SubAgentOptions {
            system_prompt: Some("child system".into()),
            max_turns: Some(2),
            ..SubAgentOptions::new("researcher")
        })
        .await
        .unwrap();

    let child = child.lock().await;
    let messages = child.messages();
    assert_eq!(messages.len(), 6);
    assert_eq!(child.system_prompt().as_deref(), Some("child system"));
    assert_eq!(messages[5].text(), "done: parent question 3");
    assert_eq!(child.internal_config().max_turns, 2);
    assert!(child.internal_config().mcp.servers.is_empty());
}

#[tokio::test]
async fn test_create_sub_agent_is_idempotent_and_isolated() {
    let provider = Arc::new(EchoPromptProvider::default());
    let parent = parent_with_history(provider).await;
    let mut manager = SubAgentManager::new(parent);

    let first = manager
        .create_sub_agent(SubAgentOptions {
            inherit_context: false,
            ..SubAgentOptions::new("solo")
        })
        .await
        .unwrap();
    let again = manager
        .create_sub_agent(SubAgentOptions::new("solo"))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(first.lock().await.message_count(), 1);
    assert_eq!(manager.names(), vec!["solo".to_string()]);
}

#[tokio::test]
async fn test_execute_parallel_returns_task_order() {
    let provider = Arc::new(EchoPromptProvider::default());
    let parent = Arc::new(Mutex::new(Agent::new(options(), provider).unwrap()));
    let mut manager = SubAgentManager::new(parent);

    let results = manager
        .execute_parallel(&[
            Task::new("a", "alpha"),
            Task::new("b", "beta"),
            Task::new("c", "gamma"),
        ])
        .await
        .unwrap();

    let responses: Vec<(&str, &str)> = results
        .iter()
        .map(|r: &TaskResult| (r.task.as_str(), r.result.final_response.as_str()))
        .collect();
    assert_eq!(
        responses,
        vec![("a", "done: alpha"), ("b", "done: beta"), ("c", "done: gamma")]
    );
    assert_eq!(manager.names().len(), 3);
}

#[tokio::test]
async fn test_execute_parallel_fails_fast() {
    let provider = Arc::new(EchoPromptProvider::default());
    let parent = Arc::new(Mutex::new(Agent::new(options(), provider).unwrap()));
    let mut manager = SubAgentManager::new(parent);

    let err = manager
        .execute_parallel(&[Task::new("ok", "fine"), Task::new("bad", "please fail")])
        .await
        .unwrap_err();

    match err {
        ConductorError::TaskFailed { task, message } => {
            assert_eq!(task, "bad");
            assert!(message.contains("cannot handle"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_coordinate_agents_respects_dependencies() {
    let provider = Arc::new(EchoPromptProvider::default());
    let parent = Arc::new(Mutex::new(
        Agent::new(options(), provider.clone()).unwrap(),
    ));
    let mut manager = SubAgentManager::new(parent);

    let tasks = vec![
        Task::new("report", "write report").depends_on(["fetch", "parse"]),
        Task::new("parse", "parse data").depends_on(["fetch"]),
        Task::new("fetch", "fetch data"),
    ];
    let results = manager.coordinate_agents(&tasks).await.unwrap();

    let order: Vec<&str> = results.iter().map(|r| r.task.as_str()).collect();
    assert_eq!(order, vec!["fetch", "parse", "report"]);

    let seen = provider.seen.lock().unwrap().clone();
    let position = |p: &str| seen.iter().position(|s| s == p).unwrap();
    assert!(position("fetch data") < position("parse data"));
    assert!(position("parse data") < position("write report"));
}

#[tokio::test]
async fn test_coordinate_agents_cycle_runs_nothing() {
    let provider = Arc::new(EchoPromptProvider::default());
    let parent = Arc::new(Mutex::new(
        Agent::new(options(), provider.clone()).unwrap(),
    ));
    let mut manager = SubAgentManager::new(parent);

    let tasks = vec![
        Task::new("a", "task a").depends_on(["b"]),
        Task::new("b", "task b").depends_on(["a"]),
    ];
    let err = manager.coordinate_agents(&tasks).await.unwrap_err();

    assert!(matches!(err, ConductorError::DependencyCycle(_)));
    assert!(provider.seen.lock().unwrap().is_empty());
    assert!(manager.names().is_empty());
}

#[tokio::test]
async fn test_share_context_between_sub_agents() {
    let provider = Arc::new(EchoPromptProvider::default());
    let parent = Arc::new(Mutex::new(Agent::new(options(), provider).unwrap()));
    let mut manager = SubAgentManager::new(parent);

    manager
        .execute_parallel(&[Task::new("writer", "draft"), Task::new("editor", "edit")])
        .await
        .unwrap();

    let shared = manager.share_context("writer", "editor").await.unwrap();
    assert_eq!(shared, 2);

    let editor = manager.get("editor").unwrap();
    let texts: Vec<String> = editor.lock().await.messages().iter().map(Message::text).collect();
    assert_eq!(texts, vec!["S", "edit", "done: edit", "draft", "done: draft"]);

    let missing = manager.share_context("writer", "ghost").await.unwrap_err();
    assert!(matches!(missing, ConductorError::NotFound(_)));
}
