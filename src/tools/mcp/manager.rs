//! MCP manager - connects configured servers and registers their tools.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::{McpConfig, McpServerConfig};
use crate::error::{ConductorError, Result};
use crate::tools::{Tool, ToolRegistry};

use super::client::McpClient;
use super::transport::{self, Transport};
use super::wrapper::McpToolWrapper;

/// Lifecycle wrapper around an [`McpClient`] and the registry its tools are
/// published into.
///
/// Disconnecting a server leaves its wrappers registered; they fail with a
/// "not connected" error until the server is connected again.
///
/// Connects and disconnects for one name are serialized by a per-name gate,
/// so a slow handshake never blocks other servers or the status queries.
pub struct McpManager {
    client: Arc<McpClient>,
    registry: Arc<RwLock<ToolRegistry>>,
    connected: RwLock<HashSet<String>>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl McpManager {
    pub fn new(registry: Arc<RwLock<ToolRegistry>>) -> Self {
        Self {
            client: Arc::new(McpClient::new()),
            registry,
            connected: RwLock::new(HashSet::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    async fn gate(&self, server: &str) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().await;
        Arc::clone(gates.entry(server.to_string()).or_default())
    }

    /// Connect every server in `config`. Individual failures are logged and
    /// skipped; returns the names that connected.
    pub async fn initialize(&self, config: &McpConfig) -> Vec<String> {
        let mut connected = Vec::new();
        for server in config.server_configs() {
            match self.connect_server(&server).await {
                Ok(()) => connected.push(server.name.clone()),
                Err(e) => error!(server = %server.name, error = %e, "Failed to connect to MCP server"),
            }
        }
        connected
    }

    /// Connect one server and register its tools. A second call for an
    /// already connected name is a no-op.
    pub async fn connect_server(&self, config: &McpServerConfig) -> Result<()> {
        let gate = self.gate(&config.name).await;
        let _held = gate.lock().await;
        if self.connected.read().await.contains(&config.name) {
            info!(server = %config.name, "MCP server already connected");
            return Ok(());
        }

        let transport = transport::open(config).await?;
        self.handshake(&config.name, transport, config.timeout())
            .await?;
        self.connected.write().await.insert(config.name.clone());
        Ok(())
    }

    /// Like [`connect_server`](Self::connect_server) over a caller supplied
    /// transport.
    pub async fn connect_transport(
        &self,
        server: &str,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Result<()> {
        let gate = self.gate(server).await;
        let _held = gate.lock().await;
        if self.connected.read().await.contains(server) {
            info!(server = %server, "MCP server already connected");
            return Ok(());
        }

        self.handshake(server, transport, timeout).await?;
        self.connected.write().await.insert(server.to_string());
        Ok(())
    }

    async fn handshake(
        &self,
        server: &str,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Result<()> {
        self.client
            .connect_with_transport(server, transport, timeout)
            .await?;

        let tools = self.client.tools_for(server).await;
        let mut registry = self.registry.write().await;
        for tool in &tools {
            let wrapper = McpToolWrapper::new(server, tool, Arc::clone(&self.client));
            let name = wrapper.name().to_string();
            match registry.register(Arc::new(wrapper)) {
                Ok(()) => info!(server = %server, tool = %name, "Registered MCP tool"),
                Err(ConductorError::DuplicateTool(_)) => {
                    debug!(server = %server, tool = %name, "MCP tool already registered")
                }
                Err(e) => warn!(server = %server, tool = %name, error = %e, "Failed to register MCP tool"),
            }
        }
        Ok(())
    }

    /// Close one server. Its registered wrappers stay in place.
    pub async fn disconnect_server(&self, server: &str) -> Result<()> {
        let gate = self.gate(server).await;
        let _held = gate.lock().await;
        if !self.connected.write().await.remove(server) {
            return Ok(());
        }
        self.client.disconnect(server).await
    }

    /// Close every server.
    pub async fn disconnect_all(&self) {
        self.client.disconnect_all().await;
        self.connected.write().await.clear();
    }

    pub async fn is_connected(&self, server: &str) -> bool {
        self.connected.read().await.contains(server) && self.client.is_connected(server).await
    }

    /// Names of connected servers, sorted.
    pub async fn connected_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connected.read().await.iter().cloned().collect();
        names.sort();
        names
    }

    pub fn client(&self) -> Arc<McpClient> {
        Arc::clone(&self.client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::mcp::testing::ScriptedTransport;
    use crate::tools::{ToolCall, ToolExecutor};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn files_server(initializations: Arc<AtomicUsize>) -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport::new(move |method, params| match method {
            "initialize" => {
                initializations.fetch_add(1, Ordering::SeqCst);
                Ok(json!({}))
            }
            "tools/list" => Ok(json!({"tools": [
                {"name": "read", "description": "Read", "inputSchema": {"type": "object"}},
                {"name": "write", "description": "Write", "inputSchema": {"type": "object"}}
            ]})),
            "tools/call" => Ok(json!({"content": format!("called {}", params["name"].as_str().unwrap_or(""))})),
            _ => Err((-32601, "Method not found".to_string())),
        }))
    }

    fn manager() -> (McpManager, Arc<RwLock<ToolRegistry>>) {
        let registry = Arc::new(RwLock::new(ToolRegistry::new()));
        (McpManager::new(Arc::clone(&registry)), registry)
    }

    #[tokio::test]
    async fn test_connect_registers_prefixed_tools() {
        let (manager, registry) = manager();
        let inits = Arc::new(AtomicUsize::new(0));
        manager
            .connect_transport("files", files_server(inits), Duration::from_secs(5))
            .await
            .unwrap();

        let names = registry.read().await.names();
        assert_eq!(names, vec!["files:read", "files:write"]);
        assert!(manager.is_connected("files").await);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (manager, registry) = manager();
        let inits = Arc::new(AtomicUsize::new(0));
        manager
            .connect_transport("files", files_server(Arc::clone(&inits)), Duration::from_secs(5))
            .await
            .unwrap();
        manager
            .connect_transport("files", files_server(Arc::clone(&inits)), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.read().await.count(), 2);
        assert_eq!(manager.connected_servers().await, vec!["files"]);
    }

    #[tokio::test]
    async fn test_registered_wrapper_calls_server() {
        let (manager, registry) = manager();
        manager
            .connect_transport(
                "files",
                files_server(Arc::new(AtomicUsize::new(0))),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        let executor = ToolExecutor::new(registry);
        let result = executor
            .execute(&ToolCall::new("c1", "files:read", json!({})))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "called read");
    }

    #[tokio::test]
    async fn test_disconnect_leaves_stale_wrappers() {
        let (manager, registry) = manager();
        manager
            .connect_transport(
                "files",
                files_server(Arc::new(AtomicUsize::new(0))),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        manager.disconnect_server("files").await.unwrap();

        assert!(!manager.is_connected("files").await);
        assert!(registry.read().await.has("files:read"));

        let executor = ToolExecutor::new(registry);
        let result = executor
            .execute(&ToolCall::new("c1", "files:read", json!({})))
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("not connected"));
    }

    #[tokio::test]
    async fn test_initialize_skips_failing_servers() {
        let (manager, _) = manager();
        let config: McpConfig = serde_json::from_value(json!({
            "mcpServers": {
                "broken": {"command": "/definitely/not/a/binary"},
                "nourl": {"transport": "http"}
            }
        }))
        .unwrap();
        let connected = manager.initialize(&config).await;
        assert!(connected.is_empty());
        assert!(manager.connected_servers().await.is_empty());
    }

    #[tokio::test]
    async fn test_slow_handshake_does_not_block_other_servers() {
        let (manager, _) = manager();
        manager
            .connect_transport(
                "files",
                files_server(Arc::new(AtomicUsize::new(0))),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        let stalled = Arc::new(
            ScriptedTransport::new(|_, _| Ok(json!({}))).silent_on("initialize"),
        );
        let slow = manager.connect_transport("slow", stalled, Duration::from_millis(500));
        let status = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let listed = tokio::time::timeout(
                Duration::from_millis(100),
                manager.connected_servers(),
            )
            .await;
            let files_up =
                tokio::time::timeout(Duration::from_millis(100), manager.is_connected("files"))
                    .await;
            (listed, files_up)
        };
        let (slow_result, (listed, files_up)) = tokio::join!(slow, status);

        assert!(slow_result.is_err());
        assert_eq!(listed.unwrap(), vec!["files"]);
        assert!(files_up.unwrap());
        assert!(!manager.is_connected("slow").await);
    }

    #[tokio::test]
    async fn test_concurrent_connects_for_one_name_handshake_once() {
        let (manager, registry) = manager();
        let inits = Arc::new(AtomicUsize::new(0));
        let first = manager.connect_transport(
            "files",
            files_server(Arc::clone(&inits)),
            Duration::from_secs(5),
        );
        let second = manager.connect_transport(
            "files",
            files_server(Arc::clone(&inits)),
            Duration::from_secs(5),
        );
        let (a, b) = tokio::join!(first, second);

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.read().await.count(), 2);
    }
}
