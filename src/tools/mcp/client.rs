//! MCP client.
//!
//! Owns one connection per named server. Each connection runs a dispatcher
//! task that drains the transport and resolves pending requests by id; the
//! handshake discovers the server's tools, resources and prompts, indexed as
//! `server:name` (`server:uri` for resources).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::McpServerConfig;
use crate::error::{ConductorError, Result};

use super::protocol::{Envelope, RemotePrompt, RemoteResource, RemoteTool, PROTOCOL_VERSION};
use super::transport::{self, Transport};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Envelope>>>>;

/// One live server connection.
struct Connection {
    server: String,
    transport: Arc<dyn Transport>,
    pending: PendingMap,
    next_id: AtomicU64,
    timeout: Duration,
    dispatcher: JoinHandle<()>,
}

impl Connection {
    fn start(server: &str, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let dispatcher = tokio::spawn(dispatch(
            server.to_string(),
            Arc::clone(&transport),
            Arc::clone(&pending),
        ));
        Self {
            server: server.to_string(),
            transport,
            pending,
            next_id: AtomicU64::new(1),
            timeout,
            dispatcher,
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Envelope> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        // Register before sending so a fast reply cannot be missed.
        self.pending.lock().await.insert(id, tx);

        debug!(server = %self.server, id, method, "Sending MCP request");
        if let Err(e) = self.transport.send(&Envelope::request(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(ConductorError::Mcp(format!(
                "Connection to '{}' closed before response to {}",
                self.server, method
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!(server = %self.server, id, method, "MCP request timed out");
                Err(ConductorError::Timeout(format!(
                    "MCP request {} to '{}' timed out after {}s",
                    method,
                    self.server,
                    self.timeout.as_secs()
                )))
            }
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        self.transport
            .send(&Envelope::notification(method, None))
            .await
    }

    async fn shutdown(&self) -> Result<()> {
        let result = self.transport.close().await;
        self.dispatcher.abort();
        // Dropping the senders fails every waiter immediately.
        self.pending.lock().await.clear();
        result
    }
}

/// Route inbound envelopes until the transport closes.
async fn dispatch(server: String, transport: Arc<dyn Transport>, pending: PendingMap) {
    while let Some(envelope) = transport.receive().await {
        if envelope.is_notification() {
            debug!(
                server = %server,
                method = envelope.method.as_deref().unwrap_or_default(),
                "MCP notification"
            );
            continue;
        }

        let Some(id) = envelope.id.as_ref().and_then(|id| id.as_u64()) else {
            debug!(server = %server, "Ignoring MCP message without usable id");
            continue;
        };

        if envelope.method.is_some() {
            debug!(server = %server, id, "Ignoring server-initiated MCP request");
            continue;
        }

        match pending.lock().await.remove(&id) {
            Some(waiter) => {
                let _ = waiter.send(envelope);
            }
            None => debug!(server = %server, id, "MCP response with no pending request"),
        }
    }
    debug!(server = %server, "MCP dispatcher stopped");
    pending.lock().await.clear();
}

/// Client for any number of MCP servers.
pub struct McpClient {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    tools: RwLock<BTreeMap<String, RemoteTool>>,
    resources: RwLock<BTreeMap<String, RemoteResource>>,
    prompts: RwLock<BTreeMap<String, RemotePrompt>>,
    client_name: String,
    client_version: String,
}

impl McpClient {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            tools: RwLock::new(BTreeMap::new()),
            resources: RwLock::new(BTreeMap::new()),
            prompts: RwLock::new(BTreeMap::new()),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Open the configured transport and perform the handshake.
    pub async fn connect(&self, config: &McpServerConfig) -> Result<()> {
        let transport = transport::open(config).await?;
        self.connect_with_transport(&config.name, transport, config.timeout())
            .await
    }

    /// Perform the handshake over an already open transport.
    ///
    /// On failure the transport is closed and nothing is recorded. A name
    /// that already has a connection is rejected; disconnect it first.
    pub async fn connect_with_transport(
        &self,
        server: &str,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Result<()> {
        if self.connections.read().await.contains_key(server) {
            let _ = transport.close().await;
            return Err(already_connected(server));
        }

        let connection = Arc::new(Connection::start(server, transport, timeout));

        if let Err(e) = self.initialize(&connection).await {
            let _ = connection.shutdown().await;
            return Err(e);
        }

        // Claim the name before discovery so a racing connect cannot
        // overwrite this server's index entries.
        {
            let mut connections = self.connections.write().await;
            if connections.contains_key(server) {
                drop(connections);
                let _ = connection.shutdown().await;
                return Err(already_connected(server));
            }
            connections.insert(server.to_string(), Arc::clone(&connection));
        }

        self.discover(&connection).await;

        info!(server = %server, "Connected to MCP server");
        Ok(())
    }

    async fn initialize(&self, connection: &Connection) -> Result<()> {
        let reply = connection
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": self.client_name,
                        "version": self.client_version,
                    }
                }),
            )
            .await?;

        if let Some(error) = reply.error {
            return Err(ConductorError::Mcp(format!(
                "MCP initialization failed for '{}': {}",
                connection.server, error.message
            )));
        }

        if let Some(info) = reply.result.as_ref().and_then(|r| r.get("serverInfo")) {
            debug!(
                server = %connection.server,
                remote_name = info.get("name").and_then(|v| v.as_str()).unwrap_or("unknown"),
                remote_version = info.get("version").and_then(|v| v.as_str()).unwrap_or("unknown"),
                "MCP initialized"
            );
        }

        connection.notify("notifications/initialized").await
    }

    /// List calls are optional capabilities; failures leave the category empty.
    async fn discover(&self, connection: &Connection) {
        let server = &connection.server;

        let tools: Vec<RemoteTool> = list(connection, "tools/list", "tools").await;
        let mut index = self.tools.write().await;
        for tool in tools {
            debug!(server = %server, tool = %tool.name, "Discovered MCP tool");
            index.insert(format!("{}:{}", server, tool.name), tool);
        }
        drop(index);

        let resources: Vec<RemoteResource> =
            list(connection, "resources/list", "resources").await;
        let mut index = self.resources.write().await;
        for resource in resources {
            index.insert(format!("{}:{}", server, resource.uri), resource);
        }
        drop(index);

        let prompts: Vec<RemotePrompt> = list(connection, "prompts/list", "prompts").await;
        let mut index = self.prompts.write().await;
        for prompt in prompts {
            index.insert(format!("{}:{}", server, prompt.name), prompt);
        }
    }

    async fn connection(&self, server: &str) -> Result<Arc<Connection>> {
        self.connections
            .read()
            .await
            .get(server)
            .cloned()
            .ok_or_else(|| ConductorError::Mcp(format!("MCP server not connected: {}", server)))
    }

    /// Send a raw request and return the reply envelope.
    pub async fn send_request(&self, server: &str, method: &str, params: Value) -> Result<Envelope> {
        self.connection(server).await?.request(method, params).await
    }

    /// Invoke a remote tool. The payload is returned uninterpreted.
    pub async fn call_tool(&self, server: &str, tool: &str, input: Value) -> Result<Value> {
        debug!(server = %server, tool = %tool, "Calling MCP tool");
        let reply = self
            .send_request(server, "tools/call", json!({"name": tool, "arguments": input}))
            .await?;

        if let Some(error) = reply.error {
            return Err(ConductorError::RemoteTool(error.message));
        }

        let result = reply.result.unwrap_or(Value::Null);
        Ok(match result.get("content") {
            Some(content) => content.clone(),
            None => result,
        })
    }

    /// Read a resource by uri.
    pub async fn read_resource(&self, server: &str, uri: &str) -> Result<Value> {
        let reply = self
            .send_request(server, "resources/read", json!({"uri": uri}))
            .await?;
        if let Some(error) = reply.error {
            return Err(ConductorError::Mcp(error.message));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }

    /// Every discovered tool, keyed `server:name`.
    pub async fn tools(&self) -> BTreeMap<String, RemoteTool> {
        self.tools.read().await.clone()
    }

    /// Tools discovered on one server.
    pub async fn tools_for(&self, server: &str) -> Vec<RemoteTool> {
        let prefix = format!("{}:", server);
        self.tools
            .read()
            .await
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, tool)| tool.clone())
            .collect()
    }

    /// Look up a tool by server and local name.
    pub async fn tool(&self, server: &str, name: &str) -> Option<RemoteTool> {
        self.tools
            .read()
            .await
            .get(&format!("{}:{}", server, name))
            .cloned()
    }

    /// Every discovered resource, keyed `server:uri`.
    pub async fn resources(&self) -> BTreeMap<String, RemoteResource> {
        self.resources.read().await.clone()
    }

    /// Every discovered prompt, keyed `server:name`.
    pub async fn prompts(&self) -> BTreeMap<String, RemotePrompt> {
        self.prompts.read().await.clone()
    }

    pub async fn is_connected(&self, server: &str) -> bool {
        match self.connections.read().await.get(server) {
            Some(connection) => connection.transport.is_connected(),
            None => false,
        }
    }

    /// Names of servers with a recorded connection.
    pub async fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Close one server and forget everything discovered on it.
    pub async fn disconnect(&self, server: &str) -> Result<()> {
        let Some(connection) = self.connections.write().await.remove(server) else {
            return Ok(());
        };
        let prefix = format!("{}:", server);
        self.tools.write().await.retain(|k, _| !k.starts_with(&prefix));
        self.resources
            .write()
            .await
            .retain(|k, _| !k.starts_with(&prefix));
        self.prompts.write().await.retain(|k, _| !k.starts_with(&prefix));

        connection.shutdown().await?;
        info!(server = %server, "Disconnected from MCP server");
        Ok(())
    }

    /// Close every server. Errors are logged, not returned.
    pub async fn disconnect_all(&self) {
        for server in self.server_names().await {
            if let Err(e) = self.disconnect(&server).await {
                warn!(server = %server, error = %e, "Failed to disconnect MCP server");
            }
        }
    }
}

impl Default for McpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn already_connected(server: &str) -> ConductorError {
    ConductorError::Mcp(format!("MCP server '{}' is already connected", server))
}

/// Issue a list request and pull `field` out of the result.
async fn list<T>(connection: &Connection, method: &str, field: &str) -> Vec<T>
where
    T: serde::de::DeserializeOwned,
{
    let reply = match connection.request(method, json!({})).await {
        Ok(reply) => reply,
        Err(e) => {
            debug!(server = %connection.server, method, error = %e, "MCP list request failed");
            return Vec::new();
        }
    };
    if reply.error.is_some() {
        debug!(server = %connection.server, method, "MCP server does not support method");
        return Vec::new();
    }
    let items = reply
        .result
        .as_ref()
        .and_then(|r| r.get(field))
        .cloned()
        .unwrap_or(Value::Array(Vec::new()));
    match serde_json::from_value(items) {
        Ok(items) => items,
        Err(e) => {
            warn!(server = %connection.server, method, error = %e, "Malformed MCP list result");
            Vec::new()
        }
    }
}
