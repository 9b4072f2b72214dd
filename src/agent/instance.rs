//! The [`Agent`]: one conversation, one tool registry, a fresh reasoning loop
//! per query.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{
    BudgetConfig, Config, McpConfig, McpServerConfig, PricingConfig, TimeoutConfig,
};
use crate::error::{ConductorError, Result};
use crate::providers::{ChatOptions, CompletionProvider, RetryProvider};
use crate::session::{ConversationStore, Message, SessionManager, SessionRecord, SessionSummary};
use crate::tools::mcp::{McpManager, Transport};
use crate::tools::{Tool, ToolExecutor, ToolPermissions, ToolRegistry};

use super::context::ContextManager;
use super::r#loop::{AgentResult, LoopHooks, LoopOptions, ReasoningLoop};

/// Construction options for an [`Agent`].
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub model: String,
    pub api_key: String,
    pub system_prompt: Option<String>,
    pub max_turns: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_context_length: usize,
    pub compression_enabled: bool,
    pub track_metrics: bool,
    pub permissions: ToolPermissions,
    pub timeouts: TimeoutConfig,
    pub budget: BudgetConfig,
    pub pricing: PricingConfig,
    /// Servers connected by [`Agent::initialize_mcp`]
    pub mcp: McpConfig,
    /// Reuse an existing session id instead of generating one
    pub session_id: Option<String>,
}

impl AgentOptions {
    /// Defaults for everything except the model and credential.
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            ..Self::from_config(&Config::default())
        }
    }

    /// Options resolved from a loaded config.
    pub fn from_config(config: &Config) -> Self {
        let agent = &config.agent;
        Self {
            model: agent.model.clone(),
            api_key: agent.api_key.clone(),
            system_prompt: agent.system_prompt.clone(),
            max_turns: agent.max_turns,
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
            max_context_length: agent.max_context_length,
            compression_enabled: agent.compression_enabled,
            track_metrics: agent.track_metrics,
            permissions: config.permissions.clone(),
            timeouts: config.timeouts.clone(),
            budget: config.budget.clone(),
            pricing: config.pricing.clone(),
            mcp: config.mcp.clone(),
            session_id: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            max_turns: self.max_turns,
            chat: ChatOptions {
                model: self.model.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            },
            context: ContextManager::new(self.max_context_length, self.compression_enabled),
            permissions: self.permissions.clone(),
            timeouts: self.timeouts.clone(),
            budget: self.budget.clone(),
            pricing: self.pricing.clone(),
            track_metrics: self.track_metrics,
        }
    }
}

/// A conversational agent.
///
/// Owns its [`ConversationStore`] and tool registry; neither is ever shared
/// with another agent. Each [`query`](Self::query) runs a new
/// [`ReasoningLoop`] over the persistent store.
pub struct Agent {
    session_id: String,
    options: AgentOptions,
    provider: Arc<dyn CompletionProvider>,
    store: ConversationStore,
    registry: Arc<RwLock<ToolRegistry>>,
    executor: ToolExecutor,
    mcp: Option<McpManager>,
    hooks: Option<Arc<dyn LoopHooks>>,
    sessions: Option<SessionManager>,
}

impl Agent {
    /// Build an agent around `provider`. Fails with a config error when the
    /// model or the credential is empty.
    pub fn new(options: AgentOptions, provider: Arc<dyn CompletionProvider>) -> Result<Self> {
        if options.model.trim().is_empty() {
            return Err(ConductorError::Config("Model is required".into()));
        }
        if options.api_key.trim().is_empty() {
            return Err(ConductorError::Config("API key is required".into()));
        }

        let session_id = options
            .session_id
            .clone()
            .unwrap_or_else(SessionManager::generate_id);
        let registry = Arc::new(RwLock::new(ToolRegistry::new()));
        let executor = ToolExecutor::new(Arc::clone(&registry));

        let mut store = ConversationStore::new();
        if let Some(prompt) = &options.system_prompt {
            store.add_system(prompt);
        }

        debug!(session = %session_id, model = %options.model, "Created agent");
        Ok(Self {
            session_id,
            options,
            provider,
            store,
            registry,
            executor,
            mcp: None,
            hooks: None,
            sessions: None,
        })
    }

    /// Build from a loaded config: the provider is wrapped in a
    /// [`RetryProvider`] when retries are enabled, and sessions are
    /// auto-saved when persistence is on.
    pub fn from_config(config: &Config, provider: Arc<dyn CompletionProvider>) -> Result<Self> {
        let provider: Arc<dyn CompletionProvider> = if config.retry.enabled {
            Arc::new(RetryProvider::new(provider, config.retry.clone()))
        } else {
            provider
        };
        let agent = Self::new(AgentOptions::from_config(config), provider)?;
        Ok(if config.sessions.persist {
            agent.with_sessions(SessionManager::new(config))
        } else {
            agent
        })
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn LoopHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Save the conversation through `sessions` after every query.
    pub fn with_sessions(mut self, sessions: SessionManager) -> Self {
        self.sessions = Some(sessions);
        self
    }

    // ------------------------------------------------------------------
    // Tools
    // ------------------------------------------------------------------

    pub async fn register_tool(&self, tool: Arc<dyn Tool>) -> Result<()> {
        self.registry.write().await.register(tool)
    }

    pub async fn register_tools(&self, tools: Vec<Arc<dyn Tool>>) -> Result<()> {
        self.registry.write().await.register_all(tools)
    }

    /// Names of every registered tool, local and remote.
    pub async fn tool_names(&self) -> Vec<String> {
        self.registry.read().await.names()
    }

    // ------------------------------------------------------------------
    // MCP
    // ------------------------------------------------------------------

    fn mcp_manager(&mut self) -> &McpManager {
        let registry = Arc::clone(&self.registry);
        self.mcp.get_or_insert_with(|| McpManager::new(registry))
    }

    /// Connect every server from the agent options. Returns the servers that
    /// connected; failures are logged by the manager.
    pub async fn initialize_mcp(&mut self) -> Vec<String> {
        let config = self.options.mcp.clone();
        self.connect_mcp(&config).await
    }

    pub async fn connect_mcp(&mut self, config: &McpConfig) -> Vec<String> {
        if config.servers.is_empty() {
            return Vec::new();
        }
        self.mcp_manager().initialize(config).await
    }

    pub async fn connect_mcp_server(&mut self, config: &McpServerConfig) -> Result<()> {
        self.mcp_manager().connect_server(config).await
    }

    /// Connect a server over an already open transport.
    pub async fn connect_mcp_transport(
        &mut self,
        server: &str,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Result<()> {
        self.mcp_manager()
            .connect_transport(server, transport, timeout)
            .await
    }

    pub async fn is_mcp_connected(&self, server: &str) -> bool {
        match &self.mcp {
            Some(mcp) => mcp.is_connected(server).await,
            None => false,
        }
    }

    pub async fn connected_mcp_servers(&self) -> Vec<String> {
        match &self.mcp {
            Some(mcp) => mcp.connected_servers().await,
            None => Vec::new(),
        }
    }

    /// Close every MCP connection.
    pub async fn shutdown(&self) {
        if let Some(mcp) = &self.mcp {
            mcp.disconnect_all().await;
        }
    }

    // ------------------------------------------------------------------
    // Conversation
    // ------------------------------------------------------------------

    /// Ask about a new topic.
    pub async fn query(&mut self, prompt: &str) -> AgentResult {
        info!(session = %self.session_id, "Agent query");
        self.run(prompt).await
    }

    /// Follow up on the ongoing conversation. Same mechanics as
    /// [`query`](Self::query).
    pub async fn continue_conversation(&mut self, prompt: &str) -> AgentResult {
        info!(session = %self.session_id, "Agent continue");
        self.run(prompt).await
    }

    async fn run(&mut self, prompt: &str) -> AgentResult {
        self.store.add_user(prompt);

        let mut reasoning = ReasoningLoop::new(
            Arc::clone(&self.provider),
            self.executor.clone(),
            self.options.loop_options(),
        );
        if let Some(hooks) = &self.hooks {
            reasoning = reasoning.with_hooks(Arc::clone(hooks));
        }
        let result = reasoning.run(&mut self.store).await;

        if self.sessions.is_some() {
            if let Err(e) = self.save_session().await {
                warn!(session = %self.session_id, error = %e, "Failed to save session");
            }
        }
        result
    }

    /// Clear the history and re-seed the configured system prompt.
    pub fn reset(&mut self) {
        self.store.reset();
        if let Some(prompt) = &self.options.system_prompt {
            self.store.add_system(prompt);
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The options this agent was built with.
    pub fn internal_config(&self) -> &AgentOptions {
        &self.options
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    /// Copy of the conversation.
    pub fn messages(&self) -> Vec<Message> {
        self.store.snapshot()
    }

    pub fn message_count(&self) -> usize {
        self.store.len()
    }

    /// The system message currently in the conversation.
    pub fn system_prompt(&self) -> Option<String> {
        self.store.system_prompt()
    }

    /// Replace the system message. Later resets re-seed this prompt.
    pub fn set_system_prompt(&mut self, prompt: &str) {
        self.options.system_prompt = Some(prompt.to_string());
        self.store.add_system(prompt);
    }

    /// The provider, shared with sub-agents.
    pub fn provider_handle(&self) -> Arc<dyn CompletionProvider> {
        Arc::clone(&self.provider)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    fn sessions(&self) -> Result<&SessionManager> {
        self.sessions
            .as_ref()
            .ok_or_else(|| ConductorError::Session("Session persistence is not configured".into()))
    }

    pub async fn save_session(&self) -> Result<()> {
        let record = SessionRecord::new(&self.session_id, &self.options.model, self.store.snapshot());
        self.sessions()?.save(&record).await
    }

    /// Replace the conversation with a stored session and adopt its id.
    pub async fn load_session(&mut self, session_id: &str) -> Result<()> {
        let record = self.sessions()?.load(session_id).await?;
        info!(
            session = %session_id,
            messages = record.messages.len(),
            "Resumed session"
        );
        self.store.replace(record.messages);
        self.session_id = record.session_id;
        Ok(())
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.sessions()?.list().await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        self.sessions()?.delete(session_id).await
    }
}
