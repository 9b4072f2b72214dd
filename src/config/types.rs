//! Configuration types for Conductor
//!
//! Every section uses `#[serde(default)]` so a partial config file only needs
//! to name the values it changes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tools::ToolPermissions;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults for agents built from this config
    pub agent: AgentDefaults,
    /// MCP servers to connect at agent start
    pub mcp: McpConfig,
    /// Logging output
    pub logging: LoggingConfig,
    /// Provider retry and circuit breaker
    pub retry: RetryConfig,
    /// Token and cost ceilings
    pub budget: BudgetConfig,
    /// Pricing used to estimate cost
    pub pricing: PricingConfig,
    /// Tool allow/block policy
    pub permissions: ToolPermissions,
    /// API, tool and session timeouts
    pub timeouts: TimeoutConfig,
    /// Sub-agent concurrency
    pub swarm: SwarmConfig,
    /// Session persistence
    pub sessions: SessionsConfig,
}

// ============================================================================
// Agent
// ============================================================================

/// Default agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Model identifier passed to the completion provider
    pub model: String,
    /// Provider credential
    pub api_key: String,
    /// Optional system prompt seeded into every new conversation
    pub system_prompt: Option<String>,
    /// Turn limit for one query
    pub max_turns: usize,
    /// Maximum tokens per provider response
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Context window used by the compression threshold
    pub max_context_length: usize,
    /// Compress history before each turn when over threshold
    pub compression_enabled: bool,
    /// Track per-session metrics
    pub track_metrics: bool,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            api_key: String::new(),
            system_prompt: None,
            max_turns: 30,
            max_tokens: 4096,
            temperature: 0.7,
            max_context_length: 100_000,
            compression_enabled: true,
            track_metrics: true,
        }
    }
}

// ============================================================================
// MCP
// ============================================================================

/// Transport used to reach an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
    Sse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Http => write!(f, "http"),
            TransportKind::Sse => write!(f, "sse"),
        }
    }
}

/// Named-server map, as found in `.mcp.json` files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", alias = "servers")]
    pub servers: BTreeMap<String, McpServerConfig>,
}

impl McpConfig {
    /// Server configs with `name` filled in from the map key, sorted by name.
    pub fn server_configs(&self) -> Vec<McpServerConfig> {
        self.servers
            .iter()
            .map(|(name, server)| McpServerConfig {
                name: name.clone(),
                ..server.clone()
            })
            .collect()
    }

    /// Look up one server by name.
    pub fn server(&self, name: &str) -> Option<McpServerConfig> {
        self.servers.get(name).map(|server| McpServerConfig {
            name: name.to_string(),
            ..server.clone()
        })
    }
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    /// Server name; taken from the map key when loaded from a file.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Explicit transport; inferred from `url` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
    /// Executable for stdio servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Endpoint for http and sse servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Per-request timeout in seconds (default: 30).
    pub timeout_secs: u64,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            transport: None,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            timeout_secs: 30,
        }
    }
}

impl McpServerConfig {
    /// Explicit transport, else `http` when a url is present, else `stdio`.
    pub fn transport_kind(&self) -> TransportKind {
        self.transport.unwrap_or(if self.url.is_some() {
            TransportKind::Http
        } else {
            TransportKind::Stdio
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact single-line text
    #[default]
    Compact,
    /// Structured JSON lines
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

// ============================================================================
// Retry, budget, pricing, timeouts
// ============================================================================

/// Exponential backoff and circuit breaker for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before a probe is allowed
    pub reset_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            failure_threshold: 5,
            reset_timeout_secs: 60,
        }
    }
}

/// Ceilings checked after every turn. `None` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_tokens: Option<u64>,
    pub max_cost: Option<f64>,
    pub warn_at_percent: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: None,
            max_cost: None,
            warn_at_percent: 80.0,
        }
    }
}

/// Provider pricing per 1k tokens. Zero disables cost tracking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub input_cost_per_1k_tokens: f64,
    pub output_cost_per_1k_tokens: f64,
}

impl PricingConfig {
    pub fn is_set(&self) -> bool {
        self.input_cost_per_1k_tokens > 0.0 || self.output_cost_per_1k_tokens > 0.0
    }
}

/// Timeouts in milliseconds. `None` means no limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// One provider call
    pub api_call_ms: Option<u64>,
    /// One tool call
    pub tool_execution_ms: Option<u64>,
    /// One whole query
    pub total_session_ms: Option<u64>,
}

impl TimeoutConfig {
    pub fn api_call(&self) -> Option<Duration> {
        self.api_call_ms.map(Duration::from_millis)
    }

    pub fn tool_execution(&self) -> Option<Duration> {
        self.tool_execution_ms.map(Duration::from_millis)
    }

    pub fn total_session(&self) -> Option<Duration> {
        self.total_session_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// Swarm and sessions
// ============================================================================

/// Sub-agent scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Maximum sub-agent queries in flight at once (0 is treated as 1)
    pub max_concurrent: usize,
    /// Messages copied from the parent into a new sub-agent
    pub inherit_messages: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            inherit_messages: 5,
        }
    }
}

/// Session persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Save the conversation after every query
    pub persist: bool,
    /// Override for the sessions directory (default `~/.conductor/sessions`)
    pub directory: Option<String>,
}
